//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Name used when headless provisioning is not given one.
pub const DEFAULT_USERNAME: &str = "kano";

/// Password every new account starts with.
pub const DEFAULT_USER_PASSWORD: &str = "kano";

/// Group every onboarding-created account joins.
pub const SYSTEM_GROUP: &str = "kanousers";

/// Supplementary groups granted to a new account.
pub const DEFAULT_USER_GROUPS: &[&str] = &[
    "tty", "adm", "dialout", "cdrom", "audio", "users", "sudo", "video", "games", "plugdev",
    "input", SYSTEM_GROUP, "i2c",
];

/// Lowest uid handed out to onboarding accounts.
pub const FIRST_UID: u32 = 1001;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 25;

/// Candidates tried by the uniqueness resolver before giving up.
pub const MAX_UNIQUE_ATTEMPTS: u32 = 1_000_000;

/// Onboarding configuration.
#[derive(Debug, Clone)]
pub struct InitConfig {
    /// Where the flow status is persisted.
    pub status_path: PathBuf,
    /// Parent of user home directories.
    pub home_root: PathBuf,
    /// Shell used for new accounts.
    pub login_shell: String,
    /// Init file for the rabbit-hole subshell.
    pub subshellrc_path: PathBuf,
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Password set on new accounts.
    pub default_password: SecretString,
    /// Delay between characters of typewriter output.
    pub typewriter_delay: Duration,
    /// Display manager started once onboarding hands off to the UI.
    pub display_manager: String,
    /// Display manager config holding the `autologin-user` key.
    pub autologin_conf_path: PathBuf,
    /// File holding the device hostname.
    pub hostname_path: PathBuf,
    /// Static host table updated alongside the hostname.
    pub hosts_path: PathBuf,
    /// Parental-control hook run for each new account (skipped if unset).
    pub parental_hook: Option<PathBuf>,
    /// Command launched by the love stage.
    pub overworld_command: Vec<String>,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            status_path: PathBuf::from("/var/cache/firstboot/status.json"),
            home_root: PathBuf::from("/home"),
            login_shell: "/bin/bash".to_string(),
            subshellrc_path: PathBuf::from("/usr/share/firstboot/subshellrc"),
            log_dir: PathBuf::from("/var/log/firstboot"),
            default_password: SecretString::from(DEFAULT_USER_PASSWORD),
            typewriter_delay: Duration::from_millis(30),
            display_manager: "lightdm".to_string(),
            autologin_conf_path: PathBuf::from("/etc/lightdm/lightdm.conf"),
            hostname_path: PathBuf::from("/etc/hostname"),
            hosts_path: PathBuf::from("/etc/hosts"),
            parental_hook: Some(PathBuf::from("/usr/bin/kano-set-user-cookies")),
            overworld_command: vec![
                "/usr/bin/love".to_string(),
                "/usr/bin/kanoOverworld.love".to_string(),
                "--load=terminalForest".to_string(),
            ],
        }
    }
}

impl InitConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FIRSTBOOT_STATUS_PATH") {
            config.status_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FIRSTBOOT_HOME_ROOT") {
            config.home_root = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FIRSTBOOT_SUBSHELLRC") {
            config.subshellrc_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FIRSTBOOT_LOG_DIR") {
            config.log_dir = PathBuf::from(path);
        }
        if let Ok(ms) = std::env::var("FIRSTBOOT_TYPEWRITER_MS") {
            let ms: u64 = ms.parse().map_err(|e| ConfigError::InvalidValue {
                key: "FIRSTBOOT_TYPEWRITER_MS".to_string(),
                message: format!("{e}"),
            })?;
            config.typewriter_delay = Duration::from_millis(ms);
        }
        if let Ok(dm) = std::env::var("FIRSTBOOT_DISPLAY_MANAGER") {
            if dm.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "FIRSTBOOT_DISPLAY_MANAGER".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            config.display_manager = dm;
        }
        if let Ok(path) = std::env::var("FIRSTBOOT_AUTOLOGIN_CONF") {
            config.autologin_conf_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FIRSTBOOT_PARENTAL_HOOK") {
            config.parental_hook = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        Ok(config)
    }
}
