//! Device-level settings touched by onboarding: hostname, autologin,
//! display manager autostart and parental-control defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use crate::config::InitConfig;
use crate::error::SettingsError;
use crate::system::command::{CommandRunner, CommandSpec};

/// Loopback address Debian-style systems map the hostname to.
const HOSTNAME_LOOPBACK: &str = "127.0.1.1";

/// Display manager seat sections that may carry `autologin-user`.
const SEAT_SECTIONS: &[&str] = &["[Seat:*]", "[SeatDefaults]"];

/// System-wide settings collaborator.
#[async_trait]
pub trait SystemSettings: Send + Sync {
    /// Set the device hostname.
    async fn set_hostname(&self, name: &str) -> Result<(), SettingsError>;

    /// Log `username` in automatically on the next display manager start.
    async fn set_autologin(&self, username: &str) -> Result<(), SettingsError>;

    /// Apply the parental-control defaults for `username`. `None` keeps the
    /// system default.
    async fn set_user_cookies(
        &self,
        enabled: Option<bool>,
        username: &str,
    ) -> Result<(), SettingsError>;

    /// Make the graphical session start on boot.
    async fn reconfigure_autostart_policy(&self) -> Result<(), SettingsError>;
}

/// Settings applied to the running host through files and commands.
pub struct HostSettings {
    runner: Arc<dyn CommandRunner>,
    hostname_path: PathBuf,
    hosts_path: PathBuf,
    autologin_conf_path: PathBuf,
    display_manager: String,
    parental_hook: Option<PathBuf>,
}

impl HostSettings {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &InitConfig) -> Self {
        Self {
            runner,
            hostname_path: config.hostname_path.clone(),
            hosts_path: config.hosts_path.clone(),
            autologin_conf_path: config.autologin_conf_path.clone(),
            display_manager: config.display_manager.clone(),
            parental_hook: config.parental_hook.clone(),
        }
    }

    async fn run_checked(&self, spec: CommandSpec) -> Result<(), SettingsError> {
        let output = self.runner.run(&spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(SettingsError::CommandFailed {
                program: spec.program,
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl SystemSettings for HostSettings {
    async fn set_hostname(&self, name: &str) -> Result<(), SettingsError> {
        write_file(&self.hostname_path, &format!("{name}\n")).await?;

        let hosts = read_optional(&self.hosts_path).await?;
        write_file(&self.hosts_path, &apply_hostname_to_hosts(&hosts, name)).await?;

        self.run_checked(CommandSpec::new("hostname").arg(name))
            .await?;
        tracing::info!(hostname = %name, "Hostname set");
        Ok(())
    }

    async fn set_autologin(&self, username: &str) -> Result<(), SettingsError> {
        let conf = read_optional(&self.autologin_conf_path).await?;
        write_file(&self.autologin_conf_path, &apply_autologin(&conf, username)).await?;
        tracing::info!(user = %username, "Autologin enabled");
        Ok(())
    }

    async fn set_user_cookies(
        &self,
        enabled: Option<bool>,
        username: &str,
    ) -> Result<(), SettingsError> {
        let Some(hook) = &self.parental_hook else {
            tracing::debug!(user = %username, "No parental-control hook configured");
            return Ok(());
        };

        let mut spec = CommandSpec::new(hook.to_string_lossy()).arg(username);
        match enabled {
            Some(true) => spec = spec.arg("enable"),
            Some(false) => spec = spec.arg("disable"),
            None => {}
        }
        self.run_checked(spec).await
    }

    async fn reconfigure_autostart_policy(&self) -> Result<(), SettingsError> {
        self.run_checked(
            CommandSpec::new("systemctl")
                .arg("enable")
                .arg(&self.display_manager),
        )
        .await
    }
}

/// Point the `127.0.1.1` entry of an `/etc/hosts` file at `name`.
pub fn apply_hostname_to_hosts(contents: &str, name: &str) -> String {
    let entry = format!("{HOSTNAME_LOOPBACK}\t{name}");
    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            if line.split_whitespace().next() == Some(HOSTNAME_LOOPBACK) {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Set `autologin-user=<username>` in the seat section of a display manager
/// config, uncommenting or replacing any existing value.
pub fn apply_autologin(contents: &str, username: &str) -> String {
    let entry = format!("autologin-user={username}");
    let mut lines: Vec<String> = Vec::new();
    let mut in_seat = false;
    let mut seat_seen = false;
    let mut written = false;

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            if in_seat && !written {
                lines.push(entry.clone());
                written = true;
            }
            in_seat = SEAT_SECTIONS.contains(&trimmed);
            seat_seen |= in_seat;
            lines.push(line.to_string());
            continue;
        }

        let key = trimmed.trim_start_matches('#').trim_start();
        if in_seat && key.starts_with("autologin-user=") {
            if !written {
                lines.push(entry.clone());
                written = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }

    if !written {
        if !seat_seen {
            lines.push(SEAT_SECTIONS[0].to_string());
        }
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

async fn read_optional(path: &Path) -> Result<String, SettingsError> {
    match fs::read_to_string(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(SettingsError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

async fn write_file(path: &Path, content: &str) -> Result<(), SettingsError> {
    let io_err = |source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    fs::write(path, content).await.map_err(io_err)
}
