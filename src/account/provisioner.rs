//! Account provisioner: OS user lifecycle for onboarding accounts.
//!
//! All mutations go through `useradd`, `chpasswd`, `groupadd`, `usermod`,
//! `killall` and `userdel`, invoked with argument vectors. A failure after the
//! account exists triggers a best-effort delete so no half-configured account
//! is left behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::fs;

use crate::account::database::{AccountDatabase, UserRecord};
use crate::account::unique;
use crate::config::{
    DEFAULT_USER_GROUPS, FIRST_UID, InitConfig, MAX_UNIQUE_ATTEMPTS, SYSTEM_GROUP,
};
use crate::error::AccountError;
use crate::system::command::{CommandRunner, CommandSpec};
use crate::system::settings::SystemSettings;

/// Umask applied to the new home directory so it is private to its owner.
const HOME_UMASK: &str = "0077";

/// Candidate `-old` suffixes tried when relocating a stale home directory.
const MAX_HOME_RELOCATIONS: u32 = 100;

/// Creates and deletes onboarding accounts.
pub struct Provisioner {
    accounts: Arc<dyn AccountDatabase>,
    runner: Arc<dyn CommandRunner>,
    settings: Arc<dyn SystemSettings>,
    home_root: PathBuf,
    login_shell: String,
    password: SecretString,
}

impl Provisioner {
    pub fn new(
        accounts: Arc<dyn AccountDatabase>,
        runner: Arc<dyn CommandRunner>,
        settings: Arc<dyn SystemSettings>,
        config: &InitConfig,
    ) -> Self {
        Self {
            accounts,
            runner,
            settings,
            home_root: config.home_root.clone(),
            login_shell: config.login_shell.clone(),
            password: config.default_password.clone(),
        }
    }

    /// Whether an account called `name` exists.
    pub async fn user_exists(&self, name: &str) -> Result<bool, AccountError> {
        Ok(self.accounts.find_user(name).await?.is_some())
    }

    pub async fn find_user(&self, name: &str) -> Result<Option<UserRecord>, AccountError> {
        Ok(self.accounts.find_user(name).await?)
    }

    /// Smallest uid at or above [`FIRST_UID`] that no account uses.
    ///
    /// Enumeration may not list every directory-service account, so each
    /// candidate is also looked up by uid.
    pub async fn next_uid(&self) -> Result<u32, AccountError> {
        let used: HashSet<u32> = self.accounts.all_uids().await?.into_iter().collect();
        let mut uid = FIRST_UID;
        while used.contains(&uid) || self.accounts.find_user_by_uid(uid).await?.is_some() {
            uid += 1;
        }
        Ok(uid)
    }

    /// Derive a free username from `base` (see [`unique::make_unique`]).
    pub async fn make_unique(&self, base: &str) -> Result<String, AccountError> {
        unique::make_unique(self.accounts.as_ref(), base, MAX_UNIQUE_ATTEMPTS).await
    }

    /// Create and initialise the account `name`.
    ///
    /// Refuses to touch an existing account. A home directory left over at the
    /// target path is moved aside to `<home>-old` first.
    pub async fn create_user(&self, name: &str) -> Result<(), AccountError> {
        if self.user_exists(name).await? {
            return Err(AccountError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let home = self.home_root.join(name);
        self.relocate_stale_home(name, &home).await?;

        let uid = self.next_uid().await?;
        let home_arg = home.to_string_lossy().to_string();
        let umask = format!("UMASK={HOME_UMASK}");
        let created = self
            .run_step(
                name,
                "create the account",
                CommandSpec::new("useradd").args([
                    "-u",
                    &uid.to_string(),
                    "-m",
                    "-d",
                    &home_arg,
                    "-K",
                    &umask,
                    "-s",
                    &self.login_shell,
                    "--",
                    name,
                ]),
            )
            .await;
        if let Err(e) = created {
            // useradd can fail after writing the passwd entry (e.g. exit 12,
            // home directory not created).
            if self.user_exists(name).await.unwrap_or(true) {
                self.roll_back(name).await;
            }
            return Err(e);
        }
        tracing::info!(user = %name, uid, "Account created");

        if let Err(e) = self.finish_setup(name).await {
            tracing::error!(user = %name, error = %e, "Account setup failed, removing account");
            self.roll_back(name).await;
            return Err(e);
        }

        Ok(())
    }

    /// Best-effort removal of a half-created account.
    async fn roll_back(&self, name: &str) {
        if let Err(e) = self.delete_user(name).await {
            tracing::warn!(user = %name, error = %e, "Compensating delete failed");
        }
    }

    /// Password, group memberships and parental defaults for an existing
    /// account. Every step is idempotent, so this also completes an account
    /// whose creation was interrupted.
    pub async fn finish_setup(&self, name: &str) -> Result<(), AccountError> {
        let credentials = SecretString::from(format!("{name}:{}\n", self.password.expose_secret()));
        self.run_step(
            name,
            "set the password",
            CommandSpec::new("chpasswd").stdin(credentials),
        )
        .await?;

        self.ensure_system_group().await?;

        self.run_step(
            name,
            "add the user to its groups",
            CommandSpec::new("usermod").args(["-G", &DEFAULT_USER_GROUPS.join(","), "--", name]),
        )
        .await?;

        self.settings.set_user_cookies(None, name).await?;
        Ok(())
    }

    /// Kill every process of `name`, then remove the account and its home.
    pub async fn delete_user(&self, name: &str) -> Result<(), AccountError> {
        match self
            .runner
            .run(&CommandSpec::new("killall").args(["-KILL", "-u", name]))
            .await
        {
            Ok(output) if !output.success() => {
                tracing::debug!(user = %name, "No processes killed: {}", output.failure_reason());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(user = %name, error = %e, "killall failed"),
        }

        let output = self
            .runner
            .run(&CommandSpec::new("userdel").args(["-r", "--", name]))
            .await?;
        if !output.success() {
            return Err(AccountError::DeleteFailed {
                name: name.to_string(),
                reason: output.failure_reason(),
            });
        }

        tracing::info!(user = %name, "Account deleted");
        Ok(())
    }

    /// Delete every member of the onboarding group. Returns the deleted names.
    pub async fn delete_all_users(&self) -> Result<Vec<String>, AccountError> {
        let Some(group) = self.accounts.find_group(SYSTEM_GROUP).await? else {
            return Ok(Vec::new());
        };

        for member in &group.members {
            self.delete_user(member).await?;
        }
        Ok(group.members)
    }

    async fn ensure_system_group(&self) -> Result<(), AccountError> {
        if self.accounts.find_group(SYSTEM_GROUP).await?.is_some() {
            return Ok(());
        }

        let output = self
            .runner
            .run(&CommandSpec::new("groupadd").args(["-f", SYSTEM_GROUP]))
            .await?;
        if !output.success() {
            return Err(AccountError::GroupSetupFailed {
                group: SYSTEM_GROUP.to_string(),
                reason: output.failure_reason(),
            });
        }
        Ok(())
    }

    async fn relocate_stale_home(&self, name: &str, home: &Path) -> Result<(), AccountError> {
        if !path_exists(home).await {
            return Ok(());
        }

        let target = self.free_old_path(name).await.ok_or_else(|| {
            AccountError::HomeRelocation {
                path: home.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "no free -old path",
                ),
            }
        })?;

        tracing::warn!(
            user = %name,
            from = %home.display(),
            to = %target.display(),
            "Home directory for the new user was there already, moving it"
        );
        fs::rename(home, &target)
            .await
            .map_err(|source| AccountError::HomeRelocation {
                path: home.display().to_string(),
                source,
            })
    }

    /// `<home>-old`, or `<home>-old<n>` if earlier relocations took it.
    async fn free_old_path(&self, name: &str) -> Option<PathBuf> {
        let first = self.home_root.join(format!("{name}-old"));
        if !path_exists(&first).await {
            return Some(first);
        }
        for n in 1..=MAX_HOME_RELOCATIONS {
            let candidate = self.home_root.join(format!("{name}-old{n}"));
            if !path_exists(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn run_step(
        &self,
        name: &str,
        step: &'static str,
        spec: CommandSpec,
    ) -> Result<(), AccountError> {
        let output = self.runner.run(&spec).await?;
        if output.success() {
            return Ok(());
        }
        let reason = output.failure_reason();
        tracing::error!(user = %name, command = %spec.program, %reason, "Unable to {step}");
        Err(AccountError::CommandFailed {
            name: name.to_string(),
            step,
            reason,
        })
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}
