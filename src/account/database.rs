//! Read-only view of the OS account database.
//!
//! [`NssAccountDatabase`] asks the C library, so accounts served by LDAP,
//! sssd or systemd-homed are seen too. [`FileAccountDatabase`] reads
//! `passwd`/`group`-format files directly and backs tests.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use users::os::unix::{GroupExt, UserExt};

/// One `/etc/passwd` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

/// One `/etc/group` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

/// Queries against the account database. Mutations go through commands.
#[async_trait]
pub trait AccountDatabase: Send + Sync {
    async fn find_user(&self, name: &str) -> std::io::Result<Option<UserRecord>>;

    async fn find_user_by_uid(&self, uid: u32) -> std::io::Result<Option<UserRecord>>;

    /// Every uid currently allocated.
    async fn all_uids(&self) -> std::io::Result<Vec<u32>>;

    async fn find_group(&self, name: &str) -> std::io::Result<Option<GroupRecord>>;
}

/// Account database resolved through NSS (`getpwnam`, `getpwuid`,
/// `getpwent`, `getgrnam`).
#[derive(Debug, Clone, Default)]
pub struct NssAccountDatabase;

impl NssAccountDatabase {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccountDatabase for NssAccountDatabase {
    async fn find_user(&self, name: &str) -> io::Result<Option<UserRecord>> {
        let name = name.to_string();
        blocking(move || users::get_user_by_name(&name).map(|u| user_record(&u))).await
    }

    async fn find_user_by_uid(&self, uid: u32) -> io::Result<Option<UserRecord>> {
        blocking(move || users::get_user_by_uid(uid).map(|u| user_record(&u))).await
    }

    async fn all_uids(&self) -> io::Result<Vec<u32>> {
        blocking(|| {
            // SAFETY: getpwent iteration is not reentrant; this process never
            // enumerates users from more than one place at a time.
            unsafe { users::all_users() }.map(|u| u.uid()).collect()
        })
        .await
    }

    async fn find_group(&self, name: &str) -> io::Result<Option<GroupRecord>> {
        let name = name.to_string();
        blocking(move || {
            users::get_group_by_name(&name).map(|g| GroupRecord {
                name: g.name().to_string_lossy().into_owned(),
                gid: g.gid(),
                members: g
                    .members()
                    .iter()
                    .map(|m| m.to_string_lossy().into_owned())
                    .collect(),
            })
        })
        .await
    }
}

fn user_record(user: &users::User) -> UserRecord {
    UserRecord {
        name: user.name().to_string_lossy().into_owned(),
        uid: user.uid(),
        gid: user.primary_group_id(),
        home: user.home_dir().to_path_buf(),
        shell: user.shell().to_string_lossy().into_owned(),
    }
}

/// NSS lookups block (and may hit the network), so keep them off the runtime.
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(io::Error::other)
}

/// Account database read from `passwd`/`group`-format files.
#[derive(Debug, Clone)]
pub struct FileAccountDatabase {
    passwd_path: PathBuf,
    group_path: PathBuf,
}

impl FileAccountDatabase {
    pub fn new(passwd_path: impl Into<PathBuf>, group_path: impl Into<PathBuf>) -> Self {
        Self {
            passwd_path: passwd_path.into(),
            group_path: group_path.into(),
        }
    }

    async fn users(&self) -> io::Result<Vec<UserRecord>> {
        Ok(read_lines(&self.passwd_path)
            .await?
            .iter()
            .filter_map(|line| parse_passwd_line(line))
            .collect())
    }
}

#[async_trait]
impl AccountDatabase for FileAccountDatabase {
    async fn find_user(&self, name: &str) -> io::Result<Option<UserRecord>> {
        Ok(self.users().await?.into_iter().find(|u| u.name == name))
    }

    async fn find_user_by_uid(&self, uid: u32) -> io::Result<Option<UserRecord>> {
        Ok(self.users().await?.into_iter().find(|u| u.uid == uid))
    }

    async fn all_uids(&self) -> io::Result<Vec<u32>> {
        Ok(self.users().await?.into_iter().map(|u| u.uid).collect())
    }

    async fn find_group(&self, name: &str) -> io::Result<Option<GroupRecord>> {
        Ok(read_lines(&self.group_path)
            .await?
            .iter()
            .filter_map(|line| parse_group_line(line))
            .find(|g| g.name == name))
    }
}

async fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path).await?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Parse `name:x:uid:gid:gecos:home:shell`. Comments and malformed lines yield `None`.
pub fn parse_passwd_line(line: &str) -> Option<UserRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 7 || fields[0].is_empty() {
        return None;
    }
    Some(UserRecord {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        home: PathBuf::from(fields[5]),
        shell: fields[6].to_string(),
    })
}

/// Parse `name:x:gid:member,member`.
pub fn parse_group_line(line: &str) -> Option<GroupRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 4 || fields[0].is_empty() {
        return None;
    }
    Some(GroupRecord {
        name: fields[0].to_string(),
        gid: fields[2].parse().ok()?,
        members: fields[3]
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
    })
}
