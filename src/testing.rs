//! In-memory stand-ins for the host collaborators, shared by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::account::database::{AccountDatabase, GroupRecord, UserRecord};
use crate::error::{CommandError, SettingsError, TerminalError};
use crate::system::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::system::settings::SystemSettings;
use crate::system::terminal::Terminal;

/// A command as the fake saw it, with stdin exposed for assertions.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub interactive: bool,
}

#[derive(Default)]
struct FakeState {
    users: BTreeMap<String, UserRecord>,
    groups: BTreeMap<String, GroupRecord>,
    passwords: HashSet<String>,
    commands: Vec<RecordedCommand>,
    failing: HashSet<String>,
    // program -> exit code returned after the effect is applied
    failing_after_apply: HashMap<String, i32>,
    // uids visible to lookup by uid but missing from enumeration
    hidden_uids: HashSet<u32>,
}

/// Account database and command runner simulating the account tools.
pub struct FakeSystem {
    home_root: PathBuf,
    state: Mutex<FakeState>,
}

impl FakeSystem {
    pub fn new(home_root: impl AsRef<Path>) -> Self {
        Self {
            home_root: home_root.as_ref().to_path_buf(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn add_user(&self, name: &str) {
        let uid = {
            let state = self.state.lock().unwrap();
            (2000..).find(|u| !state.users.values().any(|r| r.uid == *u)).unwrap()
        };
        self.add_user_with_uid(name, uid);
    }

    pub fn add_user_with_uid(&self, name: &str, uid: u32) {
        self.add_user_with_ids(name, uid, uid);
    }

    pub fn add_user_with_ids(&self, name: &str, uid: u32, gid: u32) {
        let mut state = self.state.lock().unwrap();
        state.users.insert(
            name.to_string(),
            UserRecord {
                name: name.to_string(),
                uid,
                gid,
                home: self.home_root.join(name),
                shell: "/bin/bash".to_string(),
            },
        );
    }

    /// Make every later invocation of `program` exit with status 1.
    pub fn fail_program(&self, program: &str) {
        self.state.lock().unwrap().failing.insert(program.to_string());
    }

    /// Apply every later invocation of `program`, then exit with `code`.
    pub fn fail_after_apply(&self, program: &str, code: i32) {
        self.state
            .lock()
            .unwrap()
            .failing_after_apply
            .insert(program.to_string(), code);
    }

    /// A uid that only shows up when looked up directly.
    pub fn add_hidden_uid(&self, uid: u32) {
        self.state.lock().unwrap().hidden_uids.insert(uid);
    }

    pub fn user(&self, name: &str) -> Option<UserRecord> {
        self.state.lock().unwrap().users.get(name).cloned()
    }

    pub fn user_names(&self) -> Vec<String> {
        self.state.lock().unwrap().users.keys().cloned().collect()
    }

    pub fn password_set(&self, name: &str) -> bool {
        self.state.lock().unwrap().passwords.contains(name)
    }

    pub fn is_member(&self, user: &str, group: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(group)
            .is_some_and(|g| g.members.iter().any(|m| m == user))
    }

    pub fn commands_for(&self, program: &str) -> Vec<RecordedCommand> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    pub fn ran(&self, program: &str, args: &[&str]) -> bool {
        self.commands_for(program)
            .iter()
            .any(|c| c.args.iter().map(String::as_str).eq(args.iter().copied()))
    }

    fn record(&self, spec: &CommandSpec, interactive: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        state.commands.push(RecordedCommand {
            program: spec.program.clone(),
            args: spec.args.clone(),
            stdin: spec.stdin.as_ref().map(|s| s.expose_secret().to_string()),
            interactive,
        });
        !state.failing.contains(&spec.program)
    }

    fn apply(&self, spec: &CommandSpec) -> CommandOutput {
        let args = &spec.args;
        let mut state = self.state.lock().unwrap();
        match spec.program.as_str() {
            "useradd" => {
                let name = args.last().cloned().unwrap_or_default();
                if state.users.contains_key(&name) {
                    return failed(9, "user already exists");
                }
                let uid = flag_value(args, "-u")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1001);
                let home = flag_value(args, "-d")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.home_root.join(&name));
                if args.iter().any(|a| a == "-m") {
                    let _ = std::fs::create_dir_all(&home);
                }
                state.users.insert(
                    name.clone(),
                    UserRecord {
                        name,
                        uid,
                        gid: uid,
                        home,
                        shell: flag_value(args, "-s").unwrap_or("/bin/sh").to_string(),
                    },
                );
            }
            "chpasswd" => {
                let input = spec
                    .stdin
                    .as_ref()
                    .map(|s| s.expose_secret().to_string())
                    .unwrap_or_default();
                let name = input.split(':').next().unwrap_or_default().to_string();
                if !state.users.contains_key(&name) {
                    return failed(1, "unknown user");
                }
                state.passwords.insert(name);
            }
            "groupadd" => {
                let name = args.last().cloned().unwrap_or_default();
                let gid = 1000 + state.groups.len() as u32;
                state.groups.entry(name.clone()).or_insert(GroupRecord {
                    name,
                    gid,
                    members: Vec::new(),
                });
            }
            "usermod" => {
                let name = args.last().cloned().unwrap_or_default();
                if !state.users.contains_key(&name) {
                    return failed(6, "user does not exist");
                }
                let groups = flag_value(args, "-G").unwrap_or_default().to_string();
                for group in groups.split(',').filter(|g| !g.is_empty()) {
                    let gid = 100 + state.groups.len() as u32;
                    let record = state.groups.entry(group.to_string()).or_insert(GroupRecord {
                        name: group.to_string(),
                        gid,
                        members: Vec::new(),
                    });
                    if !record.members.contains(&name) {
                        record.members.push(name.clone());
                    }
                }
            }
            "userdel" => {
                let name = args.last().cloned().unwrap_or_default();
                let Some(user) = state.users.remove(&name) else {
                    return failed(6, "user does not exist");
                };
                state.passwords.remove(&name);
                for group in state.groups.values_mut() {
                    group.members.retain(|m| m != &name);
                }
                if args.iter().any(|a| a == "-r") {
                    let _ = std::fs::remove_dir_all(&user.home);
                }
            }
            _ => {}
        }
        CommandOutput::default()
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn failed(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: code,
    }
}

#[async_trait]
impl AccountDatabase for FakeSystem {
    async fn find_user(&self, name: &str) -> std::io::Result<Option<UserRecord>> {
        Ok(self.user(name))
    }

    async fn all_uids(&self) -> std::io::Result<Vec<u32>> {
        Ok(self.state.lock().unwrap().users.values().map(|u| u.uid).collect())
    }

    async fn find_user_by_uid(&self, uid: u32) -> std::io::Result<Option<UserRecord>> {
        let state = self.state.lock().unwrap();
        if state.hidden_uids.contains(&uid) {
            return Ok(Some(UserRecord {
                name: format!("remote{uid}"),
                uid,
                gid: uid,
                home: self.home_root.join(format!("remote{uid}")),
                shell: "/bin/sh".to_string(),
            }));
        }
        Ok(state.users.values().find(|u| u.uid == uid).cloned())
    }

    async fn find_group(&self, name: &str) -> std::io::Result<Option<GroupRecord>> {
        Ok(self.state.lock().unwrap().groups.get(name).cloned())
    }
}

#[async_trait]
impl CommandRunner for FakeSystem {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        if !self.record(spec, false) {
            return Ok(failed(1, "simulated failure"));
        }
        let output = self.apply(spec);
        let late_failure = self
            .state
            .lock()
            .unwrap()
            .failing_after_apply
            .get(&spec.program)
            .copied();
        match late_failure {
            Some(code) => Ok(failed(code, "simulated failure after apply")),
            None => Ok(output),
        }
    }

    async fn run_interactive(&self, spec: &CommandSpec) -> Result<i32, CommandError> {
        if !self.record(spec, true) {
            return Ok(1);
        }
        Ok(0)
    }
}

/// Settings collaborator that records calls.
#[derive(Default)]
pub struct RecordingSettings {
    calls: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSettings {
    pub fn fail(&self, call: &str) {
        self.failing.lock().unwrap().insert(call.to_string());
    }

    pub fn calls(&self, call: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == call)
            .map(|(_, arg)| arg.clone())
            .collect()
    }

    pub fn cookies_for(&self) -> Vec<String> {
        self.calls("set_user_cookies")
    }

    fn record(&self, call: &str, arg: &str) -> Result<(), SettingsError> {
        if self.failing.lock().unwrap().contains(call) {
            return Err(SettingsError::CommandFailed {
                program: call.to_string(),
                code: 1,
                stderr: "simulated failure".to_string(),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push((call.to_string(), arg.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SystemSettings for RecordingSettings {
    async fn set_hostname(&self, name: &str) -> Result<(), SettingsError> {
        self.record("set_hostname", name)
    }

    async fn set_autologin(&self, username: &str) -> Result<(), SettingsError> {
        self.record("set_autologin", username)
    }

    async fn set_user_cookies(
        &self,
        _enabled: Option<bool>,
        username: &str,
    ) -> Result<(), SettingsError> {
        self.record("set_user_cookies", username)
    }

    async fn reconfigure_autostart_policy(&self) -> Result<(), SettingsError> {
        self.record("reconfigure_autostart_policy", "")
    }
}

/// Terminal fed from a script of input lines, capturing everything shown.
#[derive(Default)]
pub struct ScriptedTerminal {
    inputs: Mutex<VecDeque<String>>,
    output: Mutex<Vec<String>>,
}

impl ScriptedTerminal {
    pub fn with_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: Mutex::new(inputs.into_iter().map(Into::into).collect()),
            output: Mutex::new(Vec::new()),
        }
    }

    pub fn output(&self) -> Vec<String> {
        self.output.lock().unwrap().clone()
    }

    pub fn said(&self, needle: &str) -> bool {
        self.output().iter().any(|line| line.contains(needle))
    }

    pub fn remaining_inputs(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl Terminal for ScriptedTerminal {
    async fn say(&self, text: &str) -> Result<(), TerminalError> {
        self.output.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn prompt_line(&self, label: &str) -> Result<String, TerminalError> {
        self.output.lock().unwrap().push(label.to_string());
        self.inputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TerminalError::Closed(label.trim().to_string()))
    }

    async fn clear_screen(&self) -> Result<(), TerminalError> {
        Ok(())
    }
}
