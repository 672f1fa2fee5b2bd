//! Collaborators on the host system: command execution, device settings
//! and the terminal.

pub mod command;
pub mod settings;
pub mod terminal;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use settings::{HostSettings, SystemSettings};
pub use terminal::{ConsoleTerminal, Terminal};
