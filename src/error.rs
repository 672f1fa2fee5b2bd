//! Error types for firstboot.

/// Top-level error type for the onboarding flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// OS account provisioning errors.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("The user '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Unable to {step} for user '{name}': {reason}")]
    CommandFailed {
        name: String,
        step: &'static str,
        reason: String,
    },

    #[error("Unable to set up group {group}: {reason}")]
    GroupSetupFailed { group: String, reason: String },

    #[error("Deleting the user '{name}' failed: {reason}")]
    DeleteFailed { name: String, reason: String },

    #[error("No unique username derived from '{base}' after {attempts} attempts")]
    NoUniqueName { base: String, attempts: u32 },

    #[error("Failed to relocate existing home directory {path}: {source}")]
    HomeRelocation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Account database lookup failed: {0}")]
    Lookup(#[from] std::io::Error),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Persisted status errors.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Already at terminal stage {0}")]
    Terminal(String),
}

/// External command execution errors.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Hostname, autologin and parental-control configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Terminal presentation errors.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Terminal IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input closed while waiting for {0}")]
    Closed(String),
}

/// Flow sequencing errors.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Onboarding already complete")]
    AlreadyComplete,

    #[error("Stage {stage} requires a provisioned username")]
    MissingUsername { stage: String },

    #[error("Preset username '{name}' is not usable: {reason}")]
    InvalidPresetUsername { name: String, reason: String },

    #[error("No account named '{name}'")]
    UnknownAccount { name: String },

    #[error("Scoped directory {path} failed: {source}")]
    ScopedDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for firstboot.
pub type Result<T> = std::result::Result<T, Error>;
