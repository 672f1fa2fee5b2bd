//! Per-invocation flow parameters.

/// Options for one run of the flow. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowParams {
    /// Bypass interactive and decorative behaviour (headless provisioning).
    pub skip: bool,
    /// Username to provision in skip mode instead of the default.
    pub preset_username: Option<String>,
}

impl FlowParams {
    pub fn interactive() -> Self {
        Self::default()
    }

    pub fn headless(preset_username: Option<String>) -> Self {
        Self {
            skip: true,
            preset_username,
        }
    }
}
