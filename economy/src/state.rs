//! Economy service state definitions.

/// Operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EconomyState {
    /// Storage and engines are being set up.
    Starting,
    /// Accepting actions.
    Running,
    /// Not accepting new actions.
    ShuttingDown,
    /// Stopped.
    Stopped,
}

impl EconomyState {
    /// Check if new actions are accepted.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, EconomyState::Running)
    }

    /// Check if the service is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EconomyState::Stopped)
    }
}
