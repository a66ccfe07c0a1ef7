//! Error types for the request layer.

/// Why a send never reached the wire.
///
/// Refusals are reported synchronously through the connector's
/// send-failed notification; the descriptor moves to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendRefusal {
    /// Every attempt allowed this cycle has been used.
    #[error("retry limit reached ({attempts}/{max_attempts})")]
    RetryLimit { attempts: u32, max_attempts: u32 },

    /// The idle watchdog fired; the session is considered expired.
    #[error("session idle")]
    Idle,
}

impl SendRefusal {
    /// Short machine-readable reason: `"retry-limit"` or `"idle"`.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RetryLimit { .. } => "retry-limit",
            Self::Idle => "idle",
        }
    }
}
