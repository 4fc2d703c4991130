//! What a session does to its process when an expectation fails.

use serde::{Deserialize, Serialize};

/// Policy applied by [`Session::expect`](crate::Session::expect) and friends
/// before a failed expectation is returned.
///
/// [`Session::expect_outcome`](crate::Session::expect_outcome) never applies
/// it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Terminate the process (SIGTERM, then SIGKILL after the grace period)
    /// and then return the error.
    #[default]
    TerminateOnFailure,

    /// Leave the process running so the caller can keep interacting with it.
    KeepAlive,
}

impl RecoveryPolicy {
    /// Whether a failed expectation terminates the process.
    #[must_use]
    pub const fn terminates(self) -> bool {
        matches!(self, Self::TerminateOnFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_terminates() {
        assert!(RecoveryPolicy::default().terminates());
        assert!(!RecoveryPolicy::KeepAlive.terminates());
    }

    #[test]
    fn serde_names() {
        let p: RecoveryPolicy = serde_json::from_str("\"keep_alive\"").expect("parse");
        assert_eq!(p, RecoveryPolicy::KeepAlive);
    }
}
