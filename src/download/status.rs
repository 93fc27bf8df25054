//! Download lifecycle states and the transition rules between them.

use std::fmt;

/// Lifecycle state of a single download.
///
/// Exactly one state holds at any time. Transitions only happen along the
/// edges encoded in [`DownloadStatus::can_transition`]; every control
/// operation validates against that table before mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Registered but never started.
    Pending,
    /// A transfer task is running (or a retry/backoff wait is in progress).
    Downloading,
    /// Transfer interrupted cooperatively; can be resumed.
    Paused,
    /// Transfer cancelled; the partial file is left untouched.
    Stopped,
    /// Transfer completed successfully.
    Finished,
    /// All attempts exhausted; the failure detail is recorded on the download.
    Failed,
}

impl DownloadStatus {
    /// Returns the display representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Returns true once the download has reached a resting state with no
    /// transfer task running and nothing to resume.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Finished | Self::Failed)
    }

    /// Returns true while a transfer task is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Downloading)
    }

    /// Returns true if the state machine permits moving from `self` to `next`.
    ///
    /// Paused downloads must be resumed rather than restarted, and stopped,
    /// failed, and finished downloads may all be started again from scratch.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Downloading)
                | (
                    Self::Downloading,
                    Self::Paused | Self::Stopped | Self::Finished | Self::Failed
                )
                | (Self::Paused, Self::Downloading | Self::Stopped)
                | (Self::Stopped | Self::Finished | Self::Failed, Self::Downloading)
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid download status: {value}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [DownloadStatus; 6] = [
        DownloadStatus::Pending,
        DownloadStatus::Downloading,
        DownloadStatus::Paused,
        DownloadStatus::Stopped,
        DownloadStatus::Finished,
        DownloadStatus::Failed,
    ];

    #[test]
    fn test_pending_only_starts() {
        assert!(DownloadStatus::Pending.can_transition(DownloadStatus::Downloading));
        for next in [
            DownloadStatus::Paused,
            DownloadStatus::Stopped,
            DownloadStatus::Finished,
            DownloadStatus::Failed,
        ] {
            assert!(
                !DownloadStatus::Pending.can_transition(next),
                "pending must not jump to {next}"
            );
        }
    }

    #[test]
    fn test_downloading_reaches_every_outcome() {
        for next in [
            DownloadStatus::Paused,
            DownloadStatus::Stopped,
            DownloadStatus::Finished,
            DownloadStatus::Failed,
        ] {
            assert!(DownloadStatus::Downloading.can_transition(next));
        }
        assert!(!DownloadStatus::Downloading.can_transition(DownloadStatus::Pending));
    }

    #[test]
    fn test_paused_resumes_or_stops() {
        assert!(DownloadStatus::Paused.can_transition(DownloadStatus::Downloading));
        assert!(DownloadStatus::Paused.can_transition(DownloadStatus::Stopped));
        assert!(!DownloadStatus::Paused.can_transition(DownloadStatus::Finished));
        assert!(!DownloadStatus::Paused.can_transition(DownloadStatus::Failed));
    }

    #[test]
    fn test_resting_states_can_restart() {
        for from in [
            DownloadStatus::Stopped,
            DownloadStatus::Finished,
            DownloadStatus::Failed,
        ] {
            assert!(
                from.can_transition(DownloadStatus::Downloading),
                "{from} must allow a fresh start"
            );
            assert!(!from.can_transition(DownloadStatus::Paused));
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ALL {
            assert!(
                !status.can_transition(status),
                "{status} must not transition to itself"
            );
        }
    }

    #[test]
    fn test_terminal_and_active_predicates() {
        assert!(DownloadStatus::Finished.is_terminal());
        assert!(DownloadStatus::Stopped.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(!DownloadStatus::Paused.is_terminal());
        assert!(!DownloadStatus::Pending.is_terminal());
        assert!(DownloadStatus::Downloading.is_active());
        assert!(!DownloadStatus::Paused.is_active());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ALL {
            let parsed: DownloadStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("queued".parse::<DownloadStatus>().is_err());
    }
}
