use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The Session phase state machine (§4.3). Variants serialize exactly as
/// spelled in `status.phase` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Creating,
    Running,
    Stopping,
    Completed,
    Failed,
    Stopped,
    Error,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Pending
    }
}

impl Phase {
    /// Terminal phases per §4.3 Start/Restart: `terminalPhases`.
    pub const TERMINAL: [Phase; 4] = [Phase::Completed, Phase::Failed, Phase::Stopped, Phase::Error];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Whether `phase -> next` is a legal edge in the graph drawn in §4.3.
    /// Used by property tests walking Create/Start/Stop/Delete sequences.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::{Completed, Creating, Error, Failed, Pending, Running, Stopped, Stopping};
        matches!(
            (self, next),
            (Pending, Creating)
                | (Creating, Running)
                | (Creating, Failed)
                | (Creating, Error)
                | (Running, Stopping)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
        ) || (self.is_terminal() && next == Pending) // continuation via start
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pending",
            Self::Creating => "Creating",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        })
    }
}

impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => Self::Pending,
            "Creating" => Self::Creating,
            "Running" => Self::Running,
            "Stopping" => Self::Stopping,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            "Stopped" => Self::Stopped,
            "Error" => Self::Error,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases_match_spec() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Stopped.is_terminal());
        assert!(Phase::Error.is_terminal());
        assert!(!Phase::Running.is_terminal());
        assert!(!Phase::Pending.is_terminal());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for phase in [
            Phase::Pending,
            Phase::Creating,
            Phase::Running,
            Phase::Stopping,
            Phase::Completed,
            Phase::Failed,
            Phase::Stopped,
            Phase::Error,
        ] {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
    }

    #[test]
    fn terminal_can_always_continue_to_pending() {
        for phase in Phase::TERMINAL {
            assert!(phase.can_transition_to(Phase::Pending));
        }
    }

    #[test]
    fn pending_only_advances_to_creating() {
        assert!(Phase::Pending.can_transition_to(Phase::Creating));
        assert!(!Phase::Pending.can_transition_to(Phase::Running));
    }

    #[test]
    fn running_can_stop_or_terminate() {
        assert!(Phase::Running.can_transition_to(Phase::Stopping));
        assert!(Phase::Running.can_transition_to(Phase::Completed));
        assert!(Phase::Running.can_transition_to(Phase::Failed));
        assert!(!Phase::Running.can_transition_to(Phase::Pending));
    }

    proptest::proptest! {
        #[test]
        fn can_transition_to_is_reflexive_false(seed in 0u8..8) {
            let phase = match seed {
                0 => Phase::Pending,
                1 => Phase::Creating,
                2 => Phase::Running,
                3 => Phase::Stopping,
                4 => Phase::Completed,
                5 => Phase::Failed,
                6 => Phase::Stopped,
                _ => Phase::Error,
            };
            // No phase transitions to itself in one step.
            prop_assert!(!phase.can_transition_to(phase));
        }
    }
}
