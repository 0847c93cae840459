use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a user's warning reason log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarningEntry {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Counter value at the time this entry was appended.
    pub warning_number: u32,
}

/// What to do after a warning has been recorded.
///
/// The ledger only counts; this policy decision belongs to the moderation
/// pipeline. `count` is the post-increment value returned by `add_warning`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escalation {
    /// Report the warning and the remaining budget.
    Warn { count: u32, max: u32 },
    /// The threshold is reached: remove the user and clear the ledger entry.
    Ban,
}

pub fn evaluate(count: u32, max_warnings: u32) -> Escalation {
    if count >= max_warnings {
        Escalation::Ban
    } else {
        Escalation::Warn {
            count,
            max: max_warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warns_below_threshold() {
        assert_eq!(evaluate(1, 3), Escalation::Warn { count: 1, max: 3 });
        assert_eq!(evaluate(2, 3), Escalation::Warn { count: 2, max: 3 });
    }

    #[test]
    fn bans_at_and_above_threshold() {
        assert_eq!(evaluate(3, 3), Escalation::Ban);
        // Possible when max_warnings was lowered mid-window.
        assert_eq!(evaluate(5, 3), Escalation::Ban);
    }
}
