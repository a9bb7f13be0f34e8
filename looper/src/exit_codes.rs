//! Stable exit codes for looper CLI commands.

use crate::core::types::LoopStatus;

/// Command succeeded or the loop completed.
pub const OK: i32 = 0;
/// Invalid usage, unreadable state, or an error terminal status.
pub const INVALID: i32 = 1;
/// The loop stopped after exhausting `max_iterations`.
pub const EXHAUSTED: i32 = 2;
/// The loop is paused on a checkpoint hard stop.
pub const PAUSED: i32 = 3;
/// The loop was paused by a user interrupt.
pub const INTERRUPTED: i32 = 130;

/// Map a final loop status to the process exit code.
pub fn for_status(status: LoopStatus) -> i32 {
    match status {
        LoopStatus::Running | LoopStatus::Completed => OK,
        LoopStatus::StoppedMaxIterations => EXHAUSTED,
        LoopStatus::PausedHardStop => PAUSED,
        LoopStatus::PausedUserInterrupt => INTERRUPTED,
        LoopStatus::Canceled | LoopStatus::ErrorSpawn | LoopStatus::ErrorNoSession => INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_map_to_distinct_codes() {
        assert_eq!(for_status(LoopStatus::Completed), OK);
        assert_eq!(for_status(LoopStatus::StoppedMaxIterations), EXHAUSTED);
        assert_eq!(for_status(LoopStatus::PausedHardStop), PAUSED);
        assert_eq!(for_status(LoopStatus::PausedUserInterrupt), INTERRUPTED);
        assert_eq!(for_status(LoopStatus::ErrorSpawn), INVALID);
        assert_eq!(for_status(LoopStatus::ErrorNoSession), INVALID);
    }
}
