//! Operator abort window
//!
//! The operator's last chance to bail: a blocking countdown that polls for a
//! keystroke once per tick. This is the only cancellation point in the whole
//! procedure. Nothing polls the keyboard once erasing starts; a partial
//! erase is more dangerous than letting the sequence finish, so the flash
//! sequence itself cannot be cancelled.

use std::time::Duration;

use crate::ec::KeySource;

/// Ticks in the standard abort window.
pub const ABORT_WINDOW_TICKS: u32 = 7;
/// Interval between countdown ticks.
pub const ABORT_TICK: Duration = Duration::from_secs(1);

/// How the abort window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// All ticks elapsed with no keystroke.
    Proceed,
    /// The operator pressed a key.
    Aborted,
}

/// Run a cancellable countdown of `ticks` ticks of length `tick`.
///
/// Each tick reports the remaining count through `on_tick`, sleeps one
/// interval, then polls `keys` once without blocking. The first observed
/// keystroke ends the window immediately, skipping the remaining ticks.
pub fn run_countdown<K: KeySource + ?Sized>(
    keys: &mut K,
    ticks: u32,
    tick: Duration,
    mut on_tick: impl FnMut(u32),
) -> CountdownOutcome {
    for remaining in (1..=ticks).rev() {
        on_tick(remaining);
        std::thread::sleep(tick);
        if keys.poll_key().is_some() {
            return CountdownOutcome::Aborted;
        }
    }
    CountdownOutcome::Proceed
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Key source that answers each poll from a script and counts polls.
    struct ScriptedKeys {
        script: Vec<Option<u8>>,
        polls: usize,
    }

    impl ScriptedKeys {
        fn new(script: Vec<Option<u8>>) -> Self {
            Self { script, polls: 0 }
        }

        fn silent() -> Self {
            Self::new(Vec::new())
        }
    }

    impl KeySource for ScriptedKeys {
        fn poll_key(&mut self) -> Option<u8> {
            let key = self.script.get(self.polls).copied().flatten();
            self.polls += 1;
            key
        }
    }

    #[test]
    fn silent_window_proceeds_after_all_ticks() {
        let mut keys = ScriptedKeys::silent();
        let mut seen = Vec::new();
        let outcome = run_countdown(&mut keys, 7, Duration::ZERO, |n| seen.push(n));
        assert_eq!(outcome, CountdownOutcome::Proceed);
        assert_eq!(keys.polls, 7);
        assert_eq!(seen, vec![7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn keystroke_aborts_at_any_tick() {
        for tick in 0..7usize {
            let mut script = vec![None; tick];
            script.push(Some(b' '));
            let mut keys = ScriptedKeys::new(script);
            let outcome = run_countdown(&mut keys, 7, Duration::ZERO, |_| {});
            assert_eq!(outcome, CountdownOutcome::Aborted);
            // The remaining ticks are skipped.
            assert_eq!(keys.polls, tick + 1);
        }
    }

    #[test]
    fn keystroke_after_last_tick_is_never_seen() {
        let mut script = vec![None; 7];
        script.push(Some(b'q'));
        let mut keys = ScriptedKeys::new(script);
        let outcome = run_countdown(&mut keys, 7, Duration::ZERO, |_| {});
        assert_eq!(outcome, CountdownOutcome::Proceed);
        assert_eq!(keys.polls, 7);
    }
}
