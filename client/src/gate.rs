//! Single-winner arbitration between completion and cancellation.

use std::sync::atomic::{AtomicU8, Ordering};

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const DISARMED: u8 = 2;

/// Arbitrates between the actors that can end a request: the watchdog's
/// expiry path, the operation's natural-completion path, and (on the
/// non-blocking side) an external cancel.
///
/// The gate is a write-once cell. Whichever actor transitions it first is
/// the winner; every later call to either method is a no-op returning
/// `false`. This is the whole correctness story for "exactly one outcome
/// per request": losers learn they lost and produce no side effects.
///
/// The gate holds no references to the operation's resources, so keeping a
/// gate alive never delays their release.
#[derive(Debug, Default)]
pub struct CompletionGate {
    state: AtomicU8,
}

impl CompletionGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ARMED),
        }
    }

    /// Attempt the armed -> fired transition.
    ///
    /// Returns true iff this call performed it, i.e. the caller won the
    /// race and owns the cancellation side effects.
    pub fn try_cancel(&self) -> bool {
        self.state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Attempt the armed -> disarmed transition from the natural-completion
    /// path.
    ///
    /// Returns true iff this call performed it, i.e. no cancellation fired
    /// first and the completion result is the one to deliver.
    pub fn disarm(&self) -> bool {
        self.state
            .compare_exchange(ARMED, DISARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether a cancellation won the gate.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    /// Whether either side has won the gate yet.
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.state.load(Ordering::Acquire) != ARMED
    }
}

#[cfg(test)]
mod tests {
    use super::CompletionGate;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn first_transition_wins() {
        let gate = CompletionGate::new();
        assert!(gate.try_cancel());
        assert!(!gate.try_cancel());
        assert!(!gate.disarm());
        assert!(gate.fired());
        assert!(gate.resolved());
    }

    #[test]
    fn disarm_blocks_later_cancel() {
        let gate = CompletionGate::new();
        assert!(gate.disarm());
        assert!(!gate.try_cancel());
        assert!(!gate.fired());
        assert!(gate.resolved());
    }

    #[test]
    fn unresolved_until_first_transition() {
        let gate = CompletionGate::new();
        assert!(!gate.resolved());
        assert!(!gate.fired());
    }

    /// Both orderings of the two-actor race must elect exactly one winner.
    #[test]
    fn racing_actors_elect_exactly_one_winner() {
        for _ in 0..200 {
            let gate = CompletionGate::new();
            let wins = AtomicUsize::new(0);
            let barrier = Barrier::new(3);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    if gate.try_cancel() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
                scope.spawn(|| {
                    barrier.wait();
                    if gate.disarm() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
                barrier.wait();
            });

            assert_eq!(wins.load(Ordering::SeqCst), 1);
            assert!(gate.resolved());
        }
    }

    /// Three actors (watchdog, completion, external cancel) funnel through
    /// the same pair of methods; still exactly one winner.
    #[test]
    fn three_way_race_elects_exactly_one_winner() {
        for _ in 0..200 {
            let gate = CompletionGate::new();
            let wins = AtomicUsize::new(0);
            let barrier = Barrier::new(4);

            std::thread::scope(|scope| {
                for _ in 0..2 {
                    scope.spawn(|| {
                        barrier.wait();
                        if gate.try_cancel() {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                }
                scope.spawn(|| {
                    barrier.wait();
                    if gate.disarm() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
                barrier.wait();
            });

            assert_eq!(wins.load(Ordering::SeqCst), 1);
        }
    }
}
