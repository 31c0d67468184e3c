//! Single-flight guard for compression jobs.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::error::{Result, SessionError};
use crate::preset::Preset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Busy(Preset),
}

/// Two-state machine, `Idle` or `Busy(preset)`.
///
/// Acquisition never waits: a request made while busy is denied on the spot.
#[derive(Debug)]
pub struct ConcurrencyGuard {
    state: Mutex<GuardState>,
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self {
            state: Mutex::new(GuardState::Idle),
        }
    }
}

impl ConcurrencyGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `Idle -> Busy(preset)`, or [`SessionError::AlreadyProcessing`] naming the
    /// job that holds the guard. The returned permit releases on drop.
    pub fn try_acquire(self: &Arc<Self>, preset: Preset) -> Result<GuardPermit> {
        let mut state = self.state.lock();
        match *state {
            GuardState::Busy(active) => {
                debug!("Denied '{}': already processing '{}'", preset, active);
                Err(SessionError::AlreadyProcessing(active))
            }
            GuardState::Idle => {
                *state = GuardState::Busy(preset);
                debug!("Granted '{}'", preset);
                Ok(GuardPermit {
                    guard: Arc::clone(self),
                    preset,
                })
            }
        }
    }

    /// `Busy(_) -> Idle`, unconditionally.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if let GuardState::Busy(preset) = *state {
            debug!("Released '{}'", preset);
        }
        *state = GuardState::Idle;
    }

    pub fn state(&self) -> GuardState {
        *self.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state(), GuardState::Busy(_))
    }
}

/// Proof of holding the guard. Dropping it, on any exit path, releases it.
#[derive(Debug)]
pub struct GuardPermit {
    guard: Arc<ConcurrencyGuard>,
    preset: Preset,
}

impl GuardPermit {
    pub fn preset(&self) -> Preset {
        self.preset
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.guard.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn second_acquire_is_denied_with_active_preset() {
        let guard = ConcurrencyGuard::new();
        let permit = guard.try_acquire(Preset::Medium).unwrap();
        assert_eq!(guard.state(), GuardState::Busy(Preset::Medium));

        let denied = guard.try_acquire(Preset::Tiny);
        assert_eq!(denied.unwrap_err(), SessionError::AlreadyProcessing(Preset::Medium));
        assert_eq!(guard.state(), GuardState::Busy(Preset::Medium));

        drop(permit);
        assert_eq!(guard.state(), GuardState::Idle);
        assert!(guard.try_acquire(Preset::Tiny).is_ok());
    }

    #[test]
    fn permit_releases_on_error_paths() {
        fn failing(guard: &Arc<ConcurrencyGuard>) -> Result<()> {
            let _permit = guard.try_acquire(Preset::Small)?;
            Err(SessionError::CompressionFailed("boom".into()))
        }

        let guard = ConcurrencyGuard::new();
        assert!(failing(&guard).is_err());
        assert!(!guard.is_busy());
    }

    #[test]
    fn only_one_thread_wins() {
        let guard = ConcurrencyGuard::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || guard.try_acquire(Preset::ALL[i % 3]).ok())
            })
            .collect();

        // Winning permits are returned to this thread, so nobody releases early.
        let permits: Vec<GuardPermit> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(permits.len(), 1);
        assert_eq!(guard.state(), GuardState::Busy(permits[0].preset()));
    }
}
