//! Quiescence barrier between I/O dispatch and `StopDevice`.
//!
//! Dispatch calls hold an [`IoGuard`] for their whole duration. Stop closes the gate (so no new
//! dispatch can begin) and then waits, bounded, for the in-flight count to reach zero.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    in_flight: usize,
}

#[derive(Debug, Default)]
pub(crate) struct IoGate {
    state: Mutex<GateState>,
    drained: Condvar,
}

/// Returned when in-flight dispatches outlast the drain window. The gate has been reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainTimedOut {
    pub in_flight: usize,
}

impl IoGate {
    /// A closed gate; nothing may enter until [`IoGate::open`].
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // Counters are never left half-updated, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn open(&self) {
        self.lock().open = true;
    }

    /// Enter the gate, or `None` if it is closed.
    pub(crate) fn try_enter(&self) -> Option<IoGuard<'_>> {
        let mut state = self.lock();
        if !state.open {
            return None;
        }
        state.in_flight += 1;
        Some(IoGuard { gate: self })
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Close the gate and wait up to `timeout` for in-flight calls to leave.
    ///
    /// On timeout the gate is reopened so the adapter stays fully `Started`.
    pub(crate) fn close_and_drain(&self, timeout: Duration) -> Result<(), DrainTimedOut> {
        let mut state = self.lock();
        state.open = false;

        let (mut state, _) = self
            .drained
            .wait_timeout_while(state, timeout, |s| s.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);

        if state.in_flight > 0 {
            state.open = true;
            return Err(DrainTimedOut {
                in_flight: state.in_flight,
            });
        }
        Ok(())
    }
}

pub(crate) struct IoGuard<'a> {
    gate: &'a IoGate,
}

impl Drop for IoGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.gate.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn closed_gate_rejects_entry() {
        let gate = IoGate::new();
        assert!(gate.try_enter().is_none());
        gate.open();
        let guard = gate.try_enter().expect("open gate admits");
        assert_eq!(gate.in_flight(), 1);
        drop(guard);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn drain_with_nothing_in_flight_is_immediate() {
        let gate = IoGate::new();
        gate.open();
        assert_eq!(gate.close_and_drain(Duration::ZERO), Ok(()));
        assert!(gate.try_enter().is_none());
    }

    #[test]
    fn drain_timeout_reopens_gate() {
        let gate = IoGate::new();
        gate.open();
        let guard = gate.try_enter().unwrap();

        assert_eq!(
            gate.close_and_drain(Duration::from_millis(10)),
            Err(DrainTimedOut { in_flight: 1 })
        );
        // Still usable for new callers.
        let second = gate.try_enter().expect("gate reopened after timeout");
        drop((guard, second));
        assert_eq!(gate.close_and_drain(Duration::ZERO), Ok(()));
    }

    #[test]
    fn drain_waits_for_in_flight_guard() {
        let gate = Arc::new(IoGate::new());
        gate.open();

        let entered = Arc::new(Barrier::new(2));
        let released = Arc::new(AtomicBool::new(false));

        let worker = {
            let gate = gate.clone();
            let entered = entered.clone();
            let released = released.clone();
            thread::spawn(move || {
                let guard = gate.try_enter().unwrap();
                entered.wait();
                thread::sleep(Duration::from_millis(50));
                released.store(true, Ordering::SeqCst);
                drop(guard);
            })
        };

        entered.wait();
        assert_eq!(gate.close_and_drain(Duration::from_secs(10)), Ok(()));
        assert!(released.load(Ordering::SeqCst));
        worker.join().unwrap();
    }
}
