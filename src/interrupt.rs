//! Interrupt handling. SIGINT/SIGTERM only set a flag; long-running loops
//! poll [`check`] at revision and command boundaries. A [`critical`] guard
//! defers the reaction over scratch-directory manipulations and stream
//! writes, with restore guaranteed on every exit path including unwinding.

use anyhow::Result;
use signal_hook::consts::SIGINT;
use signal_hook::consts::SIGTERM;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

lazy_static::lazy_static! {
    static ref INTERRUPTED: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Nesting depth of critical sections in this process.
static CRITICAL_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// The operation was interrupted by SIGINT or SIGTERM at a safe boundary.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("interrupted")]
pub struct Interrupted;

/// Registers the flag-setting handlers.
pub fn install() -> Result<()> {
    signal_hook::flag::register(SIGINT, Arc::clone(&INTERRUPTED))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&INTERRUPTED))?;
    Ok(())
}

fn check_flag(flag: &AtomicBool, depth: usize) -> Result<(), Interrupted> {
    if depth == 0 && flag.load(Ordering::Acquire) {
        flag.store(false, Ordering::Release);
        Err(Interrupted)
    } else {
        Ok(())
    }
}

/// Returns `Err(Interrupted)` when a signal arrived and no critical section
/// is active. Callers poll this between revisions and between commands.
pub fn check() -> Result<(), Interrupted> {
    check_flag(&INTERRUPTED, CRITICAL_DEPTH.load(Ordering::Acquire))
}

/// True if a signal is pending, regardless of critical sections. Does not
/// clear the flag.
pub fn pending() -> bool {
    INTERRUPTED.load(Ordering::Acquire)
}

/// Guard that defers interrupt reactions while alive.
pub struct CriticalSection {
    _not_send: std::marker::PhantomData<*const ()>,
}

/// Enters a critical section. Signals received while the guard lives stay
/// pending and are observed by the next [`check`] after the guard drops.
pub fn critical() -> CriticalSection {
    CRITICAL_DEPTH.fetch_add(1, Ordering::AcqRel);
    CriticalSection {
        _not_send: std::marker::PhantomData,
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        let prev = CRITICAL_DEPTH.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unbalanced critical section");
        if prev == 1 && INTERRUPTED.load(Ordering::Acquire) {
            log::warn!("interrupt deferred by a critical section is now pending");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_flag_respects_critical_depth() {
        let flag = AtomicBool::new(true);
        // A live critical section defers the reaction and keeps the flag.
        assert_eq!(check_flag(&flag, 1), Ok(()));
        assert!(flag.load(Ordering::Acquire));
        // At depth zero the check consumes the flag once.
        assert_eq!(check_flag(&flag, 0), Err(Interrupted));
        assert_eq!(check_flag(&flag, 0), Ok(()));
    }

    #[test]
    fn test_guard_nesting_balances() {
        let outer = critical();
        {
            let _inner = critical();
            assert!(CRITICAL_DEPTH.load(Ordering::Acquire) >= 2);
        }
        drop(outer);
    }
}
