//! Fault injection for write paths.
//!
//! Write paths call [`check`] at fixed points. Arming is only available to unit
//! tests and behind the `fault-injection` feature. A fault is armed per thread,
//! fires once at the named point, and then disarms itself, so parallel tests do
//! not observe each other's faults.

use std::cell::RefCell;

use crate::error::{FossilError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Canonical update: archive written, live file not yet replaced.
    BeforeCanonicalOverwrite,
    /// Entry write: temp file written, rename not yet performed.
    AfterEntryTempWrite,
}

impl FaultPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultPoint::BeforeCanonicalOverwrite => "before_canonical_overwrite",
            FaultPoint::AfterEntryTempWrite => "after_entry_temp_write",
        }
    }
}

thread_local! {
    static ARMED: RefCell<Vec<FaultPoint>> = const { RefCell::new(Vec::new()) };
}

#[cfg(any(test, feature = "fault-injection"))]
/// Arm `point` for the next time the current thread reaches it.
pub fn arm(point: FaultPoint) {
    ARMED.with(|a| a.borrow_mut().push(point));
}

#[cfg(any(test, feature = "fault-injection"))]
/// Disarm every fault on the current thread.
pub fn clear() {
    ARMED.with(|a| a.borrow_mut().clear());
}

/// Fire the fault if armed.
pub fn check(point: FaultPoint) -> Result<()> {
    let fired = ARMED.with(|a| {
        let mut armed = a.borrow_mut();
        match armed.iter().position(|p| *p == point) {
            Some(idx) => {
                armed.remove(idx);
                true
            }
            None => false,
        }
    });
    if fired {
        tracing::warn!(point = point.as_str(), "injected fault fired");
        return Err(FossilError::Fault(point.as_str()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_fires_once() {
        clear();
        arm(FaultPoint::AfterEntryTempWrite);
        assert!(check(FaultPoint::BeforeCanonicalOverwrite).is_ok());
        assert!(check(FaultPoint::AfterEntryTempWrite).is_err());
        assert!(check(FaultPoint::AfterEntryTempWrite).is_ok());
    }
}
