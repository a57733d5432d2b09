/*
 * The hand-off between the sampler and the controller.
 *
 * The sampler task is the only writer and the controller the only reader.
 * Each lane gets one `detected` flag and one `faulted` flag. A flag holds the
 * latest reading only; there is no queue and no history, and a reader may
 * see a value that is one sampling period old.
 */

use core::sync::atomic::{AtomicBool, Ordering};
use enum_ordinalize::Ordinalize;

use crate::lane::Lane;
use crate::sampler::Reading;

/// A snapshot of both detection flags.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub struct Presence {
    pub red: bool,
    pub blue: bool,
}

impl Presence {
    pub fn lane(&self, lane: Lane) -> bool {
        match lane {
            Lane::Red => self.red,
            Lane::Blue => self.blue,
        }
    }
}

/// What publishing a reading did to the fault state of its lane.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FaultChange {
    Unchanged,
    Raised,
    Cleared,
}

pub struct Detections {
    detected: [AtomicBool; Lane::VARIANT_COUNT],
    faulted: [AtomicBool; Lane::VARIANT_COUNT],
}

impl Default for Detections {
    fn default() -> Self {
        Self::new()
    }
}

impl Detections {
    pub const fn new() -> Self {
        Detections {
            detected: [AtomicBool::new(false), AtomicBool::new(false)],
            faulted: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /*
     * A reading that timed out counts as "nothing there" for the controller,
     * and raises the lane's fault flag until a proper measurement comes in.
     */
    pub fn publish(&self, lane: Lane, reading: Reading) -> FaultChange {
        let i = lane.ordinal();
        self.detected[i].store(reading.detected(), Ordering::Relaxed);

        let was_faulted = self.faulted[i].swap(reading.is_fault(), Ordering::Relaxed);
        match (was_faulted, reading.is_fault()) {
            (false, true) => FaultChange::Raised,
            (true, false) => FaultChange::Cleared,
            (false, false) | (true, true) => FaultChange::Unchanged,
        }
    }

    pub fn detected(&self, lane: Lane) -> bool {
        self.detected[lane.ordinal()].load(Ordering::Relaxed)
    }

    pub fn faulted(&self, lane: Lane) -> bool {
        self.faulted[lane.ordinal()].load(Ordering::Relaxed)
    }

    pub fn presence(&self) -> Presence {
        Presence {
            red: self.detected(Lane::Red),
            blue: self.detected(Lane::Blue),
        }
    }
}
