//! Target position classification from the clock pulse charge.

use contracts::{TargetGateTable, NO_TARGET};

/// Map a long-gate charge to target slot `1..=6`, or `NO_TARGET` when no gate contains it
///
/// Gates are half-open `[low, high)` and assumed disjoint.
#[inline]
pub fn classify_target(gates: &TargetGateTable, charge: u32) -> u8 {
    gates
        .gates()
        .iter()
        .position(|gate| gate.contains(charge))
        .map(|slot| slot as u8 + 1)
        .unwrap_or(NO_TARGET)
}
