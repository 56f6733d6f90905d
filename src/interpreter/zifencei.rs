// SPDX-License-Identifier: MIT

//! Memory and instruction fences.

use crate::machine_state::hart_state::EventSet;
use crate::machine_state::MachineCoreState;
use crate::parser::instruction::FenceSet;
use crate::xlen::Xlen;

impl<X: Xlen> MachineCoreState<X> {
    /// `FENCE` is a no-op on a single in-order hart: every access is
    /// already globally visible in program order.
    pub fn run_fence(&mut self, _pred: FenceSet, _succ: FenceSet) {}

    /// `FENCE.I` announces that previously fetched/decoded instructions
    /// may be stale.
    pub fn run_fencei(&mut self) {
        self.hart.notify(EventSet::REQUESTED_IFENCE);
    }
}
