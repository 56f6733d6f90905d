// SPDX-License-Identifier: MIT

//! Reservation set for the LR/SC instruction pair.
//!
//! A reservation is held on the naturally aligned double-word containing
//! the LR address. Any trap, SC (successful or not) or competing store
//! clears it.

use crate::xlen::XValue;
use crate::xlen::Xlen;

const GRANULE_MASK: u64 = 7;

#[derive(Clone, Debug, Default)]
pub struct ReservationSet<X: Xlen> {
    reservation: Option<XValue<X>>,
}

impl<X: Xlen> ReservationSet<X> {
    pub fn new() -> Self {
        ReservationSet { reservation: None }
    }

    #[inline]
    fn granule(addr: XValue<X>) -> XValue<X> {
        addr & !X::from_u64(GRANULE_MASK)
    }

    /// Start a reservation on the granule containing `addr`.
    #[inline]
    pub fn begin(&mut self, addr: XValue<X>) {
        self.reservation = Some(Self::granule(addr));
    }

    /// Whether a store-conditional at `addr` may succeed. The reservation
    /// is consumed either way.
    #[inline]
    pub fn take(&mut self, addr: XValue<X>) -> bool {
        let held = self.reservation.take();
        held == Some(Self::granule(addr))
    }

    /// Drop any reservation.
    #[inline]
    pub fn clear(&mut self) {
        self.reservation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlen::Rv64;

    #[test]
    fn sc_without_reservation_fails() {
        let mut set = ReservationSet::<Rv64>::new();
        assert!(!set.take(0x1000));
    }

    #[test]
    fn sc_within_granule_succeeds_once() {
        let mut set = ReservationSet::<Rv64>::new();
        set.begin(0x1004);
        assert!(set.take(0x1000));
        // consumed
        assert!(!set.take(0x1000));
    }

    #[test]
    fn sc_on_other_granule_fails() {
        let mut set = ReservationSet::<Rv64>::new();
        set.begin(0x1000);
        assert!(!set.take(0x1008));
    }
}
