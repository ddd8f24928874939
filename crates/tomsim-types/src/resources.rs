//! Resource vectors and trade offers.
//!
//! Every agent holds four resource kinds, each in `0..=MAX_QUANTITY`. An
//! [`Offer`] is always written from the proposer's point of view; its
//! [`Offer::mirror`] is the same trade seen by the counterpart.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Number of distinct resource kinds.
pub const RESOURCE_KINDS: usize = 4;

/// Largest quantity an agent can hold of any kind.
pub const MAX_QUANTITY: u8 = 4;

/// Minimum quantity of each non-producing kind an agent needs to survive.
pub const SURVIVAL_THRESHOLD: u8 = 2;

/// Starting quantity of each non-producing kind.
pub const INITIAL_QUANTITY: u8 = 1;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Quantities held of each resource kind. Always within `0..=MAX_QUANTITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Resources([u8; RESOURCE_KINDS]);

impl Resources {
    /// Build a vector, rejecting any quantity above [`MAX_QUANTITY`].
    pub fn new(quantities: [u8; RESOURCE_KINDS]) -> Option<Self> {
        quantities
            .iter()
            .all(|q| *q <= MAX_QUANTITY)
            .then_some(Self(quantities))
    }

    /// The canonical starting vector: [`INITIAL_QUANTITY`] of everything and
    /// a full stock of the produced kind.
    pub fn initial(producing: usize) -> Self {
        let mut quantities = [INITIAL_QUANTITY; RESOURCE_KINDS];
        if let Some(slot) = quantities.get_mut(producing) {
            *slot = MAX_QUANTITY;
        }
        Self(quantities)
    }

    /// Raw quantities.
    pub const fn quantities(&self) -> [u8; RESOURCE_KINDS] {
        self.0
    }

    /// Quantity of one kind (0 for an unknown kind).
    pub fn get(&self, kind: usize) -> u8 {
        self.0.get(kind).copied().unwrap_or(0)
    }

    /// Iterate `(kind, quantity)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.0.iter().copied().enumerate()
    }

    /// Whether every kind is at [`MAX_QUANTITY`].
    pub fn is_saturated(&self) -> bool {
        self.0.iter().all(|q| *q == MAX_QUANTITY)
    }

    /// Top up one kind to [`MAX_QUANTITY`].
    pub fn fill(&mut self, kind: usize) {
        if let Some(slot) = self.0.get_mut(kind) {
            *slot = MAX_QUANTITY;
        }
    }

    /// Consume one unit of every kind that is not already empty.
    pub fn consume_one_each(&mut self) {
        for slot in &mut self.0 {
            *slot = slot.saturating_sub(1);
        }
    }

    /// The vector after executing `offer` as its proposer: `give` leaves,
    /// `receive` arrives. `None` when any quantity would leave the legal
    /// range.
    pub fn after(&self, offer: &Offer) -> Option<Self> {
        let mut next = [0_u8; RESOURCE_KINDS];
        for (((slot, held), give), receive) in next
            .iter_mut()
            .zip(self.0)
            .zip(offer.give)
            .zip(offer.receive)
        {
            let value = held.checked_add(receive)?.checked_sub(give)?;
            if value > MAX_QUANTITY {
                return None;
            }
            *slot = value;
        }
        Some(Self(next))
    }

    /// Sum of all quantities.
    pub fn total(&self) -> u32 {
        self.0.iter().map(|q| u32::from(*q)).sum()
    }
}

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// A proposed bilateral exchange, seen from the proposer's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Offer {
    /// Units the proposer hands over, per kind.
    pub give: [u8; RESOURCE_KINDS],
    /// Units the proposer asks for, per kind.
    pub receive: [u8; RESOURCE_KINDS],
}

impl Offer {
    /// Build an offer from its two halves.
    pub const fn new(give: [u8; RESOURCE_KINDS], receive: [u8; RESOURCE_KINDS]) -> Self {
        Self { give, receive }
    }

    /// The same exchange from the counterpart's point of view.
    pub const fn mirror(&self) -> Self {
        Self {
            give: self.receive,
            receive: self.give,
        }
    }

    /// Whether nothing moves in either direction.
    pub fn is_null(&self) -> bool {
        self.give.iter().chain(self.receive.iter()).all(|q| *q == 0)
    }

    /// Whether some kind is both given and received.
    pub fn exchanges_same_kind(&self) -> bool {
        self.give
            .iter()
            .zip(self.receive.iter())
            .any(|(g, r)| *g > 0 && *r > 0)
    }

    /// A legal offer moves something and never swaps a kind for itself.
    pub fn is_well_formed(&self) -> bool {
        !self.is_null() && !self.exchanges_same_kind()
    }

    /// Total units given, the row of the prior matrix.
    pub fn give_total(&self) -> usize {
        self.give.iter().map(|q| usize::from(*q)).sum()
    }

    /// Total units received, the column of the prior matrix.
    pub fn receive_total(&self) -> usize {
        self.receive.iter().map(|q| usize::from(*q)).sum()
    }
}

impl core::fmt::Display for Offer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "give {:?} receive {:?}", self.give, self.receive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_is_an_involution() {
        let offer = Offer::new([0, 1, 2, 0], [3, 0, 0, 1]);
        assert_eq!(offer.mirror().mirror(), offer);
        assert_eq!(offer.mirror().give, offer.receive);
    }

    #[test]
    fn initial_vector_fills_producing_kind() {
        let res = Resources::initial(2);
        assert_eq!(res.quantities(), [1, 1, 4, 1]);
        assert_eq!(res.total(), 7);
    }

    #[test]
    fn new_rejects_overflowing_quantity() {
        assert!(Resources::new([5, 0, 0, 0]).is_none());
        assert!(Resources::new([4, 4, 4, 4]).is_some_and(|r| r.is_saturated()));
    }

    #[test]
    fn after_applies_both_halves() {
        let res = Resources::new([1, 4, 4, 4]).unwrap_or_default();
        let offer = Offer::new([0, 0, 0, 2], [3, 0, 0, 0]);
        let next = res.after(&offer);
        assert_eq!(next.map(|r| r.quantities()), Some([4, 4, 4, 2]));
    }

    #[test]
    fn after_rejects_out_of_range() {
        let res = Resources::new([1, 1, 1, 1]).unwrap_or_default();
        assert!(res.after(&Offer::new([2, 0, 0, 0], [0; 4])).is_none());
        assert!(res.after(&Offer::new([0; 4], [0, 4, 0, 0])).is_none());
    }

    #[test]
    fn consume_one_each_stops_at_zero() {
        let mut res = Resources::new([0, 1, 2, 4]).unwrap_or_default();
        res.consume_one_each();
        assert_eq!(res.quantities(), [0, 0, 1, 3]);
    }

    #[test]
    fn well_formed_offers() {
        assert!(!Offer::default().is_well_formed());
        assert!(!Offer::new([1, 0, 0, 0], [1, 0, 0, 0]).is_well_formed());
        assert!(Offer::new([1, 0, 0, 0], [0, 2, 0, 0]).is_well_formed());
    }

    #[test]
    fn totals() {
        let offer = Offer::new([1, 0, 2, 0], [0, 3, 0, 1]);
        assert_eq!(offer.give_total(), 3);
        assert_eq!(offer.receive_total(), 4);
    }
}
