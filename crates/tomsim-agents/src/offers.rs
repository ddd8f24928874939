//! Enumeration of the offers one agent can make to another.
//!
//! The proposer gives at most its surplus over [`SURVIVAL_THRESHOLD`] and
//! no more than the counterpart can hold; it asks for at most what the
//! counterpart owns and what it can itself hold. The null offer and offers
//! that swap a kind for itself are skipped.

use tomsim_types::{MAX_QUANTITY, Offer, RESOURCE_KINDS, Resources, SURVIVAL_THRESHOLD};

/// Width of the give and receive halves together.
const DIGITS: usize = RESOURCE_KINDS * 2;

/// Iterator over every well-formed offer `own` could make to `other`.
///
/// Candidates are visited with the first give slot varying slowest and the
/// last receive slot fastest.
#[derive(Debug, Clone)]
pub struct CandidateOffers {
    bounds: [u8; DIGITS],
    cursor: Option<[u8; DIGITS]>,
}

/// All well-formed offers from `own`'s point of view.
pub fn candidate_offers(own: &Resources, other: &Resources) -> CandidateOffers {
    let mut bounds = [0_u8; DIGITS];
    let (give, receive) = bounds.split_at_mut(RESOURCE_KINDS);
    for (kind, slot) in give.iter_mut().enumerate() {
        let surplus = own.get(kind).saturating_sub(SURVIVAL_THRESHOLD);
        *slot = surplus.min(MAX_QUANTITY.saturating_sub(other.get(kind)));
    }
    for (kind, slot) in receive.iter_mut().enumerate() {
        *slot = other.get(kind).min(MAX_QUANTITY.saturating_sub(own.get(kind)));
    }
    CandidateOffers {
        bounds,
        cursor: Some([0; DIGITS]),
    }
}

impl CandidateOffers {
    fn advance(&mut self) {
        let Some(mut digits) = self.cursor else {
            return;
        };
        for (digit, bound) in digits.iter_mut().zip(self.bounds.iter()).rev() {
            if *digit < *bound {
                *digit = digit.saturating_add(1);
                self.cursor = Some(digits);
                return;
            }
            *digit = 0;
        }
        self.cursor = None;
    }
}

impl Iterator for CandidateOffers {
    type Item = Offer;

    fn next(&mut self) -> Option<Offer> {
        loop {
            let [a, b, c, d, e, f, g, h] = self.cursor?;
            self.advance();
            let offer = Offer::new([a, b, c, d], [e, f, g, h]);
            if offer.is_well_formed() {
                return Some(offer);
            }
        }
    }
}
