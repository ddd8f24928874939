//! The utility function that drives every decision.
//!
//! For each non-producing kind, a shortfall below [`SURVIVAL_THRESHOLD`]
//! costs two points per missing unit and a surplus earns one point per
//! extra unit. The result is shifted by [`SCORE_OFFSET`], so legal vectors
//! score in `0..=18`.

use tomsim_types::{Offer, Resources, SURVIVAL_THRESHOLD};

/// Shift applied so that the worst legal vector scores zero.
pub const SCORE_OFFSET: i32 = 12;

/// Points lost per unit below the survival threshold.
pub const SHORTFALL_PENALTY: i32 = 2;

/// Score of a vector that cannot exist (a quantity outside the legal range).
pub const CATASTROPHIC: i32 = i32::MIN;

/// Score of a resource vector for an agent producing `producing`.
pub fn score(resources: &Resources, producing: usize) -> i32 {
    let threshold = i32::from(SURVIVAL_THRESHOLD);
    resources
        .iter()
        .filter(|(kind, _)| *kind != producing)
        .fold(SCORE_OFFSET, |total, (_, quantity)| {
            let quantity = i32::from(quantity);
            if quantity < threshold {
                total.saturating_sub(SHORTFALL_PENALTY.saturating_mul(threshold.saturating_sub(quantity)))
            } else {
                total.saturating_add(quantity.saturating_sub(threshold))
            }
        })
}

/// Score after the holder executes `offer` as its proposer.
pub fn score_after(resources: &Resources, offer: &Offer, producing: usize) -> i32 {
    resources
        .after(offer)
        .map_or(CATASTROPHIC, |next| score(&next, producing))
}

/// [`score`] as a float, the unit expected values are expressed in.
pub fn value(resources: &Resources, producing: usize) -> f64 {
    f64::from(score(resources, producing))
}

/// [`score_after`] as a float.
pub fn value_after(resources: &Resources, offer: &Offer, producing: usize) -> f64 {
    f64::from(score_after(resources, offer, producing))
}

#[cfg(test)]
mod tests {
    use tomsim_types::MAX_QUANTITY;

    use super::*;

    fn res(q: [u8; 4]) -> Resources {
        Resources::new(q).unwrap_or_default()
    }

    #[test]
    fn threshold_everywhere_scores_offset() {
        assert_eq!(score(&res([2, 2, 2, 2]), 0), SCORE_OFFSET);
    }

    #[test]
    fn range_is_zero_to_eighteen() {
        assert_eq!(score(&res([4, 0, 0, 0]), 0), 0);
        assert_eq!(score(&res([0, 4, 4, 4]), 0), 18);
    }

    #[test]
    fn producing_kind_is_ignored() {
        assert_eq!(score(&res([1, 2, 2, 2]), 0), score(&res([4, 2, 2, 2]), 0));
        assert_eq!(score(&res([1, 2, 2, 2]), 1), 10);
    }

    #[test]
    fn monotone_in_every_non_producing_kind() {
        for kind in 1..4 {
            let mut previous = i32::MIN;
            for quantity in 0..=MAX_QUANTITY {
                let mut q = [2_u8; 4];
                if let Some(slot) = q.get_mut(kind) {
                    *slot = quantity;
                }
                let current = score(&res(q), 0);
                assert!(current >= previous, "kind {kind} quantity {quantity}");
                previous = current;
            }
        }
    }

    #[test]
    fn illegal_trade_is_catastrophic() {
        let offer = Offer::new([3, 0, 0, 0], [0, 1, 0, 0]);
        assert_eq!(score_after(&res([1, 2, 2, 2]), &offer, 1), CATASTROPHIC);
    }

    #[test]
    fn score_after_legal_trade() {
        let offer = Offer::new([0, 0, 2, 0], [3, 0, 0, 0]);
        assert_eq!(score_after(&res([1, 4, 4, 4]), &offer, 2), 18);
    }
}
