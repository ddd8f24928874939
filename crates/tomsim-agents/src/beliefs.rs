//! Per-agent belief store.
//!
//! An agent carries three layers of belief:
//!
//! - a lifetime [`PriorMatrix`] of acceptance probabilities indexed by
//!   (units given, units received), recomputed from its [`OfferStats`]
//!   whenever a negotiation starts;
//! - per-negotiation [`OfferBeliefs`]: `b0` about its own offers and `b1`
//!   about what the counterpart believes (ToM2 reuses `b0` as `b2`);
//! - per-negotiation [`OpponentModel`]s for ToM1/ToM2 reasoning: a
//!   distribution over the counterpart's producing kind and a confidence
//!   that the counterpart really reasons at that order.

use std::collections::HashMap;

use tomsim_types::{Offer, RESOURCE_KINDS, Resources, ToMOrder};

use crate::offers::candidate_offers;

/// Number of rows and columns of the prior matrix (totals `0..=16`).
pub const TOTAL_BUCKETS: usize = 17;

/// Pseudo-observations every bucket starts with, so the first real
/// rejection does not collapse the prior to zero.
pub const SEED_OBSERVATIONS: u32 = 5;

/// Uniform probability over the four producing kinds.
const UNIFORM_GUESS: f64 = 0.25;

// ---------------------------------------------------------------------------
// Acceptance statistics and the prior
// ---------------------------------------------------------------------------

/// Lifetime counts of offers made and accepted, per (give, receive) bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferStats {
    made: [[u32; TOTAL_BUCKETS]; TOTAL_BUCKETS],
    accepted: [[u32; TOTAL_BUCKETS]; TOTAL_BUCKETS],
}

impl Default for OfferStats {
    fn default() -> Self {
        Self {
            made: [[SEED_OBSERVATIONS; TOTAL_BUCKETS]; TOTAL_BUCKETS],
            accepted: [[SEED_OBSERVATIONS; TOTAL_BUCKETS]; TOTAL_BUCKETS],
        }
    }
}

impl OfferStats {
    /// Count one offer made by this agent and whether it was accepted.
    pub fn record(&mut self, offer: &Offer, accepted: bool) {
        let (give, receive) = (offer.give_total(), offer.receive_total());
        if let Some(cell) = self.made.get_mut(give).and_then(|row| row.get_mut(receive)) {
            *cell = cell.saturating_add(1);
        }
        if accepted {
            if let Some(cell) = self.accepted.get_mut(give).and_then(|row| row.get_mut(receive)) {
                *cell = cell.saturating_add(1);
            }
        }
    }

    /// `(made, accepted)` for one bucket.
    pub fn counts(&self, give: usize, receive: usize) -> (u32, u32) {
        let made = self.made.get(give).and_then(|row| row.get(receive)).copied();
        let accepted = self.accepted.get(give).and_then(|row| row.get(receive)).copied();
        (made.unwrap_or(0), accepted.unwrap_or(0))
    }

    /// Accepted over made for one bucket (1.0 for a bucket never offered).
    pub fn acceptance_rate(&self, give: usize, receive: usize) -> f64 {
        match self.counts(give, receive) {
            (0, _) => 1.0,
            (made, accepted) => f64::from(accepted) / f64::from(made),
        }
    }
}

/// Generalized prior: probability that an offer of a given shape is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorMatrix([[f64; TOTAL_BUCKETS]; TOTAL_BUCKETS]);

impl Default for PriorMatrix {
    fn default() -> Self {
        Self([[1.0; TOTAL_BUCKETS]; TOTAL_BUCKETS])
    }
}

impl PriorMatrix {
    /// Prior for a (give, receive) bucket. Out-of-range buckets read 1.0.
    pub fn get(&self, give: usize, receive: usize) -> f64 {
        self.0
            .get(give)
            .and_then(|row| row.get(receive))
            .copied()
            .unwrap_or(1.0)
    }

    /// Overwrite one bucket.
    pub fn set(&mut self, give: usize, receive: usize, value: f64) {
        if let Some(cell) = self.0.get_mut(give).and_then(|row| row.get_mut(receive)) {
            *cell = value;
        }
    }

    /// Prior for the bucket `offer` falls into.
    pub fn for_offer(&self, offer: &Offer) -> f64 {
        self.get(offer.give_total(), offer.receive_total())
    }

    /// Rebuild every bucket from lifetime statistics.
    pub fn from_stats(stats: &OfferStats) -> Self {
        let mut prior = Self::default();
        for (give, row) in prior.0.iter_mut().enumerate() {
            for (receive, cell) in row.iter_mut().enumerate() {
                *cell = stats.acceptance_rate(give, receive);
            }
        }
        prior
    }
}

// ---------------------------------------------------------------------------
// Offer beliefs
// ---------------------------------------------------------------------------

/// What kind of evidence an observed offer provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    /// The observed offer was made by the updater and rejected: anything
    /// asking at least as much is probably unacceptable too.
    Rejected,
    /// The observed offer was received from the counterpart: anything
    /// giving less than the counterpart asked for is less plausible.
    Proposed,
}

/// Learned acceptance probability per exact offer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferBeliefs(HashMap<Offer, f64>);

impl OfferBeliefs {
    /// Learned belief for an offer, if any.
    pub fn get(&self, offer: &Offer) -> Option<f64> {
        self.0.get(offer).copied()
    }

    /// Learned belief, or the prior for the offer's shape.
    pub fn belief(&self, offer: &Offer, prior: &PriorMatrix) -> f64 {
        self.get(offer).unwrap_or_else(|| prior.for_offer(offer))
    }

    /// Record a belief directly.
    pub fn insert(&mut self, offer: Offer, belief: f64) {
        self.0.insert(offer, belief);
    }

    /// Number of offers with a learned belief.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decay every alternative `own` could have offered `other`, in
    /// proportion to how many kinds it resembles `observed` in.
    ///
    /// An alternative matching in `m` kinds is multiplied by
    /// `(1 - learning_speed)^m`. Alternatives without a learned belief start
    /// from the prior of the observed offer's bucket.
    pub fn absorb(
        &mut self,
        evidence: Evidence,
        observed: &Offer,
        own: &Resources,
        other: &Resources,
        prior: &PriorMatrix,
        learning_speed: f64,
    ) {
        let fallback = prior.for_offer(observed);
        let retain = 1.0 - learning_speed;
        for alternative in candidate_offers(own, other) {
            let matches = similarity(evidence, &alternative, observed);
            if matches == 0 {
                continue;
            }
            let base = self.get(&alternative).unwrap_or(fallback);
            let exponent = i32::try_from(matches).unwrap_or(i32::MAX);
            self.0.insert(alternative, retain.powi(exponent) * base);
        }
    }
}

/// Number of kinds in which `alternative` is at least as demanding (after a
/// rejection) or less generous (after a proposal) than `observed`.
fn similarity(evidence: Evidence, alternative: &Offer, observed: &Offer) -> usize {
    match evidence {
        Evidence::Rejected => alternative
            .receive
            .iter()
            .zip(observed.receive.iter())
            .filter(|(alt, seen)| **seen != 0 && *alt >= *seen)
            .count(),
        Evidence::Proposed => alternative
            .give
            .iter()
            .zip(observed.give.iter())
            .filter(|(alt, seen)| *alt < *seen)
            .count(),
    }
}

// ---------------------------------------------------------------------------
// Opponent models
// ---------------------------------------------------------------------------

/// Probability distribution over the counterpart's producing kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerBelief([f64; RESOURCE_KINDS]);

impl Default for ProducerBelief {
    fn default() -> Self {
        Self([UNIFORM_GUESS; RESOURCE_KINDS])
    }
}

impl ProducerBelief {
    /// Build from raw weights, rescaling to sum to one. Weights that sum to
    /// zero or less reset to the uniform distribution.
    pub fn normalized(weights: [f64; RESOURCE_KINDS]) -> Self {
        let sum: f64 = weights.iter().sum();
        if sum > 0.0 {
            Self(weights.map(|w| w / sum))
        } else {
            Self::default()
        }
    }

    /// Probability that the counterpart produces `kind`.
    pub fn get(&self, kind: usize) -> f64 {
        self.0.get(kind).copied().unwrap_or(0.0)
    }

    /// Raw probabilities.
    pub const fn weights(&self) -> [f64; RESOURCE_KINDS] {
        self.0
    }

    /// Iterate `(kind, probability)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0.iter().copied().enumerate()
    }
}

/// What an agent believes about its counterpart at one ToM order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpponentModel {
    /// Guess at the counterpart's producing kind.
    pub producer: ProducerBelief,
    /// Confidence that the counterpart reasons at this order.
    pub confidence: f64,
}

impl Default for OpponentModel {
    fn default() -> Self {
        Self {
            producer: ProducerBelief::default(),
            confidence: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Mind
// ---------------------------------------------------------------------------

/// Everything an agent believes, lifetime and per negotiation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mind {
    /// Lifetime acceptance prior.
    pub prior: PriorMatrix,
    /// Lifetime offer statistics the prior is derived from.
    pub stats: OfferStats,
    /// Beliefs about the agent's own offers (also `b2` for ToM2).
    pub b0: OfferBeliefs,
    /// Beliefs about what the counterpart believes.
    pub b1: OfferBeliefs,
    /// Model of the counterpart as a ToM1 reasoner (`p1`, `c1`).
    pub tom1: OpponentModel,
    /// Model of the counterpart as a ToM2 reasoner (`p2`, `c2`).
    pub tom2: OpponentModel,
}

impl Mind {
    /// A mind that inherits the lifetime prior and statistics of `donor`.
    pub fn inherited_from(donor: &Self) -> Self {
        Self {
            prior: donor.prior.clone(),
            stats: donor.stats.clone(),
            ..Self::default()
        }
    }

    /// Offer beliefs an agent of `order` reasons with about its own moves.
    pub const fn beliefs_for(&self, order: ToMOrder) -> &OfferBeliefs {
        match order {
            ToMOrder::Zero | ToMOrder::Two => &self.b0,
            ToMOrder::One => &self.b1,
        }
    }

    /// Recompute the prior from the lifetime statistics.
    pub fn refresh_prior(&mut self) {
        self.prior = PriorMatrix::from_stats(&self.stats);
    }

    /// Clear per-negotiation beliefs for a new negotiation.
    pub fn begin_negotiation(&mut self, order: ToMOrder) {
        self.b0 = OfferBeliefs::default();
        if order >= ToMOrder::One {
            self.b1 = OfferBeliefs::default();
        }
        self.reset_opponent_models(order);
    }

    /// Reset the opponent models an agent of `order` maintains.
    pub fn reset_opponent_models(&mut self, order: ToMOrder) {
        if order >= ToMOrder::One {
            self.tom1 = OpponentModel::default();
        }
        if order >= ToMOrder::Two {
            self.tom2 = OpponentModel::default();
        }
    }
}
