//! Recursive expected-value reasoning.
//!
//! A [`Reasoner`] evaluates offers for one agent at a chosen ToM order:
//!
//! - **ToM0** blends the post-trade score with the status quo, weighted by
//!   the learned acceptance belief for the offer.
//! - **ToM1** mixes the ToM0 value with a simulation of a ToM0 opponent's
//!   response, marginalized over the opponent's guessed producing kind.
//! - **ToM2** does the same one level up, simulating a ToM1 opponent.
//!
//! Every entry point writes into an explicit [`Scratch`]. Live decisions pass
//! the negotiation's scratch for the acting seat. Belief and confidence
//! revisions allocate their own, so a hypothetical evaluation can never
//! disturb the negotiation's bookkeeping.

use std::cmp::Ordering;

use rand::Rng;
use tomsim_types::{Offer, RESOURCE_KINDS, Resources, Seat, ToMOrder};

use crate::beliefs::{Mind, OfferBeliefs, OpponentModel, ProducerBelief};
use crate::config::NegotiationConfig;
use crate::offers::candidate_offers;
use crate::score::{score, score_after, value, value_after};

/// Expected value recorded when no viable offer exists.
pub const NO_OFFER_EV: f64 = f64::MIN;

const ORDERS: usize = 3;

// ---------------------------------------------------------------------------
// Scratch space and the shared table
// ---------------------------------------------------------------------------

/// Best offer and its expected value per ToM order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scratch {
    best_offer: [Option<Offer>; ORDERS],
    best_ev: [f64; ORDERS],
}

impl Default for Scratch {
    fn default() -> Self {
        Self {
            best_offer: [None; ORDERS],
            best_ev: [NO_OFFER_EV; ORDERS],
        }
    }
}

impl Scratch {
    /// Best offer found at `order`, if any.
    pub fn best_offer(&self, order: ToMOrder) -> Option<Offer> {
        self.best_offer.get(order.index()).copied().flatten()
    }

    /// Expected value of the best offer at `order`.
    pub fn best_ev(&self, order: ToMOrder) -> f64 {
        self.best_ev.get(order.index()).copied().unwrap_or(NO_OFFER_EV)
    }

    /// Record the outcome of a search at `order`.
    pub fn set(&mut self, order: ToMOrder, offer: Option<Offer>, ev: f64) {
        if let Some(slot) = self.best_offer.get_mut(order.index()) {
            *slot = offer;
        }
        if let Some(slot) = self.best_ev.get_mut(order.index()) {
            *slot = ev;
        }
    }

    /// Forget the expected values but keep the offers on record.
    pub fn clear_evs(&mut self) {
        self.best_ev = [NO_OFFER_EV; ORDERS];
    }
}

/// Resource state both parties can see during a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    /// Snapshot taken when the negotiation opened, per seat.
    pub initial: [Resources; 2],
    /// Holdings right now, per seat.
    pub current: [Resources; 2],
}

impl Table {
    /// A table where nothing has changed since the negotiation opened.
    pub const fn opening(resources: [Resources; 2]) -> Self {
        Self {
            initial: resources,
            current: resources,
        }
    }

    /// Status-quo holdings of a seat.
    pub const fn initial(&self, seat: Seat) -> Resources {
        seat.pick(self.initial)
    }

    /// Current holdings of a seat.
    pub const fn current(&self, seat: Seat) -> Resources {
        seat.pick(self.current)
    }
}

/// What a reasoner does with the offer on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnChoice {
    /// Something better than both accepting and walking away exists.
    Counter,
    /// Accepting beats the reasoner's own best alternative.
    Accept,
    /// Neither; end the negotiation.
    Withdraw,
}

// ---------------------------------------------------------------------------
// Guess cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Guess {
    offer: Offer,
    ev: f64,
}

/// Best counteroffers attributed to a simulated opponent, per (order, kind).
#[derive(Debug, Default)]
struct GuessCache([[Option<Guess>; RESOURCE_KINDS]; ORDERS]);

impl GuessCache {
    fn get(&self, order: ToMOrder, kind: usize) -> Option<Guess> {
        self.0
            .get(order.index())
            .and_then(|row| row.get(kind))
            .copied()
            .flatten()
    }

    fn put(&mut self, order: ToMOrder, kind: usize, guess: Option<Guess>) {
        if let Some(slot) = self.0.get_mut(order.index()).and_then(|row| row.get_mut(kind)) {
            *slot = guess;
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Reasoner
// ---------------------------------------------------------------------------

/// One top-level reasoning call on behalf of an agent.
///
/// Construct a fresh reasoner for each decision or revision; the guess cache
/// it owns is only valid for the duration of that call.
pub struct Reasoner<'a, R: Rng + ?Sized> {
    mind: &'a Mind,
    table: Table,
    config: &'a NegotiationConfig,
    rng: &'a mut R,
    guesses: GuessCache,
}

impl<'a, R: Rng + ?Sized> Reasoner<'a, R> {
    /// Reason with `mind` about the negotiation state in `table`.
    pub fn new(mind: &'a Mind, table: Table, config: &'a NegotiationConfig, rng: &'a mut R) -> Self {
        Self {
            mind,
            table,
            config,
            rng,
            guesses: GuessCache::default(),
        }
    }

    // -- live decisions ------------------------------------------------------

    /// Opening move for `seat`. Leaves `None` in the scratch when the best
    /// offer does not beat the current holdings.
    pub fn opening_offer(
        &mut self,
        scratch: &mut Scratch,
        seat: Seat,
        producing: usize,
        order: ToMOrder,
    ) -> Option<Offer> {
        let beliefs = self.mind.beliefs_for(order);
        self.best_offer(scratch, seat, producing, beliefs, order, false);
        let best = scratch.best_ev(order);
        let holding = value(&self.table.current(seat), producing);
        if best < holding || self.config.close(best, holding) {
            scratch.set(order, None, NO_OFFER_EV);
        }
        scratch.best_offer(order)
    }

    /// Respond to `on_table`, written from the proposer's point of view.
    pub fn decide(
        &mut self,
        scratch: &mut Scratch,
        seat: Seat,
        on_table: &Offer,
        producing: usize,
        order: ToMOrder,
    ) -> TurnChoice {
        let beliefs = self.mind.beliefs_for(order);
        self.respond(scratch, seat, on_table, producing, beliefs, order, false)
    }

    // -- revisions -----------------------------------------------------------

    /// Reweight the guess at the producing kind of the agent in `holder`,
    /// which proposed `proposed` (written from its own point of view).
    ///
    /// Kinds under which the proposal would not improve the proposer's score
    /// drop to zero; the others are scaled by how close the proposal comes to
    /// the best a one-order-lower reasoner could do in the other seat.
    pub fn revise_producer_belief(
        &mut self,
        proposed: &Offer,
        holder: Seat,
        order: ToMOrder,
        current: ProducerBelief,
        beliefs: &OfferBeliefs,
    ) -> ProducerBelief {
        let Some(lower) = order.lower() else {
            return current;
        };
        let seat = holder.other();
        let holdings = self.table.current(holder);
        let mut scratch = Scratch::default();
        self.guesses.clear();

        let mut weights = [0.0; RESOURCE_KINDS];
        for ((kind, prior), weight) in current.iter().zip(weights.iter_mut()) {
            if score_after(&holdings, proposed, kind) <= score(&holdings, kind) {
                continue;
            }
            self.best_offer(&mut scratch, seat, kind, beliefs, lower, false);
            let ev = self.expected_value(&mut scratch, &proposed.mirror(), seat, kind, beliefs, lower, false);
            let ratio = (1.0 + ev) / (1.0 + scratch.best_ev(lower));
            *weight = prior * ratio.max(0.0);
        }
        ProducerBelief::normalized(weights)
    }

    /// New confidence that the agent in `proposer` reasons at `order`, given
    /// that it proposed `proposed` (written from its own point of view).
    pub fn revise_confidence(
        &mut self,
        proposed: &Offer,
        proposer: Seat,
        order: ToMOrder,
        model: OpponentModel,
        beliefs: &OfferBeliefs,
    ) -> f64 {
        let mut scratch = Scratch::default();
        self.guesses.clear();

        let mut fit = 0.0;
        for (kind, probability) in model.producer.iter() {
            self.best_offer(&mut scratch, proposer, kind, beliefs, order, false);
            let best = scratch.best_ev(order);
            scratch = Scratch::default();
            self.guesses.clear();
            if best.total_cmp(&NO_OFFER_EV) == Ordering::Equal {
                continue;
            }
            let ev = self.expected_value(&mut scratch, proposed, proposer, kind, beliefs, order, false);
            fit += probability * (1.0 + ev).max(0.0) / (1.0 + best).max(0.0);
        }
        let rate = self.config.learning_speed;
        ((1.0 - rate) * model.confidence + rate * fit).min(1.0)
    }

    // -- search --------------------------------------------------------------

    /// Exhaustive search for the highest-EV offer `seat` could make,
    /// breaking exact ties uniformly at random.
    fn best_offer(
        &mut self,
        scratch: &mut Scratch,
        seat: Seat,
        producing: usize,
        beliefs: &OfferBeliefs,
        order: ToMOrder,
        attributing: bool,
    ) {
        let own = self.table.current(seat);
        let other = self.table.current(seat.other());

        let mut best = NO_OFFER_EV;
        let mut tied: Vec<Offer> = Vec::new();
        for offer in candidate_offers(&own, &other) {
            let ev = self.expected_value(scratch, &offer, seat, producing, beliefs, order, attributing);
            match ev.total_cmp(&best) {
                Ordering::Greater => {
                    best = ev;
                    tied.clear();
                    tied.push(offer);
                }
                Ordering::Equal => tied.push(offer),
                Ordering::Less => {}
            }
        }

        let chosen = if tied.len() > 1 {
            tied.get(self.rng.random_range(0..tied.len())).copied()
        } else {
            tied.first().copied()
        };
        match chosen {
            Some(offer) => scratch.set(order, Some(offer), best),
            None => scratch.set(order, None, NO_OFFER_EV),
        }
        if attributing {
            let guess = chosen.map(|offer| Guess { offer, ev: best });
            self.guesses.put(order, producing, guess);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn expected_value(
        &mut self,
        scratch: &mut Scratch,
        offer: &Offer,
        seat: Seat,
        producing: usize,
        beliefs: &OfferBeliefs,
        order: ToMOrder,
        attributing: bool,
    ) -> f64 {
        match order {
            ToMOrder::Zero => self.ev_zero(offer, seat, producing, beliefs),
            ToMOrder::One => self.ev_one(scratch, offer, seat, producing, beliefs, attributing),
            ToMOrder::Two => self.ev_two(scratch, offer, seat, producing, beliefs),
        }
    }

    fn ev_zero(&self, offer: &Offer, seat: Seat, producing: usize, beliefs: &OfferBeliefs) -> f64 {
        let belief = beliefs.belief(offer, &self.mind.prior);
        let after = value_after(&self.table.current(seat), offer, producing);
        let status_quo = value(&self.table.initial(seat), producing);
        // Floating-point blending must not overshoot both components.
        (belief * after + (1.0 - belief) * status_quo).min(after.max(status_quo))
    }

    fn ev_one(
        &mut self,
        scratch: &mut Scratch,
        offer: &Offer,
        seat: Seat,
        producing: usize,
        beliefs: &OfferBeliefs,
        attributing: bool,
    ) -> f64 {
        let mind = self.mind;
        let model = if attributing {
            OpponentModel {
                producer: mind.tom2.producer,
                confidence: 1.0,
            }
        } else {
            mind.tom1
        };

        let naive = (1.0 - model.confidence) * self.ev_zero(offer, seat, producing, &mind.b0);
        let mut modelled = 0.0;
        for (guess, probability) in model.producer.iter() {
            modelled += probability
                * self.direct_ev(scratch, offer, seat, producing, guess, beliefs, ToMOrder::Zero);
        }
        naive + model.confidence * modelled
    }

    fn ev_two(
        &mut self,
        scratch: &mut Scratch,
        offer: &Offer,
        seat: Seat,
        producing: usize,
        beliefs: &OfferBeliefs,
    ) -> f64 {
        let mind = self.mind;
        let lower = (1.0 - mind.tom2.confidence)
            * self.ev_one(scratch, offer, seat, producing, &mind.b1, false);
        self.guesses.clear();

        let mut modelled = 0.0;
        for (guess, probability) in mind.tom1.producer.iter() {
            modelled += probability
                * self.direct_ev(scratch, offer, seat, producing, guess, beliefs, ToMOrder::One);
        }
        self.guesses.clear();
        lower + mind.tom2.confidence * modelled
    }

    /// Score `seat` ends up with if an opponent reasoning at exactly `order`
    /// and producing `guess` responds to `offer`.
    #[allow(clippy::too_many_arguments)]
    fn direct_ev(
        &mut self,
        scratch: &mut Scratch,
        offer: &Offer,
        seat: Seat,
        producing: usize,
        guess: usize,
        beliefs: &OfferBeliefs,
        order: ToMOrder,
    ) -> f64 {
        let choice = self.respond(scratch, seat.other(), offer, guess, beliefs, order, true);
        let status_quo = value(&self.table.initial(seat), producing);
        match choice {
            TurnChoice::Withdraw => status_quo,
            TurnChoice::Accept => value_after(&self.table.current(seat), offer, producing),
            TurnChoice::Counter => scratch.best_offer(order).map_or(status_quo, |counter| {
                value_after(&self.table.current(seat), &counter.mirror(), producing).max(status_quo)
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn respond(
        &mut self,
        scratch: &mut Scratch,
        seat: Seat,
        on_table: &Offer,
        producing: usize,
        beliefs: &OfferBeliefs,
        order: ToMOrder,
        attributing: bool,
    ) -> TurnChoice {
        if self.better_offer_available(scratch, seat, on_table, producing, beliefs, order, attributing) {
            TurnChoice::Counter
        } else if self.acceptable(scratch, seat, on_table, producing, order) {
            TurnChoice::Accept
        } else {
            TurnChoice::Withdraw
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn better_offer_available(
        &mut self,
        scratch: &mut Scratch,
        seat: Seat,
        on_table: &Offer,
        producing: usize,
        beliefs: &OfferBeliefs,
        order: ToMOrder,
        attributing: bool,
    ) -> bool {
        if let Some(guess) = self.guesses.get(order, producing) {
            scratch.set(order, Some(guess.offer), guess.ev);
        } else {
            self.best_offer(scratch, seat, producing, beliefs, order, attributing);
        }
        let best = scratch.best_ev(order);
        let status_quo = value(&self.table.initial(seat), producing);
        let accepting = value_after(&self.table.current(seat), &on_table.mirror(), producing);
        self.config.exceeds(best, status_quo) && self.config.exceeds(best, accepting)
    }

    fn acceptable(
        &self,
        scratch: &Scratch,
        seat: Seat,
        on_table: &Offer,
        producing: usize,
        order: ToMOrder,
    ) -> bool {
        let status_quo = value(&self.table.initial(seat), producing);
        let accepting = value_after(&self.table.current(seat), &on_table.mirror(), producing);
        self.config.exceeds(accepting, status_quo)
            && self.config.exceeds(accepting, scratch.best_ev(order))
    }
}
