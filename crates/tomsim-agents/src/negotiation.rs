//! The alternating-offers negotiation protocol.
//!
//! A [`Negotiation`] seats two agents, snapshots their holdings, and then
//! advances one round per [`Negotiation::play_round`] call:
//!
//! 1. Round 1: the first seat makes an opening offer or withdraws.
//! 2. From round 2: the seat whose turn it is counters, accepts, or
//!    withdraws, until the round limit ends the negotiation as too long.
//!
//! Each proposal and rejection flows back into both agents' beliefs. The
//! negotiation never outlives its agents: the population drives it and
//! releases both participants when it reports [`RoundOutcome::Finished`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use tomsim_types::{
    AgentId, ExperimentVariant, NegotiationEnding, NegotiationId, Offer, Resources, Seat, ToMOrder,
};

use crate::agent::{Agent, BeliefLayer};
use crate::beliefs::Evidence;
use crate::config::NegotiationConfig;
use crate::error::AgentError;
use crate::reasoning::{Scratch, Table, TurnChoice};

/// Summary of a finished negotiation, as consumed by the statistics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationReport {
    /// Which negotiation.
    pub id: NegotiationId,
    /// Participants by seat.
    pub seats: [AgentId; 2],
    /// ToM orders by seat, the key statistics are grouped under.
    pub orders: [ToMOrder; 2],
    /// Rounds played.
    pub rounds: u32,
    /// How it ended.
    pub ending: NegotiationEnding,
    /// Score change per seat, for accepted trades.
    pub gains: Option<[i32; 2]>,
}

impl NegotiationReport {
    /// Release both participants. `first` and `second` must be the agents in
    /// seat order.
    pub fn release(&self, first: &mut Agent, second: &mut Agent, variant: ExperimentVariant) {
        let [first_id, second_id] = self.seats;
        first.conclude_negotiation(second_id, self.ending, variant);
        second.conclude_negotiation(first_id, self.ending, variant);
    }
}

/// Result of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The negotiation goes on.
    Continue,
    /// The negotiation is over.
    Finished(NegotiationReport),
}

/// A live negotiation between two agents.
#[derive(Debug, Clone)]
pub struct Negotiation {
    id: NegotiationId,
    seats: [AgentId; 2],
    orders: [ToMOrder; 2],
    initial: [Resources; 2],
    round: u32,
    scratch: [Scratch; 2],
    ending: Option<NegotiationEnding>,
}

impl Negotiation {
    /// Seat `first` and `second` at a new negotiation.
    ///
    /// Both refresh their prior, top up their produced kind, and clear their
    /// per-negotiation beliefs before the holdings snapshot is taken. With
    /// `recall` set, remembered opponent models are restored afterwards.
    pub fn open(
        id: NegotiationId,
        first: &mut Agent,
        second: &mut Agent,
        recall: bool,
    ) -> Result<Self, AgentError> {
        if first.id() == second.id() {
            return Err(AgentError::SelfNegotiation(first.id()));
        }
        first.prepare_for(second.id());
        second.prepare_for(first.id());
        first.begin_negotiation();
        second.begin_negotiation();

        let negotiation = Self {
            id,
            seats: [first.id(), second.id()],
            orders: [first.order(), second.order()],
            initial: [first.resources(), second.resources()],
            round: 0,
            scratch: [Scratch::default(), Scratch::default()],
            ending: None,
        };

        first.join_negotiation(id, second.id(), recall);
        second.join_negotiation(id, first.id(), recall);
        tracing::trace!(
            negotiation = %id,
            first = %first.id(),
            second = %second.id(),
            "negotiation opened"
        );
        Ok(negotiation)
    }

    /// Identifier.
    pub const fn id(&self) -> NegotiationId {
        self.id
    }

    /// Participants by seat.
    pub const fn seats(&self) -> [AgentId; 2] {
        self.seats
    }

    /// The other participant, if `agent` is seated here.
    pub fn partner_of(&self, agent: AgentId) -> Option<AgentId> {
        let [first, second] = self.seats;
        if agent == first {
            Some(second)
        } else if agent == second {
            Some(first)
        } else {
            None
        }
    }

    /// Rounds played so far.
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Holdings snapshot taken at opening.
    pub const fn initial_resources(&self) -> [Resources; 2] {
        self.initial
    }

    /// How the negotiation ended, once it has.
    pub const fn ending(&self) -> Option<NegotiationEnding> {
        self.ending
    }

    /// Offer standing after the last round, written from its proposer's
    /// point of view. `None` before the first round and once finished.
    pub fn offer_on_table(&self) -> Option<Offer> {
        if self.round == 0 || self.ending.is_some() {
            return None;
        }
        let proposer = self.whose_turn();
        self.scratch_ref(proposer).best_offer(proposer.pick(self.orders))
    }

    /// Seat that acts in the current round: the first seat on odd rounds.
    pub const fn whose_turn(&self) -> Seat {
        if self.round % 2 == 1 {
            Seat::First
        } else {
            Seat::Second
        }
    }

    /// Seat that waits in the current round.
    pub const fn opponents_turn(&self) -> Seat {
        self.whose_turn().other()
    }

    /// Play one round. `first` and `second` are the seated agents in seat
    /// order.
    pub fn play_round<R: Rng + ?Sized>(
        &mut self,
        first: &mut Agent,
        second: &mut Agent,
        config: &NegotiationConfig,
        rng: &mut R,
    ) -> Result<RoundOutcome, AgentError> {
        let [first_seat, second_seat] = self.seats;
        for (agent, seated) in [(first.id(), first_seat), (second.id(), second_seat)] {
            if agent != seated {
                return Err(AgentError::NotSeated {
                    negotiation: self.id,
                    agent,
                });
            }
        }
        if let Some(ending) = self.ending {
            return Ok(RoundOutcome::Finished(self.report(ending, None)));
        }

        self.round = self.round.saturating_add(1);
        let turn = self.whose_turn();
        let (actor, other) = match turn {
            Seat::First => (first, second),
            Seat::Second => (second, first),
        };

        let outcome = if self.round == 1 {
            self.open_bidding(actor, other, turn, config, rng)
        } else if self.round >= config.max_rounds {
            self.finish(NegotiationEnding::TooLong, None)
        } else {
            self.determine_move(actor, other, turn, config, rng)
        };
        for scratch in &mut self.scratch {
            scratch.clear_evs();
        }
        Ok(outcome)
    }

    // -- moves -----------------------------------------------------------------

    fn open_bidding<R: Rng + ?Sized>(
        &mut self,
        actor: &mut Agent,
        other: &mut Agent,
        turn: Seat,
        config: &NegotiationConfig,
        rng: &mut R,
    ) -> RoundOutcome {
        let table = self.table(actor, other, turn);
        let offer = actor.opening_offer(self.scratch_mut(turn), table, turn, config, rng);
        match offer {
            Some(offer) => {
                self.propose(actor, other, turn, offer, config, rng);
                RoundOutcome::Continue
            }
            None => self.finish(NegotiationEnding::Withdrawn { by: turn }, None),
        }
    }

    fn determine_move<R: Rng + ?Sized>(
        &mut self,
        actor: &mut Agent,
        other: &mut Agent,
        turn: Seat,
        config: &NegotiationConfig,
        rng: &mut R,
    ) -> RoundOutcome {
        let Some(on_table) = self.scratch_ref(turn.other()).best_offer(other.order()) else {
            return self.finish(NegotiationEnding::Withdrawn { by: turn }, None);
        };
        let table = self.table(actor, other, turn);
        let choice = actor.decide(self.scratch_mut(turn), table, turn, &on_table, config, rng);
        match choice {
            TurnChoice::Counter => {
                Self::reject(actor, other, &on_table, config);
                match self.scratch_ref(turn).best_offer(actor.order()) {
                    Some(offer) => {
                        self.propose(actor, other, turn, offer, config, rng);
                        RoundOutcome::Continue
                    }
                    None => self.finish(NegotiationEnding::Withdrawn { by: turn }, None),
                }
            }
            TurnChoice::Accept => self.accept(actor, other, turn, &on_table),
            TurnChoice::Withdraw => {
                let (proposer, responder) = (other.resources(), actor.resources());
                other.record_offer(&on_table, false);
                // The proposer's own holdings stand in for both sides here.
                other.absorb(BeliefLayer::Own, Evidence::Rejected, &on_table, &proposer, &proposer, config);
                if actor.order() >= ToMOrder::One {
                    actor.absorb(BeliefLayer::Partner, Evidence::Rejected, &on_table, &proposer, &responder, config);
                }
                self.finish(NegotiationEnding::Withdrawn { by: turn }, None)
            }
        }
    }

    /// `actor` turns down `on_table`, the offer `other` made.
    fn reject(
        actor: &mut Agent,
        other: &mut Agent,
        on_table: &Offer,
        config: &NegotiationConfig,
    ) {
        other.record_offer(on_table, false);
        let (proposer, responder) = (other.resources(), actor.resources());
        other.absorb(BeliefLayer::Own, Evidence::Rejected, on_table, &proposer, &responder, config);
        if actor.order() >= ToMOrder::One {
            actor.absorb(BeliefLayer::Partner, Evidence::Rejected, on_table, &proposer, &responder, config);
        }
    }

    /// `actor` (in `turn`) puts `offer` on the table; both sides learn from it.
    fn propose<R: Rng + ?Sized>(
        &self,
        actor: &mut Agent,
        other: &mut Agent,
        turn: Seat,
        offer: Offer,
        config: &NegotiationConfig,
        rng: &mut R,
    ) {
        let table = self.table(actor, other, turn);
        let (proposer, responder) = (actor.resources(), other.resources());

        other.absorb(BeliefLayer::Own, Evidence::Proposed, &offer.mirror(), &responder, &proposer, config);
        if other.order() >= ToMOrder::One {
            other.revise_producer_belief(ToMOrder::One, &offer, turn, table, config, rng);
            other.revise_confidence(ToMOrder::One, &offer, turn, table, config, rng);
        }
        if other.order() == ToMOrder::Two {
            other.revise_confidence(ToMOrder::Two, &offer, turn, table, config, rng);
        }

        if actor.order() >= ToMOrder::One {
            actor.absorb(BeliefLayer::Partner, Evidence::Proposed, &offer, &responder, &proposer, config);
        }
        if actor.order() == ToMOrder::Two {
            actor.revise_producer_belief(ToMOrder::Two, &offer.mirror(), turn.other(), table, config, rng);
        }
    }

    /// `actor` accepts `on_table`; the trade executes on both sides.
    fn accept(&mut self, actor: &mut Agent, other: &mut Agent, turn: Seat, on_table: &Offer) -> RoundOutcome {
        let feasible = actor.resources().after(&on_table.mirror()).is_some()
            && other.resources().after(on_table).is_some();
        if !feasible {
            tracing::warn!(negotiation = %self.id, "accepted offer no longer feasible");
            return self.finish(NegotiationEnding::Withdrawn { by: turn }, None);
        }
        let held = actor.resources();
        let gains = actor
            .execute(&on_table.mirror())
            .and_then(|actor_gain| other.execute(on_table).map(|other_gain| (actor_gain, other_gain)));
        let Some((actor_gain, other_gain)) = gains else {
            actor.set_resources(held);
            tracing::warn!(negotiation = %self.id, "accepted offer failed to execute");
            return self.finish(NegotiationEnding::Withdrawn { by: turn }, None);
        };
        other.record_offer(on_table, true);
        let gains = match turn {
            Seat::First => [actor_gain, other_gain],
            Seat::Second => [other_gain, actor_gain],
        };
        self.finish(NegotiationEnding::Accepted { by: turn }, Some(gains))
    }

    // -- helpers ---------------------------------------------------------------

    fn finish(&mut self, ending: NegotiationEnding, gains: Option<[i32; 2]>) -> RoundOutcome {
        self.ending = Some(ending);
        tracing::trace!(negotiation = %self.id, rounds = self.round, code = ending.code(), "negotiation ended");
        RoundOutcome::Finished(self.report(ending, gains))
    }

    const fn report(&self, ending: NegotiationEnding, gains: Option<[i32; 2]>) -> NegotiationReport {
        NegotiationReport {
            id: self.id,
            seats: self.seats,
            orders: self.orders,
            rounds: self.round,
            ending,
            gains,
        }
    }

    fn table(&self, actor: &Agent, other: &Agent, turn: Seat) -> Table {
        let current = match turn {
            Seat::First => [actor.resources(), other.resources()],
            Seat::Second => [other.resources(), actor.resources()],
        };
        Table {
            initial: self.initial,
            current,
        }
    }

    fn scratch_ref(&self, seat: Seat) -> &Scratch {
        let [first, second] = &self.scratch;
        match seat {
            Seat::First => first,
            Seat::Second => second,
        }
    }

    fn scratch_mut(&mut self, seat: Seat) -> &mut Scratch {
        let [first, second] = &mut self.scratch;
        match seat {
            Seat::First => first,
            Seat::Second => second,
        }
    }
}
