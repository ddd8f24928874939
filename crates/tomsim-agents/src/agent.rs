//! Agent state and lifecycle.
//!
//! An [`Agent`] owns its resources, location, heading, age, [`Mind`], and
//! the bookkeeping the population needs: whether it is negotiating, whether
//! it is dying, and whether a resource reduction is waiting for its current
//! negotiation to finish.
//!
//! Reasoning entry points wrap a fresh [`Reasoner`] around the agent's mind.
//! Belief revisions compute new values first and assign them afterwards.

use std::collections::{HashMap, VecDeque};

use rand::Rng;
use tomsim_types::{
    AgentId, AgentView, ExperimentVariant, NegotiationEnding, NegotiationId, Offer, Position,
    Resources, Seat, ToMOrder,
};

use crate::beliefs::{Evidence, Mind, OfferBeliefs, OpponentModel};
use crate::config::NegotiationConfig;
use crate::reasoning::{Reasoner, Scratch, Table, TurnChoice};

/// Unsuccessful partners remembered per agent, the widest usable window.
pub const UNSUCCESSFUL_MEMORY: usize = 16;

/// Parameters for placing a new agent in the arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSpawn {
    /// Identifier assigned by the population.
    pub id: AgentId,
    /// Reasoning depth, fixed for life.
    pub order: ToMOrder,
    /// Kind the agent produces.
    pub producing: usize,
    /// Starting location.
    pub position: Position,
    /// Starting heading in degrees.
    pub heading: f64,
    /// Starting age in ticks.
    pub age: u64,
}

/// Whether an agent is walking or bound to a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Free to move and meet others.
    Moving,
    /// Bound to the given negotiation until it ends.
    Negotiating(NegotiationId),
}

/// Opponent models remembered for one partner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartnerMemory {
    /// ToM1 model (`p1`, `c1`).
    pub tom1: OpponentModel,
    /// ToM2 model (`p2`, `c2`).
    pub tom2: OpponentModel,
}

/// Which per-negotiation offer beliefs an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeliefLayer {
    /// `b0`: the agent's own acceptance beliefs.
    Own,
    /// `b1`: what the agent thinks its partner believes.
    Partner,
}

/// A live agent.
#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    order: ToMOrder,
    producing: usize,
    position: Position,
    heading: f64,
    age: u64,
    resources: Resources,
    mind: Mind,
    activity: Activity,
    previous_partner: Option<AgentId>,
    dying: bool,
    reduction_pending: bool,
    partner_memory: HashMap<AgentId, PartnerMemory>,
    unsuccessful: VecDeque<AgentId>,
}

impl Agent {
    /// A fresh agent with the canonical starting resources and default mind.
    pub fn new(spawn: AgentSpawn) -> Self {
        Self::with_mind(spawn, Mind::default())
    }

    /// A new agent that inherits `donor`'s lifetime prior and statistics.
    pub fn descendant_of(spawn: AgentSpawn, donor: &Self) -> Self {
        Self::with_mind(spawn, Mind::inherited_from(&donor.mind))
    }

    fn with_mind(spawn: AgentSpawn, mind: Mind) -> Self {
        Self {
            id: spawn.id,
            order: spawn.order,
            producing: spawn.producing,
            position: spawn.position,
            heading: spawn.heading,
            age: spawn.age,
            resources: Resources::initial(spawn.producing),
            mind,
            activity: Activity::Moving,
            previous_partner: None,
            dying: false,
            reduction_pending: false,
            partner_memory: HashMap::new(),
            unsuccessful: VecDeque::with_capacity(UNSUCCESSFUL_MEMORY),
        }
    }

    // -- accessors -----------------------------------------------------------

    /// Identifier.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Reasoning depth.
    pub const fn order(&self) -> ToMOrder {
        self.order
    }

    /// Produced kind.
    pub const fn producing(&self) -> usize {
        self.producing
    }

    /// Location.
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Heading in degrees.
    pub const fn heading(&self) -> f64 {
        self.heading
    }

    /// Age in ticks.
    pub const fn age(&self) -> u64 {
        self.age
    }

    /// Current holdings.
    pub const fn resources(&self) -> Resources {
        self.resources
    }

    /// Beliefs.
    pub const fn mind(&self) -> &Mind {
        &self.mind
    }

    /// Walking or negotiating.
    pub const fn activity(&self) -> Activity {
        self.activity
    }

    /// Whether the agent is bound to a negotiation.
    pub const fn is_negotiating(&self) -> bool {
        matches!(self.activity, Activity::Negotiating(_))
    }

    /// The negotiation the agent is bound to, if any.
    pub const fn negotiation(&self) -> Option<NegotiationId> {
        match self.activity {
            Activity::Negotiating(id) => Some(id),
            Activity::Moving => None,
        }
    }

    /// Whether the agent failed a survival check mid-negotiation.
    pub const fn is_dying(&self) -> bool {
        self.dying
    }

    /// Whether a one-unit reduction waits for the negotiation to end.
    pub const fn reduction_pending(&self) -> bool {
        self.reduction_pending
    }

    /// The last agent this one negotiated with.
    pub const fn previous_partner(&self) -> Option<AgentId> {
        self.previous_partner
    }

    /// Opponent models remembered for `partner`.
    pub fn partner_memory(&self, partner: AgentId) -> Option<&PartnerMemory> {
        self.partner_memory.get(&partner)
    }

    /// Whether `partner` is among the last `window` unsuccessful partners.
    pub fn recently_failed_with(&self, partner: AgentId, window: usize) -> bool {
        self.unsuccessful.iter().rev().take(window).any(|id| *id == partner)
    }

    /// Display snapshot.
    pub fn view(&self) -> AgentView {
        AgentView {
            id: self.id,
            order: self.order,
            position: self.position,
            heading: self.heading,
            age: self.age,
            producing: u8::try_from(self.producing).unwrap_or(u8::MAX),
            resources: self.resources,
            negotiating: self.is_negotiating(),
            dying: self.dying,
        }
    }

    // -- movement and ageing ---------------------------------------------------

    /// Move to a new location.
    pub fn move_to(&mut self, position: Position) {
        self.position = position;
    }

    /// Face a new direction.
    pub fn turn_to(&mut self, heading: f64) {
        self.heading = heading;
    }

    /// Age by one tick unless the agent is already dying.
    pub fn grow_older(&mut self) {
        if !self.dying {
            self.age = self.age.saturating_add(1);
        }
    }

    /// Start the age counter over, for agents born during the run.
    pub fn reset_age(&mut self) {
        self.age = 0;
    }

    // -- resources and survival ------------------------------------------------

    /// Flag the agent for removal once its negotiation ends.
    pub fn mark_dying(&mut self) {
        self.dying = true;
    }

    /// Consume one unit of each held kind, or defer until the current
    /// negotiation ends.
    pub fn reduce_resources(&mut self) {
        if self.is_negotiating() {
            self.reduction_pending = true;
        } else {
            self.resources.consume_one_each();
        }
    }

    /// Reset an agent holding the maximum of everything to the starting
    /// vector. Returns whether a reset happened.
    pub fn reset_if_saturated(&mut self) -> bool {
        if self.resources.is_saturated() {
            self.resources = Resources::initial(self.producing);
            true
        } else {
            false
        }
    }

    /// Overwrite the holdings, e.g. to stage a scenario.
    pub fn set_resources(&mut self, resources: Resources) {
        self.resources = resources;
    }

    /// Top up the produced kind.
    pub fn replenish(&mut self) {
        self.resources.fill(self.producing);
    }

    // -- negotiation lifecycle -------------------------------------------------

    /// Get ready to negotiate with `partner`: refresh the prior from lifetime
    /// statistics, remember the partner, and top up the produced kind.
    pub fn prepare_for(&mut self, partner: AgentId) {
        self.mind.refresh_prior();
        self.previous_partner = Some(partner);
        self.replenish();
    }

    /// Bind to a negotiation. Remembered opponent models for `partner` are
    /// restored when `recall` is set.
    pub fn join_negotiation(&mut self, negotiation: NegotiationId, partner: AgentId, recall: bool) {
        self.activity = Activity::Negotiating(negotiation);
        if !recall {
            return;
        }
        if let Some(memory) = self.partner_memory.get(&partner).copied() {
            if self.order >= ToMOrder::One {
                self.mind.tom1 = memory.tom1;
            }
            if self.order >= ToMOrder::Two {
                self.mind.tom2 = memory.tom2;
            }
        }
    }

    /// Release from a finished negotiation with `partner`.
    pub fn conclude_negotiation(
        &mut self,
        partner: AgentId,
        ending: NegotiationEnding,
        variant: ExperimentVariant,
    ) {
        self.activity = Activity::Moving;
        if self.reduction_pending {
            self.reduction_pending = false;
            self.resources.consume_one_each();
        }
        if variant == ExperimentVariant::UseExperience {
            self.partner_memory.insert(
                partner,
                PartnerMemory {
                    tom1: self.mind.tom1,
                    tom2: self.mind.tom2,
                },
            );
            self.mind.reset_opponent_models(self.order);
            self.unsuccessful.retain(|id| *id != partner);
            if !ending.is_accepted() {
                if self.unsuccessful.len() >= UNSUCCESSFUL_MEMORY {
                    self.unsuccessful.pop_front();
                }
                self.unsuccessful.push_back(partner);
            }
        }
    }

    pub(crate) fn begin_negotiation(&mut self) {
        self.mind.begin_negotiation(self.order);
    }

    pub(crate) fn record_offer(&mut self, offer: &Offer, accepted: bool) {
        self.mind.stats.record(offer, accepted);
    }

    /// Execute `offer` as its proposer. Returns the score change, or `None`
    /// (leaving resources untouched) if the trade is impossible.
    pub(crate) fn execute(&mut self, offer: &Offer) -> Option<i32> {
        let before = crate::score::score(&self.resources, self.producing);
        let next = self.resources.after(offer)?;
        self.resources = next;
        Some(crate::score::score(&next, self.producing).saturating_sub(before))
    }

    // -- reasoning -------------------------------------------------------------

    /// Opening offer from `seat`.
    pub fn opening_offer<R: Rng + ?Sized>(
        &self,
        scratch: &mut Scratch,
        table: Table,
        seat: Seat,
        config: &NegotiationConfig,
        rng: &mut R,
    ) -> Option<Offer> {
        Reasoner::new(&self.mind, table, config, rng).opening_offer(scratch, seat, self.producing, self.order)
    }

    /// Response to the offer on the table.
    pub fn decide<R: Rng + ?Sized>(
        &self,
        scratch: &mut Scratch,
        table: Table,
        seat: Seat,
        on_table: &Offer,
        config: &NegotiationConfig,
        rng: &mut R,
    ) -> TurnChoice {
        Reasoner::new(&self.mind, table, config, rng).decide(scratch, seat, on_table, self.producing, self.order)
    }

    /// Fold an observed offer into `b0` or `b1`. `own` and `other` are the
    /// resources of the party whose alternatives are enumerated and of its
    /// counterpart.
    #[allow(clippy::too_many_arguments)]
    pub fn absorb(
        &mut self,
        layer: BeliefLayer,
        evidence: Evidence,
        observed: &Offer,
        own: &Resources,
        other: &Resources,
        config: &NegotiationConfig,
    ) {
        let Mind { prior, b0, b1, .. } = &mut self.mind;
        let beliefs = match layer {
            BeliefLayer::Own => b0,
            BeliefLayer::Partner => b1,
        };
        beliefs.absorb(evidence, observed, own, other, prior, config.learning_speed);
    }

    /// Update the producing-kind guess at `level` (One for `p1`, Two for `p2`)
    /// after the agent in `holder` proposed `proposed`.
    pub fn revise_producer_belief<R: Rng + ?Sized>(
        &mut self,
        level: ToMOrder,
        proposed: &Offer,
        holder: Seat,
        table: Table,
        config: &NegotiationConfig,
        rng: &mut R,
    ) {
        let current = self.model(level).producer;
        let revised = Reasoner::new(&self.mind, table, config, rng).revise_producer_belief(
            proposed,
            holder,
            level,
            current,
            self.revision_beliefs(level),
        );
        if let Some(model) = self.model_mut(level) {
            model.producer = revised;
        }
    }

    /// Update the confidence at `level` (One for `c1`, Two for `c2`) after
    /// the agent in `proposer` proposed `proposed`.
    pub fn revise_confidence<R: Rng + ?Sized>(
        &mut self,
        level: ToMOrder,
        proposed: &Offer,
        proposer: Seat,
        table: Table,
        config: &NegotiationConfig,
        rng: &mut R,
    ) {
        let model = self.model(level);
        let revised = Reasoner::new(&self.mind, table, config, rng).revise_confidence(
            proposed,
            proposer,
            level,
            model,
            self.revision_beliefs(level),
        );
        if let Some(model) = self.model_mut(level) {
            model.confidence = revised;
        }
    }

    const fn model(&self, level: ToMOrder) -> OpponentModel {
        match level {
            ToMOrder::Two => self.mind.tom2,
            ToMOrder::Zero | ToMOrder::One => self.mind.tom1,
        }
    }

    fn model_mut(&mut self, level: ToMOrder) -> Option<&mut OpponentModel> {
        match level {
            ToMOrder::Zero => None,
            ToMOrder::One => Some(&mut self.mind.tom1),
            ToMOrder::Two => Some(&mut self.mind.tom2),
        }
    }

    /// `b1` backs the ToM1 model, `b0` (doubling as `b2`) the ToM2 model.
    const fn revision_beliefs(&self, level: ToMOrder) -> &OfferBeliefs {
        match level {
            ToMOrder::Two => &self.mind.b0,
            ToMOrder::Zero | ToMOrder::One => &self.mind.b1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(id: u64, order: ToMOrder) -> AgentSpawn {
        AgentSpawn {
            id: AgentId(id),
            order,
            producing: 1,
            position: Position::new(10.0, 10.0),
            heading: 90.0,
            age: 100,
        }
    }

    #[test]
    fn new_agent_starts_with_canonical_resources() {
        let agent = Agent::new(spawn(1, ToMOrder::Zero));
        assert_eq!(agent.resources().quantities(), [1, 4, 1, 1]);
        assert!(!agent.is_negotiating());
        assert_eq!(agent.previous_partner(), None);
    }

    #[test]
    fn reduction_is_deferred_while_negotiating() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Zero));
        agent.join_negotiation(NegotiationId(1), AgentId(2), false);
        agent.reduce_resources();
        assert!(agent.reduction_pending());
        assert_eq!(agent.resources().quantities(), [1, 4, 1, 1]);

        agent.conclude_negotiation(AgentId(2), NegotiationEnding::TooLong, ExperimentVariant::Standard);
        assert!(!agent.reduction_pending());
        assert_eq!(agent.resources().quantities(), [0, 3, 0, 0]);
    }

    #[test]
    fn saturated_agent_resets_to_initial_vector() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Zero));
        agent.resources = Resources::new([4, 4, 4, 4]).unwrap_or_default();
        assert!(agent.reset_if_saturated());
        assert_eq!(agent.resources().quantities(), [1, 4, 1, 1]);

        agent.resources = Resources::new([4, 4, 4, 3]).unwrap_or_default();
        assert!(!agent.reset_if_saturated());
    }

    #[test]
    fn dying_agents_stop_ageing() {
        let mut agent = Agent::new(spawn(1, ToMOrder::One));
        agent.grow_older();
        assert_eq!(agent.age(), 101);
        agent.mark_dying();
        agent.grow_older();
        assert_eq!(agent.age(), 101);
    }

    #[test]
    fn experience_variant_remembers_partner_models() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Two));
        agent.join_negotiation(NegotiationId(3), AgentId(9), true);
        agent.mind.tom1.confidence = 0.4;
        agent.mind.tom2.confidence = 0.6;
        agent.conclude_negotiation(
            AgentId(9),
            NegotiationEnding::Withdrawn { by: Seat::First },
            ExperimentVariant::UseExperience,
        );

        assert!((agent.mind().tom1.confidence - 1.0).abs() < f64::EPSILON);
        assert!(agent.recently_failed_with(AgentId(9), 5));

        agent.join_negotiation(NegotiationId(4), AgentId(9), true);
        assert!((agent.mind().tom1.confidence - 0.4).abs() < f64::EPSILON);
        assert!((agent.mind().tom2.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn successful_trade_clears_unsuccessful_entry() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Zero));
        let failed = NegotiationEnding::TooLong;
        let accepted = NegotiationEnding::Accepted { by: Seat::Second };
        agent.conclude_negotiation(AgentId(5), failed, ExperimentVariant::UseExperience);
        assert!(agent.recently_failed_with(AgentId(5), 5));
        agent.conclude_negotiation(AgentId(5), accepted, ExperimentVariant::UseExperience);
        assert!(!agent.recently_failed_with(AgentId(5), 5));
    }

    #[test]
    fn unsuccessful_window_only_covers_recent_partners() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Zero));
        for partner in 10..17 {
            agent.conclude_negotiation(AgentId(partner), NegotiationEnding::TooLong, ExperimentVariant::UseExperience);
        }
        assert!(!agent.recently_failed_with(AgentId(11), 5));
        assert!(agent.recently_failed_with(AgentId(12), 5));
        assert!(agent.recently_failed_with(AgentId(16), 5));
    }

    #[test]
    fn unsuccessful_memory_stays_bounded() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Zero));
        for partner in 0..100 {
            agent.conclude_negotiation(AgentId(partner), NegotiationEnding::TooLong, ExperimentVariant::UseExperience);
        }
        assert_eq!(agent.unsuccessful.len(), UNSUCCESSFUL_MEMORY);
        assert!(agent.recently_failed_with(AgentId(99), UNSUCCESSFUL_MEMORY));
        assert!(!agent.recently_failed_with(AgentId(0), 100));
    }

    #[test]
    fn standard_variant_keeps_no_partner_memory() {
        let mut agent = Agent::new(spawn(1, ToMOrder::One));
        agent.conclude_negotiation(AgentId(5), NegotiationEnding::TooLong, ExperimentVariant::Standard);
        assert!(agent.partner_memory(AgentId(5)).is_none());
        assert!(!agent.recently_failed_with(AgentId(5), 5));
    }

    #[test]
    fn prepare_for_tops_up_and_remembers_partner() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Zero));
        agent.resources = Resources::new([2, 1, 2, 2]).unwrap_or_default();
        agent.prepare_for(AgentId(8));
        assert_eq!(agent.resources().get(1), 4);
        assert_eq!(agent.previous_partner(), Some(AgentId(8)));
    }

    #[test]
    fn execute_reports_score_change() {
        let mut agent = Agent::new(spawn(1, ToMOrder::Zero));
        // Producing kind 1: [1, 4, 1, 1] scores 6.
        let gain = agent.execute(&Offer::new([0, 2, 0, 0], [1, 0, 1, 1]));
        assert_eq!(gain, Some(6));
        assert_eq!(agent.resources().quantities(), [2, 2, 2, 2]);
        assert_eq!(agent.execute(&Offer::new([3, 0, 0, 0], [0; 4])), None);
    }
}
