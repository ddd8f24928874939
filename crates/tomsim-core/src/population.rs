//! The live population and its negotiations.
//!
//! Agents are kept sorted by `(order, id)`, which is the scan order used for
//! collision classification and for the per-tick step roster: all ToM0
//! agents first, then ToM1, then ToM2, each in creation order.
//!
//! Live negotiations are owned here too. A negotiation borrows both of its
//! seated agents mutably for one round at a time.

use std::collections::BTreeMap;

use rand::Rng;
use tomsim_agents::{
    Agent, AgentError, Negotiation, NegotiationConfig, NegotiationReport, RoundOutcome,
};
use tomsim_types::{AgentId, AgentView, ExperimentVariant, NegotiationId, PopulationCounts, ToMOrder};

/// Every live agent plus the negotiations between them.
#[derive(Debug, Clone, Default)]
pub struct Population {
    agents: Vec<Agent>,
    negotiations: BTreeMap<NegotiationId, Negotiation>,
    next_agent: AgentId,
    next_negotiation: NegotiationId,
}

impl Population {
    /// Empty population.
    pub fn new() -> Self {
        Self::default()
    }

    /// Agents in scan order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Agents in scan order, mutably. Orders and ids cannot change through
    /// an agent's public API, so scan order is preserved.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.iter_mut()
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether nobody is alive.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Live agents per order.
    pub fn counts(&self) -> PopulationCounts {
        let mut counts = PopulationCounts::default();
        for agent in &self.agents {
            counts.increment(agent.order());
        }
        counts
    }

    /// Look up an agent.
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.id() == id)
    }

    /// Look up an agent mutably.
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|agent| agent.id() == id)
    }

    /// Snapshot of every agent id, in scan order.
    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(Agent::id).collect()
    }

    /// Read-only views, optionally restricted to one order.
    pub fn views(&self, order: Option<ToMOrder>) -> Vec<AgentView> {
        self.agents
            .iter()
            .filter(|agent| order.is_none_or(|order| agent.order() == order))
            .map(Agent::view)
            .collect()
    }

    /// Reserve the next agent id. Ids are never reused.
    pub fn next_agent_id(&mut self) -> AgentId {
        let id = self.next_agent;
        self.next_agent = id.next();
        id
    }

    /// Add an agent at its place in scan order.
    pub fn insert(&mut self, agent: Agent) {
        let key = (agent.order(), agent.id());
        let at = self.agents.partition_point(|other| (other.order(), other.id()) < key);
        self.agents.insert(at, agent);
    }

    /// Remove an agent. Agents still seated at a negotiation must be released
    /// first.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let at = self.agents.iter().position(|agent| agent.id() == id)?;
        Some(self.agents.remove(at))
    }

    /// Remove every agent and negotiation, returning the agents. Id counters
    /// keep running.
    pub fn drain(&mut self) -> Vec<Agent> {
        self.negotiations.clear();
        std::mem::take(&mut self.agents)
    }

    /// Number of negotiations in progress.
    pub fn negotiation_count(&self) -> usize {
        self.negotiations.len()
    }

    /// Look up a live negotiation.
    pub fn negotiation(&self, id: NegotiationId) -> Option<&Negotiation> {
        self.negotiations.get(&id)
    }

    /// Seat `first` and `second` at a new negotiation.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::AgentNotFound`] if either agent is missing, or
    /// [`AgentError::SelfNegotiation`] if both ids are the same.
    pub fn open_negotiation(
        &mut self,
        first: AgentId,
        second: AgentId,
        recall: bool,
    ) -> Result<NegotiationId, AgentError> {
        if first == second {
            return Err(AgentError::SelfNegotiation(first));
        }
        let id = self.next_negotiation;
        let (first_agent, second_agent) = pair_mut(&mut self.agents, first, second)?;
        let negotiation = Negotiation::open(id, first_agent, second_agent, recall)?;
        self.next_negotiation = id.next();
        self.negotiations.insert(id, negotiation);
        Ok(id)
    }

    /// Play one round of negotiation `id`. When it finishes, both agents are
    /// released and the report is returned.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::AgentNotFound`] if a seated agent is missing.
    pub fn advance_negotiation<R: Rng + ?Sized>(
        &mut self,
        id: NegotiationId,
        config: &NegotiationConfig,
        variant: ExperimentVariant,
        rng: &mut R,
    ) -> Result<Option<NegotiationReport>, AgentError> {
        let Some(negotiation) = self.negotiations.get_mut(&id) else {
            return Ok(None);
        };
        let [first_id, second_id] = negotiation.seats();
        let (first, second) = pair_mut(&mut self.agents, first_id, second_id)?;

        match negotiation.play_round(first, second, config, rng)? {
            RoundOutcome::Continue => Ok(None),
            RoundOutcome::Finished(report) => {
                report.release(first, second, variant);
                self.negotiations.remove(&id);
                tracing::debug!(
                    negotiation = %id,
                    first = %first_id,
                    second = %second_id,
                    rounds = report.rounds,
                    ending = report.ending.code(),
                    "negotiation finished"
                );
                Ok(Some(report))
            }
        }
    }
}

/// Borrow two distinct agents mutably, in the order asked.
fn pair_mut(
    agents: &mut [Agent],
    a: AgentId,
    b: AgentId,
) -> Result<(&mut Agent, &mut Agent), AgentError> {
    let find = |agents: &[Agent], id: AgentId| {
        agents
            .iter()
            .position(|agent| agent.id() == id)
            .ok_or(AgentError::AgentNotFound(id))
    };
    let at_a = find(agents, a)?;
    let at_b = find(agents, b)?;
    if at_a == at_b {
        return Err(AgentError::SelfNegotiation(a));
    }

    let (low, high) = (at_a.min(at_b), at_a.max(at_b));
    let (left, right) = agents.split_at_mut(high);
    let low_agent = left.get_mut(low).ok_or(AgentError::AgentNotFound(a))?;
    let high_agent = right.first_mut().ok_or(AgentError::AgentNotFound(b))?;
    if at_a < at_b {
        Ok((low_agent, high_agent))
    } else {
        Ok((high_agent, low_agent))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tomsim_agents::AgentSpawn;
    use tomsim_types::Position;

    use super::*;

    fn spawn(population: &mut Population, order: ToMOrder, producing: usize) -> AgentId {
        let id = population.next_agent_id();
        population.insert(Agent::new(AgentSpawn {
            id,
            order,
            producing,
            position: Position::new(50.0, 50.0),
            heading: 0.0,
            age: 0,
        }));
        id
    }

    #[test]
    fn scan_order_groups_by_order_then_id() {
        let mut population = Population::new();
        let a = spawn(&mut population, ToMOrder::Two, 0);
        let b = spawn(&mut population, ToMOrder::Zero, 1);
        let c = spawn(&mut population, ToMOrder::One, 2);
        let d = spawn(&mut population, ToMOrder::Zero, 3);
        assert_eq!(population.ids(), vec![b, d, c, a]);

        let counts = population.counts();
        assert_eq!(counts.get(ToMOrder::Zero), 2);
        assert_eq!(counts.get(ToMOrder::One), 1);
        assert_eq!(counts.get(ToMOrder::Two), 1);
        assert_eq!(population.views(Some(ToMOrder::Zero)).len(), 2);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut population = Population::new();
        let a = spawn(&mut population, ToMOrder::Zero, 0);
        assert!(population.remove(a).is_some());
        let _ = population.drain();
        let b = spawn(&mut population, ToMOrder::Zero, 0);
        assert!(b > a);
    }

    #[test]
    fn negotiation_runs_to_completion_and_releases_agents() {
        let mut population = Population::new();
        let a = spawn(&mut population, ToMOrder::Zero, 0);
        let b = spawn(&mut population, ToMOrder::Zero, 1);
        let mut rng = StdRng::seed_from_u64(11);
        let config = NegotiationConfig::default();

        let id = population.open_negotiation(a, b, false);
        assert!(id.is_ok());
        let Ok(id) = id else { return };
        assert_eq!(population.negotiation_count(), 1);
        assert!(population.get(a).is_some_and(Agent::is_negotiating));

        let mut report = None;
        for _ in 0..config.max_rounds {
            let step = population.advance_negotiation(id, &config, ExperimentVariant::Standard, &mut rng);
            assert!(step.is_ok());
            if let Ok(Some(done)) = step {
                report = Some(done);
                break;
            }
        }

        let report = report;
        assert!(report.is_some_and(|report| report.rounds <= config.max_rounds));
        assert_eq!(population.negotiation_count(), 0);
        assert!(population.get(a).is_some_and(|agent| !agent.is_negotiating()));
        assert!(population.get(b).is_some_and(|agent| !agent.is_negotiating()));
    }

    #[test]
    fn opening_with_missing_or_same_agent_fails() {
        let mut population = Population::new();
        let a = spawn(&mut population, ToMOrder::Zero, 0);
        assert!(matches!(
            population.open_negotiation(a, a, false),
            Err(AgentError::SelfNegotiation(_))
        ));
        assert!(matches!(
            population.open_negotiation(a, AgentId(99), false),
            Err(AgentError::AgentNotFound(AgentId(99)))
        ));
    }
}
