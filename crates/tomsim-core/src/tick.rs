//! The simulation state and its per-tick cycle.
//!
//! Each tick runs these steps in order:
//!
//! 1. **Step** -- every live agent, in scan order, either advances its
//!    negotiation by one round or takes one step across the arena (which
//!    may open a negotiation instead).
//! 2. **Record** -- append the population counts to the history and credit
//!    the dominant orders.
//! 3. **Age** -- advance the tick counter and age every agent not marked
//!    dying.
//! 4. **Evolve** -- in the scored phase, run survival checks and replace
//!    the dead.
//! 5. **Reset** -- in the initialization phase, reset agents holding the
//!    maximum of every kind.
//! 6. **Transition** -- start the scored phase or finish the experiment
//!    when its conditions are met.
//!
//! The cycle is deterministic for a given seed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tomsim_agents::{Agent, AgentError, AgentSpawn};
use tomsim_types::{
    AgentId, AgentView, ExperimentPhase, ExperimentVariant, PopulationCounts, Position, RunId,
    RunState, StatusView, ToMOrder,
};
use tracing::debug;

use crate::arena::{Arena, Encounter};
use crate::config::SimulationConfig;
use crate::population::Population;
use crate::stats::Statistics;

/// Number of resource kinds an agent may produce.
const PRODUCING_KINDS: usize = tomsim_types::RESOURCE_KINDS;

/// Ticks between progress log lines.
const PROGRESS_EVERY: u64 = 500;

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// An agent-level operation failed.
    #[error("agent error: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: AgentError,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick counter after this tick.
    pub tick: u64,
    /// Phase after this tick.
    pub phase: ExperimentPhase,
    /// Live agents per order at the end of the tick.
    pub counts: PopulationCounts,
    /// Negotiations opened this tick.
    pub negotiations_opened: u32,
    /// Negotiations that ended this tick.
    pub negotiations_finished: u32,
    /// Agents removed by survival checks.
    pub deaths: u32,
    /// Replacement agents created.
    pub births: u32,
    /// New phase, if the phase changed during this tick.
    pub phase_change: Option<ExperimentPhase>,
    /// Whether the run loop should pause after this tick.
    pub pause_requested: bool,
    /// Whether replacement stopped because nobody was left to inherit from.
    pub halted: bool,
}

/// Outcome of the evolution step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Evolution {
    pub(crate) deaths: u32,
    pub(crate) births: u32,
    pub(crate) halted: bool,
}

/// Outcome of a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) phase: ExperimentPhase,
    pub(crate) pause: bool,
}

#[derive(Debug, Default)]
struct StepCounters {
    opened: u32,
    finished: u32,
}

/// The complete, single-owner state of one run.
#[derive(Debug)]
pub struct Simulation {
    pub(crate) config: SimulationConfig,
    pub(crate) arena: Arena,
    pub(crate) run_id: RunId,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) phase: ExperimentPhase,
    pub(crate) tick: u64,
    pub(crate) population: Population,
    pub(crate) stats: Statistics,
    pub(crate) rng: StdRng,
    pub(crate) last_export: Option<PathBuf>,
}

impl Simulation {
    /// Create a run with `experiment.initial_agents` ToM0 agents, in the
    /// [`ExperimentPhase::NotInitialized`] phase.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = config
            .experiment
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let mut simulation = Self {
            arena: Arena::new(&config.arena),
            config,
            run_id: RunId::new(),
            started_at: Utc::now(),
            phase: ExperimentPhase::NotInitialized,
            tick: 0,
            population: Population::new(),
            stats: Statistics::new(),
            rng,
            last_export: None,
        };
        for _ in 0..simulation.config.experiment.initial_agents {
            let age = simulation.random_age();
            let spawn = simulation.draw_spawn(ToMOrder::Zero, age);
            simulation.population.insert(Agent::new(spawn));
        }
        simulation.stats.record_counts(simulation.population.counts());
        tracing::info!(
            run_id = %simulation.run_id,
            agents = simulation.population.len(),
            variant = simulation.config.experiment.variant.code(),
            "simulation created"
        );
        simulation
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Configuration the run was created with.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run identifier.
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Wall-clock creation time.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Ticks elapsed in the current phase.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Experiment phase.
    pub const fn phase(&self) -> ExperimentPhase {
        self.phase
    }

    /// Experiment variant.
    pub const fn variant(&self) -> ExperimentVariant {
        self.config.experiment.variant
    }

    /// The live population.
    pub const fn population(&self) -> &Population {
        &self.population
    }

    /// Statistics of the current phase.
    pub const fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Where the last export was written, if it succeeded.
    pub fn last_export(&self) -> Option<&std::path::Path> {
        self.last_export.as_deref()
    }

    /// Live agents per order.
    pub fn counts(&self) -> PopulationCounts {
        self.population.counts()
    }

    /// Views of live agents, optionally restricted to one order.
    pub fn agent_views(&self, order: Option<ToMOrder>) -> Vec<AgentView> {
        self.population.views(order)
    }

    /// View of one agent.
    pub fn agent_view(&self, id: AgentId) -> Option<AgentView> {
        self.population.get(id).map(Agent::view)
    }

    /// Status snapshot. The run state lives with the operator, so the
    /// caller supplies it.
    pub fn status(&self, run_state: RunState) -> StatusView {
        StatusView {
            run_id: self.run_id,
            tick: self.tick,
            phase: self.phase,
            run_state,
            variant: self.variant(),
            counts: self.counts(),
            negotiations: u32::try_from(self.population.negotiation_count()).unwrap_or(u32::MAX),
            started_at: self.started_at,
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Execute one complete tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] if agent bookkeeping is inconsistent, which
    /// indicates a bug rather than a simulation outcome.
    pub fn run_tick(&mut self) -> Result<TickSummary, TickError> {
        let mut counters = StepCounters::default();
        for id in self.population.ids() {
            self.step_agent(id, &mut counters)?;
        }

        self.stats.record_counts(self.population.counts());
        self.tick = self.tick.saturating_add(1);
        for agent in self.population.iter_mut() {
            agent.grow_older();
        }
        if self.tick.checked_rem(PROGRESS_EVERY) == Some(0) {
            debug!(tick = self.tick, phase = %self.phase, "progress");
        }

        let evolution = if self.phase == ExperimentPhase::Experimenting {
            self.evolve()?
        } else {
            Evolution::default()
        };
        if self.phase == ExperimentPhase::Initializing {
            self.reset_saturated();
        }

        let transition = self.transition()?;
        Ok(TickSummary {
            tick: self.tick,
            phase: self.phase,
            counts: self.population.counts(),
            negotiations_opened: counters.opened,
            negotiations_finished: counters.finished,
            deaths: evolution.deaths,
            births: evolution.births,
            phase_change: transition.map(|t| t.phase),
            pause_requested: evolution.halted || transition.is_some_and(|t| t.pause),
            halted: evolution.halted,
        })
    }

    fn step_agent(&mut self, id: AgentId, counters: &mut StepCounters) -> Result<(), TickError> {
        let Some(agent) = self.population.get(id) else {
            return Ok(());
        };
        if let Some(negotiation) = agent.negotiation() {
            let variant = self.variant();
            let report = self.population.advance_negotiation(
                negotiation,
                &self.config.negotiation,
                variant,
                &mut self.rng,
            )?;
            if let Some(report) = report {
                self.stats.record_negotiation(&report);
                counters.finished = counters.finished.saturating_add(1);
            }
            return Ok(());
        }

        let Some((heading, target)) = self.arena.choose_step(agent.position(), agent.heading(), &mut self.rng)
        else {
            debug!(agent = %id, "no legal heading; staying put");
            return Ok(());
        };
        let avoid = (self.variant() == ExperimentVariant::UseExperience)
            .then_some(self.config.experiment.unsuccessful_window);
        let encounter = self
            .arena
            .classify(agent, &target, self.population.agents(), avoid);

        match encounter {
            Encounter::Clear => {
                if let Some(agent) = self.population.get_mut(id) {
                    agent.turn_to(heading);
                    agent.move_to(target);
                }
            }
            Encounter::Blocked(_) => {
                let heading = Arena::random_heading(&mut self.rng);
                if let Some(agent) = self.population.get_mut(id) {
                    agent.turn_to(heading);
                }
            }
            Encounter::Partner(other) => {
                if let Some(agent) = self.population.get_mut(id) {
                    agent.turn_to(heading);
                }
                let (first, second) = if self.rng.random_bool(0.5) {
                    (other, id)
                } else {
                    (id, other)
                };
                let recall = self.phase == ExperimentPhase::Experimenting
                    && self.variant() == ExperimentVariant::UseExperience;
                self.population.open_negotiation(first, second, recall)?;
                counters.opened = counters.opened.saturating_add(1);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Agent creation
    // -----------------------------------------------------------------------

    /// A random starting age in `[0, check_interval)`.
    pub(crate) fn random_age(&mut self) -> u64 {
        self.rng.random_range(0..self.config.experiment.check_interval.max(1))
    }

    /// Draw the birth parameters of a new agent: a fresh id, a random
    /// producing kind, a clear spot, and a random heading.
    pub(crate) fn draw_spawn(&mut self, order: ToMOrder, age: u64) -> AgentSpawn {
        let id = self.population.next_agent_id();
        let producing = self.rng.random_range(0..PRODUCING_KINDS);
        let occupied: Vec<Position> = self.population.agents().iter().map(Agent::position).collect();
        let position = self.arena.place(&occupied, &mut self.rng);
        let heading = Arena::random_heading(&mut self.rng);
        AgentSpawn {
            id,
            order,
            producing,
            position,
            heading,
            age,
        }
    }
}

/// Small, fast, seeded configuration for unit tests.
#[cfg(test)]
pub(crate) fn small_config(seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.experiment.seed = Some(seed);
    config.experiment.initial_agents = 12;
    config.experiment.agents_per_order = 4;
    config.experiment.initialization_ticks = 40;
    config.experiment.scored_ticks = 60;
    config.experiment.check_interval = 25;
    config.arena.size = 60;
    config
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_simulation_is_tom0_only_with_one_history_row() {
        let simulation = Simulation::new(small_config(1));
        assert_eq!(simulation.phase(), ExperimentPhase::NotInitialized);
        assert_eq!(simulation.counts().tom0, 12);
        assert_eq!(simulation.counts().total(), 12);
        assert_eq!(simulation.stats().history().len(), 1);
        for agent in simulation.population().agents() {
            assert!(agent.age() < 25);
            assert!(agent.position().x >= 0.0 && agent.position().x < 60.0);
        }
    }

    #[test]
    fn tick_advances_counter_and_history() {
        let mut simulation = Simulation::new(small_config(2));
        let summary = simulation.run_tick().unwrap();
        assert_eq!(summary.tick, 1);
        assert_eq!(summary.phase, ExperimentPhase::NotInitialized);
        assert_eq!(simulation.stats().history().len(), 2);
        assert_eq!(summary.counts.total(), 12);
        assert!(summary.phase_change.is_none());
    }

    #[test]
    fn agents_age_each_tick() {
        let mut simulation = Simulation::new(small_config(3));
        let before: Vec<u64> = simulation.population().agents().iter().map(Agent::age).collect();
        simulation.run_tick().unwrap();
        let after: Vec<u64> = simulation.population().agents().iter().map(Agent::age).collect();
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(*new, old.saturating_add(1));
        }
    }

    #[test]
    fn agents_stay_inside_the_arena() {
        let mut simulation = Simulation::new(small_config(4));
        for _ in 0..200 {
            simulation.run_tick().unwrap();
        }
        for agent in simulation.population().agents() {
            let position = agent.position();
            assert!(position.x >= 0.0 && position.x <= 60.0);
            assert!(position.y >= 0.0 && position.y <= 60.0);
        }
    }

    #[test]
    fn crowded_arena_produces_negotiations() {
        let mut config = small_config(5);
        config.arena.size = 30;
        let mut simulation = Simulation::new(config);
        let mut opened = 0_u32;
        let mut finished = 0_u32;
        for _ in 0..300 {
            let summary = simulation.run_tick().unwrap();
            opened = opened.saturating_add(summary.negotiations_opened);
            finished = finished.saturating_add(summary.negotiations_finished);
        }
        assert!(opened > 0);
        assert!(finished > 0);
        assert!(finished <= opened);
    }

    #[test]
    fn same_seed_gives_same_run() {
        let mut a = Simulation::new(small_config(9));
        let mut b = Simulation::new(small_config(9));
        for _ in 0..50 {
            assert_eq!(a.run_tick().unwrap(), b.run_tick().unwrap());
        }
        assert_eq!(a.agent_views(None), b.agent_views(None));
    }

    #[test]
    fn status_reflects_state() {
        let simulation = Simulation::new(small_config(6));
        let status = simulation.status(RunState::Paused);
        assert_eq!(status.run_id, simulation.run_id());
        assert_eq!(status.counts.tom0, 12);
        assert_eq!(status.run_state, RunState::Paused);
        assert_eq!(status.phase, ExperimentPhase::NotInitialized);
    }
}
