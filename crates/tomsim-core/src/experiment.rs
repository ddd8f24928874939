//! The two-phase experiment: initialization, scoring, and evolution.
//!
//! A run starts [`NotInitialized`]: agents wander and trade, but no phase
//! rules apply. [`Simulation::begin_experiment`] moves it to
//! [`Initializing`], where a ToM0-only population builds baseline beliefs.
//! After `initialization_ticks` the scored phase replaces it with equal
//! numbers of each order, each seeded with the beliefs of a random
//! initialization agent. The scored phase applies survival checks and
//! replacement until its tick budget runs out, ToM0 dies out, or at most
//! one order is left.
//!
//! [`NotInitialized`]: ExperimentPhase::NotInitialized
//! [`Initializing`]: ExperimentPhase::Initializing

use tomsim_agents::{Agent, CheckOutcome, choose_parentage, pick_donor, survival};
use tomsim_types::{ExperimentPhase, PopulationCounts, ToMOrder};
use tracing::{debug, error, info, warn};

use crate::export;
use crate::stats::Statistics;
use crate::tick::{Evolution, Simulation, TickError, Transition};

impl Simulation {
    /// Start the initialization phase. Only acts from
    /// [`ExperimentPhase::NotInitialized`]; returns whether the phase
    /// changed.
    pub fn begin_experiment(&mut self) -> bool {
        if self.phase != ExperimentPhase::NotInitialized {
            return false;
        }
        self.phase = ExperimentPhase::Initializing;
        info!(tick = self.tick, agents = self.population.len(), "initialization phase started");
        true
    }

    // -----------------------------------------------------------------------
    // Scored-phase evolution
    // -----------------------------------------------------------------------

    /// Remove dead and starving agents, then create one replacement per
    /// removal.
    pub(crate) fn evolve(&mut self) -> Result<Evolution, TickError> {
        let check_interval = self.config.experiment.check_interval;
        let mut outcome = Evolution::default();

        for id in self.population.ids() {
            let Some(agent) = self.population.get_mut(id) else {
                continue;
            };
            let dead = if agent.is_dying() && !agent.is_negotiating() {
                true
            } else {
                survival::check(agent, check_interval) == CheckOutcome::Dead
            };
            if !dead {
                continue;
            }
            if let Some(agent) = self.population.remove(id) {
                debug!(agent = %id, order = %agent.order(), age = agent.age(), "agent died");
                self.stats.record_age(agent.order(), agent.age());
                outcome.deaths = outcome.deaths.saturating_add(1);
            }
        }

        for _ in 0..outcome.deaths {
            if self.population.is_empty() {
                warn!(tick = self.tick, "population empty; replacement halted");
                outcome.halted = true;
                break;
            }
            self.spawn_replacement()?;
            outcome.births = outcome.births.saturating_add(1);
        }
        Ok(outcome)
    }

    /// Create one agent whose order and beliefs come from a random donor,
    /// with a small chance of a mutated order.
    fn spawn_replacement(&mut self) -> Result<(), TickError> {
        // The order in the spawn is replaced by the parentage's.
        let spawn = self.draw_spawn(ToMOrder::Zero, 0);
        let child = {
            let parentage = choose_parentage(
                self.population.agents(),
                self.config.experiment.mutation_percent,
                &mut self.rng,
            )?;
            parentage.bear(spawn)
        };
        debug!(agent = %child.id(), order = %child.order(), "agent born");
        self.population.insert(child);
        Ok(())
    }

    /// Reset every agent holding the maximum of all kinds.
    pub(crate) fn reset_saturated(&mut self) {
        for agent in self.population.iter_mut() {
            if agent.reset_if_saturated() {
                debug!(agent = %agent.id(), "saturated agent reset");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase transitions
    // -----------------------------------------------------------------------

    /// Apply the phase transition due after the current tick, if any.
    pub(crate) fn transition(&mut self) -> Result<Option<Transition>, TickError> {
        let experiment = &self.config.experiment;
        match self.phase {
            ExperimentPhase::Initializing if self.tick >= experiment.initialization_ticks => {
                self.enter_scored_phase()?;
                Ok(Some(Transition {
                    phase: ExperimentPhase::Experimenting,
                    pause: self.config.runner.pause_at_phase_change,
                }))
            }
            ExperimentPhase::Experimenting
                if self.tick >= experiment.scored_ticks || contest_decided(self.counts()) =>
            {
                self.finish();
                Ok(Some(Transition {
                    phase: ExperimentPhase::Finished,
                    pause: true,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Replace the initialization population with `agents_per_order` agents
    /// of each order and reset the tick counter and statistics.
    fn enter_scored_phase(&mut self) -> Result<(), TickError> {
        let donors = self.population.drain();
        self.phase = ExperimentPhase::Experimenting;
        self.tick = 0;
        self.stats = Statistics::new();

        for _ in 0..self.config.experiment.agents_per_order {
            for order in ToMOrder::ALL {
                let age = self.random_age();
                let spawn = self.draw_spawn(order, age);
                let donor = pick_donor(&donors, &mut self.rng)?;
                self.population.insert(Agent::descendant_of(spawn, donor));
            }
        }
        self.stats.record_counts(self.population.counts());
        info!(
            agents = self.population.len(),
            donors = donors.len(),
            "scored phase started"
        );
        Ok(())
    }

    /// Close the scored phase: record the final counts and the ages of the
    /// survivors, then export. Export failures are logged, not returned.
    fn finish(&mut self) {
        let counts = self.counts();
        info!(
            tick = self.tick,
            tom0 = counts.tom0,
            tom1 = counts.tom1,
            tom2 = counts.tom2,
            "experiment finished"
        );
        self.stats.record_counts(counts);
        for agent in self.population.agents() {
            self.stats.record_age(agent.order(), agent.age());
        }
        match export::export(&self.stats, self.tick, &self.config.export) {
            Ok(path) => self.last_export = Some(path),
            Err(err) => error!(error = %err, "export failed"),
        }
        self.phase = ExperimentPhase::Finished;
    }
}

/// The scored phase is decided once ToM0 is extinct or at most one order
/// survives.
fn contest_decided(counts: PopulationCounts) -> bool {
    counts.tom0 == 0 || counts.surviving_orders() <= 1
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tomsim_types::PopulationCounts;

    use super::*;
    use crate::tick::small_config;

    fn export_to_temp(config: &mut crate::config::SimulationConfig, name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("tomsim-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        config.export.directory = dir.clone();
        dir
    }

    #[test]
    fn begin_experiment_only_from_not_initialized() {
        let mut simulation = Simulation::new(small_config(1));
        assert!(simulation.begin_experiment());
        assert_eq!(simulation.phase(), ExperimentPhase::Initializing);
        assert!(!simulation.begin_experiment());
    }

    #[test]
    fn initialization_hands_over_to_mixed_population() {
        let mut simulation = Simulation::new(small_config(2));
        simulation.begin_experiment();
        let first_ids = simulation.population().ids();

        let mut change = None;
        for _ in 0..40 {
            let summary = simulation.run_tick().unwrap();
            if summary.phase_change.is_some() {
                change = Some(summary);
                break;
            }
        }
        let summary = change.unwrap();
        assert_eq!(summary.phase_change, Some(ExperimentPhase::Experimenting));
        assert!(summary.pause_requested);
        assert_eq!(simulation.tick(), 0);
        assert_eq!(
            simulation.counts(),
            PopulationCounts { tom0: 4, tom1: 4, tom2: 4 }
        );
        assert_eq!(simulation.stats().history().len(), 1);
        let new_ids = simulation.population().ids();
        assert!(new_ids.iter().all(|id| !first_ids.contains(id)));
        assert!(new_ids.iter().min() > first_ids.iter().max());
    }

    #[test]
    fn headless_transition_does_not_pause() {
        let mut config = small_config(3);
        config.runner.pause_at_phase_change = false;
        let mut simulation = Simulation::new(config);
        simulation.begin_experiment();
        let summary = (0..40)
            .map(|_| simulation.run_tick().unwrap())
            .find(|summary| summary.phase_change.is_some())
            .unwrap();
        assert!(!summary.pause_requested);
    }

    #[test]
    fn evolution_keeps_population_size() {
        let mut config = small_config(4);
        config.experiment.initialization_ticks = 5;
        config.experiment.scored_ticks = 10_000;
        config.experiment.check_interval = 5;
        let dir = export_to_temp(&mut config, "evolve");
        let mut simulation = Simulation::new(config);
        simulation.begin_experiment();
        while simulation.phase() != ExperimentPhase::Experimenting {
            simulation.run_tick().unwrap();
        }

        let mut deaths = 0_u32;
        for _ in 0..200 {
            let before = simulation.population().len();
            let summary = simulation.run_tick().unwrap();
            if summary.phase != ExperimentPhase::Experimenting {
                break;
            }
            deaths = deaths.saturating_add(summary.deaths);
            assert_eq!(summary.births, summary.deaths);
            assert_eq!(simulation.population().len(), before);
        }
        assert!(deaths > 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn one_order_left_finishes_and_exports() {
        let mut config = small_config(5);
        config.experiment.initialization_ticks = 1;
        config.experiment.mutation_percent = 0;
        let dir = export_to_temp(&mut config, "finish");
        let mut simulation = Simulation::new(config);
        simulation.begin_experiment();
        simulation.run_tick().unwrap();
        assert_eq!(simulation.phase(), ExperimentPhase::Experimenting);

        let doomed: Vec<_> = simulation
            .population()
            .agents()
            .iter()
            .filter(|agent| agent.order() != ToMOrder::Two)
            .map(Agent::id)
            .collect();
        for id in doomed {
            let _ = simulation.population.remove(id);
        }
        let rows_before = simulation.stats().history().len();

        let summary = simulation.run_tick().unwrap();
        assert_eq!(summary.phase_change, Some(ExperimentPhase::Finished));
        assert!(summary.pause_requested);
        assert_eq!(simulation.phase(), ExperimentPhase::Finished);
        // The tick's own row plus the closing row.
        assert_eq!(simulation.stats().history().len(), rows_before.saturating_add(2));
        let ages: usize = simulation.stats().ages().iter().map(Vec::len).sum();
        assert!(ages >= simulation.population().len());

        let path = simulation.last_export().unwrap().to_path_buf();
        assert!(path.ends_with("result_0.csv"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("ToM0, ToM1, ToM2"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tom0_extinction_finishes_the_experiment() {
        let mut config = small_config(8);
        config.experiment.initialization_ticks = 1;
        config.experiment.mutation_percent = 0;
        let dir = export_to_temp(&mut config, "tom0-extinct");
        let mut simulation = Simulation::new(config);
        simulation.begin_experiment();
        simulation.run_tick().unwrap();
        assert_eq!(simulation.phase(), ExperimentPhase::Experimenting);

        let tom0: Vec<_> = simulation
            .population()
            .agents()
            .iter()
            .filter(|agent| agent.order() == ToMOrder::Zero)
            .map(Agent::id)
            .collect();
        for id in tom0 {
            let _ = simulation.population.remove(id);
        }
        assert_eq!(simulation.counts().surviving_orders(), 2);

        let summary = simulation.run_tick().unwrap();
        assert_eq!(summary.phase_change, Some(ExperimentPhase::Finished));
        assert_eq!(simulation.phase(), ExperimentPhase::Finished);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn decided_when_tom0_is_gone_or_one_order_left() {
        let mixed = PopulationCounts { tom0: 3, tom1: 2, tom2: 1 };
        let no_tom2 = PopulationCounts { tom0: 3, tom1: 2, tom2: 0 };
        let no_tom0 = PopulationCounts { tom0: 0, tom1: 4, tom2: 4 };
        let only_tom0 = PopulationCounts { tom0: 5, tom1: 0, tom2: 0 };
        assert!(!contest_decided(mixed));
        assert!(!contest_decided(no_tom2));
        assert!(contest_decided(no_tom0));
        assert!(contest_decided(only_tom0));
        assert!(contest_decided(PopulationCounts::default()));
    }

    #[test]
    fn scored_budget_finishes_the_experiment() {
        let mut config = small_config(6);
        config.experiment.initialization_ticks = 2;
        config.experiment.scored_ticks = 3;
        config.experiment.check_interval = 10_000;
        let dir = export_to_temp(&mut config, "budget");
        let mut simulation = Simulation::new(config);
        simulation.begin_experiment();
        for _ in 0..10 {
            simulation.run_tick().unwrap();
            if simulation.phase() == ExperimentPhase::Finished {
                break;
            }
        }
        assert_eq!(simulation.phase(), ExperimentPhase::Finished);
        assert_eq!(simulation.tick(), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_phase_rules_before_the_experiment() {
        let mut config = small_config(7);
        config.experiment.initialization_ticks = 1;
        let mut simulation = Simulation::new(config);
        for _ in 0..5 {
            let summary = simulation.run_tick().unwrap();
            assert!(summary.phase_change.is_none());
            assert_eq!(summary.deaths, 0);
        }
        assert_eq!(simulation.phase(), ExperimentPhase::NotInitialized);
    }
}
