//! Replacement agents: inheritance and mutation.
//!
//! A replacement copies the ToM order of a random live donor and inherits
//! its lifetime prior and offer statistics. With probability
//! `mutation_percent / 100` it instead takes a uniformly random order. A
//! mutated agent still inherits from a donor drawn from the whole
//! population, whatever order that donor has.

use rand::Rng;
use tomsim_types::ToMOrder;

use crate::agent::{Agent, AgentSpawn};
use crate::error::AgentError;

/// Percentage scale of the mutation roll.
pub const MUTATION_SCALE: u32 = 100;

/// How a replacement got its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descent {
    /// Same order as the donor.
    Inherited,
    /// Random order.
    Mutated,
}

/// Order and donor chosen for one replacement.
#[derive(Debug, Clone, Copy)]
pub struct Parentage<'a> {
    /// Order the new agent will have.
    pub order: ToMOrder,
    /// Agent whose prior and statistics are copied.
    pub donor: &'a Agent,
    /// Whether the order was inherited or mutated.
    pub descent: Descent,
}

impl Parentage<'_> {
    /// Create the new agent. The order in `spawn` is replaced by
    /// [`Parentage::order`].
    pub fn bear(&self, spawn: AgentSpawn) -> Agent {
        Agent::descendant_of(
            AgentSpawn {
                order: self.order,
                ..spawn
            },
            self.donor,
        )
    }
}

/// Pick a uniformly random donor from `pool`.
pub fn pick_donor<'a, R: Rng + ?Sized>(pool: &'a [Agent], rng: &mut R) -> Result<&'a Agent, AgentError> {
    if pool.is_empty() {
        return Err(AgentError::EmptyDonorPool);
    }
    pool.get(rng.random_range(0..pool.len()))
        .ok_or(AgentError::EmptyDonorPool)
}

/// Decide the order and donor of a replacement drawn from `population`.
pub fn choose_parentage<'a, R: Rng + ?Sized>(
    population: &'a [Agent],
    mutation_percent: u32,
    rng: &mut R,
) -> Result<Parentage<'a>, AgentError> {
    let roll = rng.random_range(0..MUTATION_SCALE);
    if roll >= mutation_percent {
        let donor = pick_donor(population, rng)?;
        return Ok(Parentage {
            order: donor.order(),
            donor,
            descent: Descent::Inherited,
        });
    }

    let order = ToMOrder::from_index(rng.random_range(0..ToMOrder::ALL.len())).unwrap_or(ToMOrder::Zero);
    let donor = pick_donor(population, rng)?;
    tracing::debug!(%order, donor = %donor.id(), donor_order = %donor.order(), "mutated replacement");
    Ok(Parentage {
        order,
        donor,
        descent: Descent::Mutated,
    })
}
