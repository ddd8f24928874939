//! Error types for the tomsim-agents crate.

use tomsim_types::{AgentId, NegotiationId};

/// Errors that can occur while operating on agents.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A replacement agent was requested but no live agent can donate
    /// its priors.
    #[error("cannot create a descendant: the donor pool is empty")]
    EmptyDonorPool,

    /// An agent referenced by a negotiation or command is not alive.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// A negotiation was asked to seat the same agent twice.
    #[error("agent {0} cannot negotiate with itself")]
    SelfNegotiation(AgentId),

    /// An agent was passed to a negotiation it is not seated at.
    #[error("agent {agent} is not seated at negotiation {negotiation}")]
    NotSeated {
        /// The negotiation.
        negotiation: NegotiationId,
        /// The agent that was passed in.
        agent: AgentId,
    },
}
