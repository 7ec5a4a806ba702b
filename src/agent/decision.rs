//! # Switch Decision
//!
//! Decides whether a discovered pool is worth migrating into.

use std::str::FromStr;

use tracing::debug;

use crate::agent::types::{AgentError, EngineState, PoolCandidate};

/// How strictly a new candidate must beat the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchPolicy {
    /// Switch on any pool identity change, or on an APY gain above the
    /// threshold within the same pool.
    #[default]
    IdentityOrImprovement,
    /// Switch only when the APY gain exceeds the threshold, even when the
    /// candidate is a different pool.
    RequireImprovement,
}

impl FromStr for SwitchPolicy {
    type Err = AgentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "identity" | "" => Ok(SwitchPolicy::IdentityOrImprovement),
            "improvement" => Ok(SwitchPolicy::RequireImprovement),
            other => Err(AgentError::Configuration(format!("unknown switch policy '{}'", other))),
        }
    }
}

pub fn should_switch(
    current_pool_id: Option<&str>,
    candidate_pool_id: &str,
    current_apy: f64,
    candidate_apy: f64,
    threshold_pct: f64,
) -> bool {
    match current_pool_id {
        None => true,
        Some(current) if current != candidate_pool_id => true,
        Some(_) => candidate_apy - current_apy > threshold_pct,
    }
}

pub fn evaluate(policy: SwitchPolicy, state: &EngineState, candidate: &PoolCandidate, threshold_pct: f64) -> bool {
    let decision = match policy {
        SwitchPolicy::IdentityOrImprovement => should_switch(
            state.current_pool_id.as_deref(),
            &candidate.pool_id,
            state.current_apy,
            candidate.apy,
            threshold_pct,
        ),
        SwitchPolicy::RequireImprovement => match state.current_pool_id {
            None => true,
            Some(_) => candidate.apy - state.current_apy > threshold_pct,
        },
    };

    debug!(
        "Switch decision {:?}: current {:?} @ {:.2}% vs {} @ {:.2}% -> {}",
        policy, state.current_pool_id, state.current_apy, candidate.pool_id, candidate.apy, decision
    );
    decision
}
