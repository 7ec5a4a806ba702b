//! # Scheduler
//!
//! Runs the scan → decide → migrate cycle on a jittered interval. Owns the
//! engine state and is its only writer. Shutdown is only observed between
//! cycles, so a migration in flight always reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::agent::decision::{SwitchPolicy, evaluate};
use crate::agent::discovery::PoolDiscoveryService;
use crate::agent::orchestrator::LiquidityMigrationOrchestrator;
use crate::agent::types::EngineState;
use crate::onchain_instance::instance::AmmVenue;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub jitter: Duration,
    pub threshold_pct: f64,
    pub policy: SwitchPolicy,
    pub run_once: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            jitter: Duration::from_millis(1_000),
            threshold_pct: 0.5,
            policy: SwitchPolicy::default(),
            run_once: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleOutcome {
    NoCandidate,
    Hold,
    Migrated,
    MigrationFailed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub migrations_attempted: u64,
    pub migrations_succeeded: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

pub struct Scheduler {
    discovery: PoolDiscoveryService,
    orchestrator: LiquidityMigrationOrchestrator,
    venue: Arc<dyn AmmVenue>,
    settings: SchedulerSettings,
    state: EngineState,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(
        discovery: PoolDiscoveryService,
        orchestrator: LiquidityMigrationOrchestrator,
        venue: Arc<dyn AmmVenue>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            discovery,
            orchestrator,
            venue,
            settings,
            state: EngineState::default(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Loops until `shutdown` flips or, in run-once mode, after one cycle. A
    /// closed channel never stops the loop.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Scheduler started: every {:?} (+ up to {:?} jitter), threshold {}%, policy {:?}",
            self.settings.interval, self.settings.jitter, self.settings.threshold_pct, self.settings.policy
        );

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested before next cycle");
                break;
            }

            self.run_cycle().await;
            if self.settings.run_once {
                info!("Run-once mode, exiting after a single cycle");
                break;
            }

            let delay = self.next_delay();
            info!("Next scan in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                Ok(()) = shutdown.changed() => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
            }
        }

        info!(
            "Scheduler stopped after {} cycles ({} of {} migrations succeeded)",
            self.stats.cycles, self.stats.migrations_succeeded, self.stats.migrations_attempted
        );
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let span = info_span!("cycle", id = %Uuid::new_v4());
        let outcome = self.cycle().instrument(span).await;

        self.stats.cycles += 1;
        self.stats.last_outcome = Some(outcome);
        self.stats.last_cycle_at = Some(Utc::now());
        outcome
    }

    async fn cycle(&mut self) -> CycleOutcome {
        let Some(candidate) = self.discovery.find_best_pool().await else {
            info!("No eligible pool this cycle");
            return CycleOutcome::NoCandidate;
        };

        if !evaluate(self.settings.policy, &self.state, &candidate, self.settings.threshold_pct) {
            info!(
                "Holding {:?} at {:.2}%: {} at {:.2}% is not worth a switch",
                self.state.current_pool_id, self.state.current_apy, candidate.pool_id, candidate.apy
            );
            return CycleOutcome::Hold;
        }

        self.stats.migrations_attempted += 1;
        let outcome = self.orchestrator.migrate(&candidate).await;
        self.venue.clear_cache();

        match outcome.new_state {
            Some(state) => {
                info!("Engine now in {:?} at {:.2}% APY", state.current_pool_id, state.current_apy);
                self.state = state;
                self.stats.migrations_succeeded += 1;
                CycleOutcome::Migrated
            }
            None => {
                warn!(
                    "Migration into {} failed, staying on {:?}",
                    candidate.pool_id, self.state.current_pool_id
                );
                CycleOutcome::MigrationFailed
            }
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.settings.jitter.as_millis() as u64;
        self.settings.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}
