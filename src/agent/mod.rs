pub mod types;
pub mod retry;
pub mod calculator;
pub mod executor;
pub mod decision;
pub mod discovery;
pub mod inventory;
pub mod orchestrator;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod mock;

pub use scheduler::Scheduler;
