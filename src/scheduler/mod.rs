// * Scheduling: the resilient fixed-interval loop and its recovery policy.

pub mod policy;
pub mod runner;

pub use policy::{FailureTracker, DEFAULT_FAILURE_THRESHOLD};
pub use runner::{AgentCycle, Cycle, CycleError, CycleReport, Scheduler, SchedulerConfig};
