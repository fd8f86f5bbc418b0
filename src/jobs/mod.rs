/// Cron jobs and scheduled tasks module
///
/// Contains the trade plan cache population job, runnable once from the CLI
/// or registered with a cron scheduler.

pub mod population_job;

pub use population_job::{CachePopulationJob, RunStatus, RunSummary};
