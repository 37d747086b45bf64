pub mod bootstrap;
pub mod config;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use scheduler::{ResultObserver, Scheduler, WorkerId, WorkerInfo};
