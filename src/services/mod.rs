pub mod collector;
pub mod scheduler;

pub use collector::MeasurementCollector;
pub use scheduler::{CycleReport, Scheduler, SchedulerHandle, SchedulerState};
