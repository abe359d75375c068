/// Runtime layer
///
/// This module owns everything that runs on behalf of live workflows:
/// - The admission gate bounding concurrent trigger registration
/// - The trigger scheduler running cron jobs and pollers with tokio-cron-scheduler

// Bounded-concurrency admission gate
pub mod gate;

// Background trigger and poller scheduler
pub mod scheduler;

// Re-export main types
pub use gate::{AdmissionGate, AdmissionPermit, AdmissionWithdrawn};
pub use scheduler::{TriggerFired, TriggerScheduler, TriggerSource};
