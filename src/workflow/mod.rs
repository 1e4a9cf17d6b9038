//! Notification workflow: send-time planning and the job scheduler.

pub mod model;
pub mod plan;
pub mod scheduler;
pub mod service;

pub use model::{JobStatus, Registration, ScheduledJob, Touchpoint};
pub use scheduler::NotificationScheduler;
pub use service::{RegistrationOutcome, RegistrationService};
