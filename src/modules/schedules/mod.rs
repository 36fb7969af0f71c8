//! Payment schedules: storage, lifecycle operations and the views served over HTTP

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{PaymentScheduleEntry, ScheduleStatus, ScheduleView};
pub use repositories::{InMemoryScheduleStore, MySqlScheduleStore, ScheduleStore, ScheduleTx};
pub use services::ScheduleManager;
