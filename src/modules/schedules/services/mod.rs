pub(crate) mod lookups;
pub mod schedule_manager;

pub use schedule_manager::ScheduleManager;
