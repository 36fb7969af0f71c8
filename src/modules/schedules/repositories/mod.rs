pub mod memory_store;
pub mod mysql_store;
pub mod store;

pub use memory_store::InMemoryScheduleStore;
pub use mysql_store::MySqlScheduleStore;
pub use store::{ScheduleStore, ScheduleTx};
