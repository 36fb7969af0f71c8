pub mod clock;
pub mod context;
pub mod currency;
pub mod error;
pub mod tenant;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::EngineContext;
pub use currency::Currency;
pub use error::{AppError, Result};
pub use tenant::{InvoiceNumberFormat, TenantConfigService, TenantId};
