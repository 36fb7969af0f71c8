pub mod commands;
pub mod schedule_entry;
pub mod schedule_view;

pub use commands::{
    AdjustDate, AdminRefund, CancelEnrollment, CreateSchedule, ManualPayment, PauseEnrollment,
    ResumeEnrollment,
};
pub use schedule_entry::{DateAdjustment, PaymentScheduleEntry, ScheduleStatus};
pub use schedule_view::{
    CancellationOutcome, OverdueRefreshSummary, PendingRefund, ScheduleEntryView, ScheduleView,
};
