pub mod actor;
pub mod bulk;
pub mod errors;
pub mod notify;
pub mod processor;
pub mod scanner;
pub mod submit;

pub use actor::{Actor, SYSTEM_ACTOR_ID};
pub use bulk::{BulkCoordinator, BulkRequest};
pub use errors::WorkflowError;
pub use notify::{
    InMemoryNotificationSink, Notification, NotificationError, NotificationSink, NotificationType,
};
pub use processor::{ActionOutcome, StepAction, StepProcessor};
pub use scanner::{EscalationScanner, SweepFailure, SweepReport, SweepScope};
pub use submit::{SubmissionService, SubmitOutcome};
