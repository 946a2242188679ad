pub mod aggregator;
pub mod callback;
pub mod counter;
pub mod event_bridge;
pub mod membership;
pub mod report_log;
pub mod unique_requests;

pub use aggregator::Aggregator;
pub use callback::CallbackDispatcher;
pub use counter::UniqueCounter;
pub use event_bridge::{EventBridge, EventPublisher, MembershipMerger, RecordSource, TopicRecord};
pub use membership::{MembershipStore, Origin};
pub use report_log::{FileReportSink, ReportSink};
pub use unique_requests::{Recorded, UniqueRequestService};
