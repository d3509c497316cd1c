pub mod job;
pub mod orchestrator;
pub mod pagination;
pub mod retry;
pub mod task;

pub use job::{CrawlJob, JobStatus, JobSummary};
pub use orchestrator::{JobEvent, Orchestrator};
pub use task::{BackendKind, CrawlTask, FieldFlags, ProfileKind};
