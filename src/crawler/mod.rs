pub mod backoff;
pub mod manager;
pub mod session;
pub mod supervisor;
pub mod worker;


pub use backoff::Backoff;
pub use manager::CrawlManager;
pub use session::{ResultMap, SessionStatus};
pub use supervisor::RestartReason;
pub use worker::CrawlDeps;
