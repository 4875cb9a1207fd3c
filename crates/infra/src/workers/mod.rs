//! Background workers.

pub mod change_feed_worker;

pub use change_feed_worker::{ChangeFeedWorker, WorkerConfig, WorkerHandle, WorkerStats};
