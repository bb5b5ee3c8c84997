//! The concurrency fabric: fixed pools of message-passing worker threads
//! with single-owner buffer handoff.

pub mod pool;

pub use pool::WorkerPool;
