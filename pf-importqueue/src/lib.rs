//! Durable import job queue (C6): a FIFO list, per-job hashes, and
//! per-user index, Redis-shaped, plus an in-memory stand-in for tests.

pub mod inmemory;
pub mod model;
pub mod queue;
pub mod redis_backend;

pub use inmemory::InMemoryImportQueue;
pub use model::{ImportJob, JobStatus, NewImportJob};
pub use queue::{ImportJobQueue, JobUpdate};
pub use redis_backend::RedisImportQueue;
