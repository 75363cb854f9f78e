//! Two-tier session store (C4): a durable record backed by Postgres and
//! a fast Redis-shaped cache in front of it, kept consistent by writing
//! the durable tier first.

pub mod inmemory;
pub mod model;
pub mod postgres;
pub mod store;

pub use inmemory::InMemorySessionRepository;
pub use model::{NewSession, Session};
pub use store::{DurableSessionRepository, SessionStore};
