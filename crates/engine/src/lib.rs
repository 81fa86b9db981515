//! Transactional services of the layouts engine.
//!
//! Every mutating operation runs in one SQLite transaction: input is
//! validated first, stored state is re-read inside the transaction, and
//! the transaction either commits as a whole or rolls back.

pub mod config;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod services;

pub use engine::{Engine, Registries};
pub use error::{EngineError, EngineResult};
