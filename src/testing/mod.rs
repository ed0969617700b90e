//! Testing utilities and mock implementations
//!
//! Mocks for agents, LLM providers, dispatchers and stores so pipelines can
//! be tested without network access or a database.

pub mod mocks;

pub use mocks::*;
