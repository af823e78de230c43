//! Shared test fixtures and utilities for silkbridge crates.
//!
//! Provides a recording mock engine/provider, a blocking wire-protocol
//! client and deterministic RNG setup.

pub mod client;
pub mod mocks;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use client::TestClient;
pub use mocks::{EngineLog, RandomEngine, RecordingProvider};
pub use rng::{deterministic_vec, seeded_rng};
