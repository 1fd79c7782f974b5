//! Cross-crate integration tests for Keel.
//!
//! Scenarios run the wallet manager, quote aggregator and execution router
//! together against the simulated collaborators of `keel-router`.

pub mod helpers;
