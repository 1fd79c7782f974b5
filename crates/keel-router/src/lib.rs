//! # keel-router: quote aggregation and cross-venue execution routing.
//!
//! Classifies an asset pair, fetches a quote from the backend category that
//! can execute it (falling back to a secondary provider under failure), and
//! drives execution: reserve capital, sign with the right wallet, wrap with
//! anti-front-running protection, dispatch, and append one execution record.
//!
//! # Modules
//!
//! - [`aggregator`]: QuoteAggregator with deadlines, fallback and in-flight sharing
//! - [`agent`]: cancellable scheduled trade plans
//! - [`capital`]: capital ledger with reservations
//! - [`config`]: RouterConfig, loaded from TOML and `KEEL__*` env vars
//! - [`error`]: `RouterError` enum
//! - [`protection`]: ProtectionWrapper for private relay submission
//! - [`records`]: append-only execution log
//! - [`router`]: ExecutionRouter state machine
//! - [`state`]: per-pair route states and legal transitions
//! - `testing`: simulated collaborators (feature `testing`)

pub mod agent;
pub mod aggregator;
pub mod capital;
pub mod config;
pub mod error;
pub mod protection;
pub mod records;
pub mod router;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{AgentHandle, AgentTask, TradePlan};
pub use aggregator::{ProviderSet, QuoteAggregator};
pub use capital::{CapitalLedger, Reservation};
pub use config::{ConfigError, ProtectionConfig, RouterConfig};
pub use error::RouterError;
pub use protection::ProtectionWrapper;
pub use records::ExecutionLog;
pub use router::ExecutionRouter;
pub use state::{RouteState, StateTable};
