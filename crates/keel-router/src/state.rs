//! Per-pair route state machine.
//!
//! ```text
//! Idle -> Classifying -> QuotingInProgress -> Quoted -> Executing -> Completed
//!              |                |               |           \
//!              +----------------+---------------+------------> Failed
//! ```
//!
//! A cancelled attempt returns to `Idle` from any state before `Executing`.
//! `Completed` and `Failed` are terminal for an attempt; the next attempt on
//! the same pair starts again at `Classifying`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{trace, warn};

use keel_core::AssetPair;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    #[default]
    Idle,
    Classifying,
    QuotingInProgress,
    Quoted,
    Executing,
    Completed,
    Failed,
}

impl RouteState {
    /// Whether an attempt in this state has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteState::Completed | RouteState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: RouteState) -> bool {
        use RouteState::*;
        matches!(
            (*self, next),
            (Idle | Completed | Failed, Classifying)
                | (Classifying, QuotingInProgress | Failed | Idle)
                | (QuotingInProgress, Quoted | Failed | Idle)
                | (Quoted, Executing | Failed | Idle)
                | (Executing, Completed | Failed)
        )
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteState::Idle => "idle",
            RouteState::Classifying => "classifying",
            RouteState::QuotingInProgress => "quoting",
            RouteState::Quoted => "quoted",
            RouteState::Executing => "executing",
            RouteState::Completed => "completed",
            RouteState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state per pair. Pairs never seen are `Idle`, and a pair that
/// returns to `Idle` is dropped from the table.
#[derive(Debug, Default)]
pub struct StateTable {
    states: RwLock<HashMap<AssetPair, RouteState>>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &AssetPair) -> RouteState {
        self.states.read().get(pair).copied().unwrap_or_default()
    }

    /// Move `pair` to `next`. Illegal transitions are refused and reported.
    pub fn transition(&self, pair: &AssetPair, next: RouteState) -> bool {
        let mut states = self.states.write();
        let current = states.get(pair).copied().unwrap_or_default();
        if !current.can_transition_to(next) {
            warn!(pair = %pair, from = %current, to = %next, "illegal route state transition");
            return false;
        }
        trace!(pair = %pair, from = %current, to = %next, "route state");
        if next == RouteState::Idle {
            states.remove(pair);
        } else {
            states.insert(pair.clone(), next);
        }
        true
    }

    /// Number of pairs in a state other than `Idle`.
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}
