//! Cancellable agent task running a trade plan on a schedule.
//!
//! Each tick executes one planned trade through the router. Cancelling stops
//! the task at the next suspension point: a tick that is still quoting is
//! dropped and its pair returns to `Idle`, while a tick that already reached
//! `Executing` finishes in the router and still writes its record.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use keel_core::{AssetPair, ExecutionRecord};

use crate::error::RouterError;
use crate::router::ExecutionRouter;

/// One planned trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradePlan {
    pub pair: AssetPair,
    pub amount: Decimal,
}

impl TradePlan {
    pub fn new(pair: AssetPair, amount: Decimal) -> Self {
        Self { pair, amount }
    }
}

/// Outcome of one tick.
pub type TickResult = Result<Arc<ExecutionRecord>, RouterError>;

pub struct AgentTask;

impl AgentTask {
    /// Run `plan` in order, waiting `interval` between trades.
    pub fn spawn(router: ExecutionRouter, plan: Vec<TradePlan>, interval: Duration) -> AgentHandle {
        let (cancel, mut cancelled) = watch::channel(false);
        let (finished_tx, finished) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut results = Vec::with_capacity(plan.len());
            for (tick, step) in plan.into_iter().enumerate() {
                if *cancelled.borrow() {
                    break;
                }
                if tick > 0 {
                    tokio::select! {
                        biased;
                        _ = cancelled.changed() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                debug!(tick, pair = %step.pair, amount = %step.amount, "agent tick");
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => {
                        info!(tick, pair = %step.pair, "agent cancelled mid-tick");
                        break;
                    }
                    result = router.quote_and_execute(&step.pair, step.amount) => results.push(result),
                }
            }
            info!(ticks = results.len(), "agent finished");
            finished_tx.send_replace(true);
            results
        });
        AgentHandle { cancel, finished, join }
    }
}

/// Control handle for a running [`AgentTask`]. Dropping it cancels the task.
pub struct AgentHandle {
    cancel: watch::Sender<bool>,
    finished: watch::Receiver<bool>,
    join: JoinHandle<Vec<TickResult>>,
}

impl AgentHandle {
    /// Ask the task to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Resolve once the plan has run out or the task has stopped.
    pub async fn done(&self) {
        let mut finished = self.finished.clone();
        while !*finished.borrow_and_update() {
            if finished.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for the task and collect the outcome of every completed tick.
    pub async fn join(self) -> Vec<TickResult> {
        let AgentHandle { cancel, join, .. } = self;
        let results = join.await.unwrap_or_else(|e| {
            error!(error = %e, "agent task aborted");
            Vec::new()
        });
        drop(cancel);
        results
    }

    /// Cancel, then wait.
    pub async fn stop(self) -> Vec<TickResult> {
        self.cancel();
        self.join().await
    }
}
