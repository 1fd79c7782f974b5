//! Execution records.
//!
//! One [`ExecutionRecord`] is written for every attempt that reaches the
//! `Executing` state, whether it succeeds or fails. Records are append-only
//! and never mutated after they are created.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::AssetPair;
use crate::classify::RouteCategory;
use crate::quote::ProviderSource;
use crate::tx::ProtectedTxHandle;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub order_id: Uuid,
    pub pair: AssetPair,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub route_category: RouteCategory,
    pub success: bool,
    pub protected_tx: Option<ProtectedTxHandle>,
    pub provider_source: Option<ProviderSource>,
    /// Bridge transfer id or cross-protocol deposit address.
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
}

impl ExecutionRecord {
    /// A successful execution.
    pub fn completed(
        order_id: Uuid,
        pair: AssetPair,
        amount: Decimal,
        route_category: RouteCategory,
        provider_source: ProviderSource,
        protected_tx: ProtectedTxHandle,
    ) -> Self {
        Self {
            order_id,
            pair,
            amount,
            timestamp: Utc::now(),
            route_category,
            success: true,
            protected_tx: Some(protected_tx),
            provider_source: Some(provider_source),
            provider_reference: None,
            failure_reason: None,
        }
    }

    /// A failed execution. The protected handle is kept when the failure
    /// happened after wrapping.
    pub fn failed(
        order_id: Uuid,
        pair: AssetPair,
        amount: Decimal,
        route_category: RouteCategory,
        provider_source: Option<ProviderSource>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            pair,
            amount,
            timestamp: Utc::now(),
            route_category,
            success: false,
            protected_tx: None,
            provider_source,
            provider_reference: None,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.provider_reference = reference;
        self
    }

    pub fn with_protected_tx(mut self, handle: Option<ProtectedTxHandle>) -> Self {
        self.protected_tx = handle;
        self
    }
}
