//! # Prometheus Metrics
//!
//! Exposes operational metrics for the curve node. Scraped by Prometheus at
//! the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use bondline_protocol::engine::{BondReceipt, EngineStatus};

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Bonds committed by the engine.
    pub bonds_total: IntCounter,
    /// Bonds rejected, labelled by `reason`.
    pub bonds_rejected_total: IntCounterVec,
    /// Successful withdrawals, labelled by `kind` (mint/promo).
    pub withdrawals_total: IntCounterVec,
    /// Asset micro-units credited to pending mint balances.
    pub minted_micro_total: IntCounter,
    /// Normalized curve supply after the latest bond.
    pub curve_supply_units: Gauge,
    /// Cumulative collateral intake in local micro-units.
    pub collateral_local_micro: Gauge,
    /// Ticks published to the reference oracle.
    pub oracle_ticks_total: IntCounter,
    /// Latency of the bond critical section, in seconds.
    pub bond_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("bondline".into()), None)?;

        let bonds_total = IntCounter::new("bonds_total", "Bonds committed by the engine")?;
        registry.register(Box::new(bonds_total.clone()))?;

        let bonds_rejected_total = IntCounterVec::new(
            Opts::new("bonds_rejected_total", "Bonds rejected, by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(bonds_rejected_total.clone()))?;

        let withdrawals_total = IntCounterVec::new(
            Opts::new("withdrawals_total", "Successful withdrawals, by balance kind"),
            &["kind"],
        )?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let minted_micro_total = IntCounter::new(
            "minted_micro_total",
            "Asset micro-units credited to pending mint balances",
        )?;
        registry.register(Box::new(minted_micro_total.clone()))?;

        let curve_supply_units =
            Gauge::new("curve_supply_units", "Normalized supply on the issuance curve")?;
        registry.register(Box::new(curve_supply_units.clone()))?;

        let collateral_local_micro = Gauge::new(
            "collateral_local_micro",
            "Cumulative collateral intake in local micro-units",
        )?;
        registry.register(Box::new(collateral_local_micro.clone()))?;

        let oracle_ticks_total =
            IntCounter::new("oracle_ticks_total", "Ticks published to the reference oracle")?;
        registry.register(Box::new(oracle_ticks_total.clone()))?;

        let bond_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "bond_latency_seconds",
                "Latency of the bond critical section in seconds",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(bond_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            bonds_total,
            bonds_rejected_total,
            withdrawals_total,
            minted_micro_total,
            curve_supply_units,
            collateral_local_micro,
            oracle_ticks_total,
            bond_latency_seconds,
        })
    }

    /// Records a committed bond.
    pub fn record_bond(&self, receipt: &BondReceipt) {
        self.bonds_total.inc();
        self.minted_micro_total
            .inc_by(u64::try_from(receipt.minted).unwrap_or(u64::MAX));
        self.curve_supply_units.set(receipt.supply_after.to_f64());
        self.collateral_local_micro.add(receipt.value_local as f64);
    }

    /// Refreshes gauges from an engine status snapshot.
    pub fn observe_status(&self, status: &EngineStatus) {
        self.curve_supply_units.set(status.curve_supply.to_f64());
        self.collateral_local_micro
            .set(status.collateral_received_local as f64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
