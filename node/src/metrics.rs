//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. Everything lives in a dedicated [`prometheus::Registry`] under the
//! `escrow` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::runtime::Runtime;

/// Metric handles. Cloning shares the underlying collectors.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Blocks produced since startup.
    pub blocks_produced_total: IntCounter,
    pub block_height: IntGauge,
    /// Signed calls by method and outcome (`ok`, `reverted`, `rejected`).
    pub calls_total: IntCounterVec,
    /// Time spent executing a signed call, lock wait included.
    pub call_latency_seconds: Histogram,
    pub faucet_mints_total: IntCounter,
    /// Escrows ever created.
    pub escrows_total: IntGauge,
    /// Escrows in `Created` or `Disputed`.
    pub active_escrows: IntGauge,
    /// 1 while the contract is paused.
    pub contract_paused: IntGauge,
    pub snapshot_failures_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("escrow".into()), None)?;

        let blocks_produced_total = IntCounter::new("blocks_produced_total", "Blocks produced since startup")?;
        registry.register(Box::new(blocks_produced_total.clone()))?;

        let block_height = IntGauge::new("block_height", "Height of the latest block")?;
        registry.register(Box::new(block_height.clone()))?;

        let calls_total = IntCounterVec::new(
            Opts::new("calls_total", "Signed contract calls by method and outcome"),
            &["method", "outcome"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let call_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("call_latency_seconds", "Signed call execution latency in seconds")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(call_latency_seconds.clone()))?;

        let faucet_mints_total = IntCounter::new("faucet_mints_total", "Successful faucet mints")?;
        registry.register(Box::new(faucet_mints_total.clone()))?;

        let escrows_total = IntGauge::new("escrows_total", "Escrow transactions ever created")?;
        registry.register(Box::new(escrows_total.clone()))?;

        let active_escrows = IntGauge::new("active_escrows", "Escrow transactions in Created or Disputed")?;
        registry.register(Box::new(active_escrows.clone()))?;

        let contract_paused = IntGauge::new("contract_paused", "1 while the escrow contract is paused")?;
        registry.register(Box::new(contract_paused.clone()))?;

        let snapshot_failures_total =
            IntCounter::new("snapshot_failures_total", "Failed attempts to persist the state snapshot")?;
        registry.register(Box::new(snapshot_failures_total.clone()))?;

        Ok(Self {
            registry,
            blocks_produced_total,
            block_height,
            calls_total,
            call_latency_seconds,
            faucet_mints_total,
            escrows_total,
            active_escrows,
            contract_paused,
            snapshot_failures_total,
        })
    }

    /// Refreshes the gauges that mirror runtime state.
    pub fn observe(&self, runtime: &Runtime) {
        let contract = &runtime.contract;
        self.block_height.set(gauge_value(runtime.chain.height()));
        self.escrows_total
            .set(gauge_value(contract.counter_escrow_transactions()));
        let active = contract
            .get_all_escrows_tx()
            .iter()
            .filter(|tx| tx.is_active())
            .count();
        self.active_escrows.set(gauge_value(active as u64));
        self.contract_paused.set(i64::from(contract.paused()));
    }

    pub fn record_call(&self, method: &str, outcome: &str) {
        self.calls_total.with_label_values(&[method, outcome]).inc();
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn gauge_value(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics`. HTTP 500 if encoding fails.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::GenesisConfig;
    use escrow_contracts::CustodyKind;
    use escrow_protocol::Address;

    #[test]
    fn encode_contains_namespaced_metrics() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_call("pause", "ok");
        let text = metrics.encode().unwrap();
        assert!(text.contains("escrow_calls_total{method=\"pause\",outcome=\"ok\"} 1"));
        assert!(text.contains("escrow_block_height"));
    }

    #[test]
    fn observe_mirrors_runtime() {
        let runtime = Runtime::genesis(&GenesisConfig {
            owner: Address::from_label("operator"),
            custody: CustodyKind::Direct,
            timestamp: 1_700_000_000,
        })
        .unwrap();
        let metrics = NodeMetrics::new().unwrap();
        metrics.observe(&runtime);
        assert_eq!(metrics.block_height.get(), 0);
        assert_eq!(metrics.active_escrows.get(), 0);
        assert_eq!(metrics.contract_paused.get(), 0);
    }
}
