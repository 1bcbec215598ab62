//! Default [`TelemetrySink`] for a standalone `fpcore-daemon` process.
//! A real telemetry backend is this core's explicit non-goal;
//! this sink just narrates each drained envelope via `tracing`, the same
//! way `aivcs_core::telemetry::init_tracing`-configured binaries in this
//! corpus log structured events instead of shipping them anywhere.

use async_trait::async_trait;

use runtime_analyzer::TelemetrySink;

pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn emit(&self, envelope: serde_json::Value) {
        tracing::info!(envelope = %envelope, "cache miss analysis batch");
    }
}
