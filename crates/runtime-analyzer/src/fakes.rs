//! Test doubles for the runtime analyzer's own tests and for anything
//! downstream (e.g. `fpcore-daemon`) that wants to exercise the
//! coordinator without a real telemetry backend.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::batch::TelemetrySink;

#[derive(Default)]
pub struct CollectingSink {
    envelopes: Mutex<Vec<serde_json::Value>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelopes(&self) -> Vec<serde_json::Value> {
        self.envelopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for CollectingSink {
    async fn emit(&self, envelope: serde_json::Value) {
        self.envelopes.lock().unwrap().push(envelope);
    }
}
