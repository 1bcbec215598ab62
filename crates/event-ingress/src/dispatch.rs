use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;

use crate::events::ExecutionEvent;

/// A single attached event consumer (§4.8). `handles` decides, per
/// `(eventId, workerId)`, whether this consumer wants the event; once it
/// answers `false` for a given `eventId` the dispatcher never asks again
/// for that consumer (the "disable this event after first unhandled"
/// behavior), modeled as a per-consumer bitset rather than a re-check on
/// every frame.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    fn handles(&self, event_id: u8, worker_id: u32) -> bool;

    async fn consume(&self, event: &ExecutionEvent, worker_id: u32);
}

/// Fans a worker-tagged event out to one sub-consumer per `workerId`,
/// created lazily on first sight of that worker (§4.8's "worker-tagged
/// events may be fanned out into per-worker sub-consumers").
pub struct WorkerFanout<F> {
    factory: F,
    workers: dashmap::DashMap<u32, Arc<dyn EventConsumer>>,
}

impl<F> WorkerFanout<F>
where
    F: Fn(u32) -> Arc<dyn EventConsumer> + Send + Sync,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            workers: dashmap::DashMap::new(),
        }
    }

    fn sub_consumer(&self, worker_id: u32) -> Arc<dyn EventConsumer> {
        self.workers
            .entry(worker_id)
            .or_insert_with(|| (self.factory)(worker_id))
            .clone()
    }
}

#[async_trait]
impl<F> EventConsumer for WorkerFanout<F>
where
    F: Fn(u32) -> Arc<dyn EventConsumer> + Send + Sync,
{
    fn handles(&self, event_id: u8, worker_id: u32) -> bool {
        self.sub_consumer(worker_id).handles(event_id, worker_id)
    }

    async fn consume(&self, event: &ExecutionEvent, worker_id: u32) {
        self.sub_consumer(worker_id).consume(event, worker_id).await;
    }
}

/// Routes decoded events to every attached [`EventConsumer`], tracking
/// which `(consumer, eventId)` pairs have already declared themselves
/// uninterested so later frames of that kind skip straight past them.
#[derive(Default)]
pub struct Dispatcher {
    consumers: Vec<Arc<dyn EventConsumer>>,
    disabled: DashSet<(usize, u8)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
            disabled: DashSet::new(),
        }
    }

    pub fn attach(&mut self, consumer: Arc<dyn EventConsumer>) {
        self.consumers.push(consumer);
    }

    pub async fn dispatch(&self, event: ExecutionEvent, worker_id: u32) {
        let event_id = event.event_id();
        for (idx, consumer) in self.consumers.iter().enumerate() {
            if self.disabled.contains(&(idx, event_id)) {
                continue;
            }
            if !consumer.handles(event_id, worker_id) {
                self.disabled.insert((idx, event_id));
                tracing::trace!(consumer = idx, event_id, "consumer declined event kind; disabling");
                continue;
            }
            consumer.consume(&event, worker_id).await;
        }
    }
}
