//! Fire-and-forget telemetry.
//!
//! Sinks receive step-loop events without ever being allowed to slow the
//! loop down or fail it. The model calls `record` and moves on; what a
//! sink does with the event (drop it, keep it in memory, forward it to a
//! ledger service) is its own business.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

use crate::tumor::cell::CauseOfDeath;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEventKind {
    SimulationStarted,
    DrugDelivery {
        bot: u32,
        position: [f32; 2],
        amount: f32,
    },
    CellKilled {
        cell: u32,
        position: [f32; 2],
        cause: CauseOfDeath,
    },
    SimulationCompleted {
        steps: usize,
        deliveries: usize,
        kills: usize,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TelemetryEventKind,
}

impl TelemetryEvent {
    pub fn now(kind: TelemetryEventKind) -> Self {
        TelemetryEvent {
            timestamp: Utc::now(),
            kind,
        }
    }
}

pub trait TelemetrySink {
    fn record(&self, event: &TelemetryEvent);
}

/// Discards everything. The default.
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: &TelemetryEvent) {}
}

/// Keeps every event; for tests and small interactive runs.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, event: &TelemetryEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Bounded queue for an external consumer to drain. When the queue is full
/// the oldest event is dropped with a warning; recording never blocks.
pub struct BufferedSink {
    queue: Mutex<VecDeque<TelemetryEvent>>,
    capacity: usize,
}

impl BufferedSink {
    pub fn new(capacity: usize) -> Self {
        BufferedSink {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Remove and return all queued events.
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        self.queue.lock().drain(..).collect()
    }
}

impl TelemetrySink for BufferedSink {
    fn record(&self, event: &TelemetryEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            warn!(capacity = self.capacity, "telemetry queue full, dropping oldest event");
        }
        queue.push_back(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_events() {
        let sink = MemorySink::new();
        sink.record(&TelemetryEvent::now(TelemetryEventKind::SimulationStarted));
        sink.record(&TelemetryEvent::now(TelemetryEventKind::DrugDelivery {
            bot: 1,
            position: [10.0, 20.0],
            amount: 2.0,
        }));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn buffered_sink_caps_at_capacity() {
        let sink = BufferedSink::new(3);
        for i in 0..10 {
            sink.record(&TelemetryEvent::now(TelemetryEventKind::DrugDelivery {
                bot: i,
                position: [0.0, 0.0],
                amount: 1.0,
            }));
        }
        let drained = sink.drain();
        assert_eq!(drained.len(), 3);
        // Oldest dropped: the survivors are the last three.
        match &drained[0].kind {
            TelemetryEventKind::DrugDelivery { bot, .. } => assert_eq!(*bot, 7),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(sink.drain().is_empty());
    }
}
