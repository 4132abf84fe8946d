//! Event sinks receiving events forwarded by the case router.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::EngineResult;
use crate::events::ExecutionEvent;

/// Receives `(case, event)` pairs for audit or trigger consumption.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn forward(&self, case: &str, event: &ExecutionEvent) -> EngineResult<()>;
}

/// Logs every forwarded event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn forward(&self, case: &str, event: &ExecutionEvent) -> EngineResult<()> {
        tracing::info!(
            case = %case,
            execution_id = %event.execution_id,
            entity_id = %event.entity_id,
            event = %event.event,
            "Case event"
        );
        Ok(())
    }
}

/// Keeps every forwarded event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    received: Mutex<Vec<(String, ExecutionEvent)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub async fn received(&self) -> Vec<(String, ExecutionEvent)> {
        self.received.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.received.lock().await.len()
    }

    pub async fn clear(&self) {
        self.received.lock().await.clear();
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn forward(&self, case: &str, event: &ExecutionEvent) -> EngineResult<()> {
        self.received
            .lock()
            .await
            .push((case.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        let event = ExecutionEvent::new(
            Uuid::new_v4(),
            "a",
            EventKind::ActionStarted,
            serde_json::Value::Null,
        );
        sink.forward("audit", &event).await.unwrap();
        TracingSink.forward("audit", &event).await.unwrap();

        let received = sink.received().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "audit");
        assert_eq!(received[0].1, event);

        sink.clear().await;
        assert_eq!(sink.len().await, 0);
    }
}
