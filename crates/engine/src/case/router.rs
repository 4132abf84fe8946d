//! Routes execution events to the sink according to case subscriptions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::Store;
use crate::error::EngineResult;
use crate::events::{EventSink, ExecutionEvent};
use crate::result_ext::ResultExt;

/// Case name -> entity id -> event names.
pub type SubscriptionTable = HashMap<String, HashMap<String, HashSet<String>>>;

/// Matches every event against the subscription table.
///
/// The table is replaced as a whole. Readers clone the `Arc` and never see
/// a partially written table.
pub struct CaseRouter {
    table: RwLock<Arc<SubscriptionTable>>,
    store: Arc<dyn Store>,
    sink: Arc<dyn EventSink>,
}

impl CaseRouter {
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            table: RwLock::new(Arc::new(SubscriptionTable::new())),
            store,
            sink,
        }
    }

    /// Replace the whole table.
    pub async fn set_subscriptions(&self, table: SubscriptionTable) {
        *self.table.write().await = Arc::new(table);
    }

    /// Rebuild the table from the persisted case subscriptions, dropping
    /// everything set before.
    pub async fn sync_to_subscriptions(&self) -> EngineResult<()> {
        let cases = self.store.case_subscriptions().await?;
        let table: SubscriptionTable = cases
            .iter()
            .map(|case| (case.name.clone(), case.lookup()))
            .collect();
        tracing::debug!(cases = table.len(), "Synchronized case subscriptions");
        self.set_subscriptions(table).await;
        Ok(())
    }

    pub async fn clear_subscriptions(&self) {
        self.set_subscriptions(SubscriptionTable::new()).await;
    }

    /// Snapshot of the current table.
    pub async fn subscriptions(&self) -> Arc<SubscriptionTable> {
        self.table.read().await.clone()
    }

    /// Names of the cases subscribed to `event`.
    pub async fn matching_cases(&self, event: &ExecutionEvent) -> Vec<String> {
        let table = self.subscriptions().await;
        let name = event.event.as_str();
        let mut cases: Vec<String> = table
            .iter()
            .filter(|(_, entities)| {
                entities
                    .get(&event.entity_id)
                    .is_some_and(|events| events.contains(name))
            })
            .map(|(case, _)| case.clone())
            .collect();
        cases.sort();
        cases
    }

    /// Forward `event` once per matching case. Returns how many cases
    /// matched. Unmatched events are dropped.
    pub async fn route(&self, event: &ExecutionEvent) -> usize {
        let cases = self.matching_cases(event).await;
        for case in &cases {
            let _ = self
                .sink
                .forward(case, event)
                .await
                .log(format!("forwarding {} to case {}", event.event, case));
        }
        cases.len()
    }

    /// Route a batch of events in order.
    pub async fn route_all(&self, events: &[ExecutionEvent]) -> usize {
        let mut forwarded = 0;
        for event in events {
            forwarded += self.route(event).await;
        }
        forwarded
    }
}
