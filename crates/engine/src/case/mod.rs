//! Case subscriptions.
//!
//! A case is a named registration of which `(entity id, event name)`
//! pairs are routed to the event sink. The persisted [`CaseSubscription`]
//! records and the router's in-memory table are synchronized explicitly
//! with [`CaseRouter::sync_to_subscriptions`].

pub mod router;

pub use router::{CaseRouter, SubscriptionTable};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Events of one entity a case listens to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Workflow, action, branch, expression, condition or transform id.
    pub id: String,
    pub events: Vec<String>,
}

impl Subscription {
    pub fn new<I, S>(id: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            events: events.into_iter().map(Into::into).collect(),
        }
    }
}

/// Persisted case subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSubscription {
    pub name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl CaseSubscription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            note: String::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// The `{entity id: events}` lookup form. Repeated ids are merged.
    pub fn lookup(&self) -> HashMap<String, HashSet<String>> {
        let mut lookup: HashMap<String, HashSet<String>> = HashMap::new();
        for subscription in &self.subscriptions {
            lookup
                .entry(subscription.id.clone())
                .or_default()
                .extend(subscription.events.iter().cloned());
        }
        lookup
    }
}
