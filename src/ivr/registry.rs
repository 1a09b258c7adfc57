//! Call State Tracking
//!
//! Keeps a view of every call the IVR is handling and of a bounded number of
//! finished ones, for the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where a call is in the IVR flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IvrState {
    Answering,
    Greeting,
    Menu,
    /// Hours message played; the call stays open until the caller hangs up
    PlayingHours,
    /// Voicemail branch
    Recording,
    /// Hung up from the menu
    Terminated,
    /// A phase failed and the call was abandoned
    Failed,
}

/// Tracked call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub state: IvrState,
    /// Raw digit strings collected at the menu, in order
    pub selections: Vec<String>,
    pub recording_url: Option<String>,
    /// Message ID of the voicemail notification, once sent
    pub notification_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds between start and end
    pub duration: Option<u32>,
}

impl CallRecord {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Counts reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub active: usize,
    pub total: usize,
}

/// Registry of calls handled by this process
#[derive(Debug, Clone)]
pub struct CallRegistry {
    calls: Arc<RwLock<HashMap<String, CallRecord>>>,
    history_limit: usize,
}

impl CallRegistry {
    /// Create a registry keeping at most `history_limit` finished calls
    pub fn new(history_limit: usize) -> Self {
        Self {
            calls: Arc::new(RwLock::new(HashMap::new())),
            history_limit,
        }
    }

    /// Start tracking a call
    pub async fn register(&self, id: &str, from: &str, to: &str) -> CallRecord {
        let record = CallRecord {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            state: IvrState::Answering,
            selections: Vec::new(),
            recording_url: None,
            notification_id: None,
            started_at: Utc::now(),
            ended_at: None,
            duration: None,
        };

        let mut calls = self.calls.write().await;
        calls.insert(record.id.clone(), record.clone());

        record
    }

    pub async fn get(&self, id: &str) -> Option<CallRecord> {
        let calls = self.calls.read().await;
        calls.get(id).cloned()
    }

    /// Move a call to a new IVR state
    pub async fn transition(&self, id: &str, state: IvrState) -> Option<()> {
        self.update(id, |call| call.state = state).await
    }

    pub async fn record_selection(&self, id: &str, digits: String) -> Option<()> {
        self.update(id, |call| call.selections.push(digits)).await
    }

    pub async fn set_recording(&self, id: &str, url: String) -> Option<()> {
        self.update(id, |call| call.recording_url = Some(url)).await
    }

    pub async fn set_notification(&self, id: &str, message_id: String) -> Option<()> {
        self.update(id, |call| call.notification_id = Some(message_id))
            .await
    }

    /// Mark a call as over, keeping its last IVR state
    pub async fn finish(&self, id: &str) -> Option<()> {
        let mut calls = self.calls.write().await;
        let call = calls.get_mut(id)?;
        if call.ended_at.is_none() {
            let ended = Utc::now();
            let seconds = (ended - call.started_at).num_seconds().max(0);
            call.ended_at = Some(ended);
            call.duration = Some(u32::try_from(seconds).unwrap_or(u32::MAX));
        }
        Self::prune(&mut calls, self.history_limit);
        Some(())
    }

    /// Calls that have not ended yet
    pub async fn list_active(&self) -> Vec<CallRecord> {
        let calls = self.calls.read().await;
        let mut active: Vec<_> = calls.values().filter(|c| c.is_active()).cloned().collect();
        active.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        active
    }

    /// All tracked calls, newest first
    pub async fn list_all(&self) -> Vec<CallRecord> {
        let calls = self.calls.read().await;
        let mut all: Vec<_> = calls.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }

    pub async fn summary(&self) -> CallSummary {
        let calls = self.calls.read().await;
        CallSummary {
            active: calls.values().filter(|c| c.is_active()).count(),
            total: calls.len(),
        }
    }

    async fn update(&self, id: &str, apply: impl FnOnce(&mut CallRecord)) -> Option<()> {
        let mut calls = self.calls.write().await;
        let call = calls.get_mut(id)?;
        apply(call);
        Some(())
    }

    fn prune(calls: &mut HashMap<String, CallRecord>, limit: usize) {
        let mut finished: Vec<(DateTime<Utc>, String)> = calls
            .values()
            .filter_map(|c| c.ended_at.map(|ended| (ended, c.id.clone())))
            .collect();
        if finished.len() <= limit {
            return;
        }
        finished.sort();
        let excess = finished.len() - limit;
        for (_, id) in finished.into_iter().take(excess) {
            calls.remove(&id);
        }
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}
