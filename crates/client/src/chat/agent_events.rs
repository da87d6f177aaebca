//! Agent presence aggregation over the incremental agent-events export.
//!
//! The Chat API emits a stream of per-field change events (`status`,
//! `engagements`, ...). [`AgentStateAggregator`] folds that stream into a
//! point-in-time map of online agents, carrying its watermark across calls
//! so repeated sweeps only fetch new events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::pagination::ChatExportPage;
use crate::transport::Client;

/// Incremental agent-events endpoint on the Chat API.
pub const AGENT_EVENTS_PATH: &str = "/api/v2/incremental/agent_events";

/// Records fetched per export request.
const PAGE_LIMIT: i64 = 1000;

/// Agent identifier as used by the Chat API.
pub type AgentId = u64;

/// Point-in-time presence for a single agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentState {
    /// The agent this state describes.
    pub agent_id: AgentId,
    /// Concurrent engagements (active chats).
    pub engagement_count: u64,
    /// Presence status, e.g. `online` or `away`. `unknown` until a status
    /// event has been observed for the agent.
    pub status: String,
    /// When the current status took effect.
    pub status_since: Option<DateTime<Utc>>,
    /// Timestamp of the newest event applied to this agent.
    pub timestamp: Option<DateTime<Utc>>,
}

/// A field value in an agent event; the API sends both strings and bare
/// integers depending on the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEventValue(String);

impl AgentEventValue {
    /// The value as a string, integers rendered in decimal.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for AgentEventValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(Self(s)),
            serde_json::Value::Number(n) => Ok(Self(n.to_string())),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(de::Error::custom(format!("unsupported event value: {other}"))),
        }
    }
}

/// One field change from the agent-events export.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEvent {
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Account the agent belongs to.
    pub account_id: i64,
    /// The agent whose field changed.
    pub agent_id: AgentId,
    /// Which field changed, e.g. `status` or `engagements`.
    pub field_name: String,
    /// Event identifier.
    pub id: String,
    /// The field value before the change.
    #[serde(default)]
    pub previous_value: AgentEventValue,
    /// The field value after the change.
    #[serde(default)]
    pub value: AgentEventValue,
}

/// Payload of one agent-events export page.
#[derive(Debug, Default, Deserialize)]
pub struct AgentEventBody {
    /// Events in this page, oldest first.
    #[serde(default)]
    pub agent_events: Vec<AgentEvent>,
}

/// One page of the agent-events export.
pub type AgentEventPage = ChatExportPage<AgentEventBody>;

#[derive(Default)]
struct Aggregated {
    states: HashMap<AgentId, AgentState>,
    start_time: Option<DateTime<Utc>>,
}

/// Folds the agent-events export into current per-agent presence.
///
/// Offline and invisible agents are dropped from the map rather than kept
/// with a terminal status. The export watermark advances even on pages with
/// no events, so an idle account still makes progress through time.
pub struct AgentStateAggregator {
    client: Arc<Client>,
    inner: Mutex<Aggregated>,
}

impl AgentStateAggregator {
    /// Creates an aggregator with no state and no watermark.
    pub fn new(client: Arc<Client>) -> Self {
        Self { client, inner: Mutex::new(Aggregated::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Aggregated> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches events newer than the watermark and folds them in.
    ///
    /// The first call exports from `default_start`; later calls resume from
    /// where the previous export ended.
    pub async fn update(&self, default_start: DateTime<Utc>) -> Result<(), Error> {
        let start = *self.lock().start_time.get_or_insert(default_start);
        debug!(%start, "updating agent states");

        self.client
            .chat_incremental_export::<AgentEventBody, _>(
                AGENT_EVENTS_PATH,
                start,
                PAGE_LIMIT,
                |page: AgentEventPage| {
                    let end_time = page.end_time();
                    let mut inner = self.lock();
                    for event in page.body.agent_events {
                        apply_event(&mut inner.states, &event)?;
                    }
                    // Empty pages still advance, otherwise an idle account
                    // re-reads the same window forever.
                    inner.start_time = Some(end_time);
                    Ok(())
                },
            )
            .await
    }

    /// A snapshot of the known agent states.
    pub fn states(&self) -> HashMap<AgentId, AgentState> {
        self.lock().states.clone()
    }

    /// The state of one agent, if currently tracked.
    pub fn state(&self, agent_id: AgentId) -> Option<AgentState> {
        self.lock().states.get(&agent_id).cloned()
    }

    /// The watermark the next [`update`](Self::update) will resume from.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.lock().start_time
    }
}

fn apply_event(states: &mut HashMap<AgentId, AgentState>, event: &AgentEvent) -> Result<(), Error> {
    let mut state = states.get(&event.agent_id).cloned().unwrap_or_default();
    state.agent_id = event.agent_id;
    state.timestamp = Some(event.timestamp);
    if state.status.is_empty() {
        // First sighting of this agent; status stays unknown until a status
        // event arrives.
        state.status = "unknown".to_owned();
        state.status_since = Some(event.timestamp);
    }

    match event.field_name.as_str() {
        "engagements" => {
            state.engagement_count =
                event.value.as_str().parse().map_err(|source| Error::EventValue {
                    agent_id: event.agent_id,
                    value: event.value.as_str().to_owned(),
                    source,
                })?;
        }
        "status" => {
            let status = event.value.as_str();
            if status == "offline" || status == "invisible" {
                states.remove(&event.agent_id);
                return Ok(());
            }
            state.status = status.to_owned();
            state.status_since = Some(event.timestamp);
        }
        other => {
            debug!(agent_id = event.agent_id, field = other, "ignoring unrecognized field");
        }
    }

    states.insert(event.agent_id, state);
    Ok(())
}
