//! Event recording.
//!
//! The raw event append is the durability boundary: it either succeeds or
//! the request fails. Everything derived from an event - denormalized
//! counters, session mutations, test-result recomputation - is best-effort;
//! failures are logged and never surface to the caller.

pub mod queue;

pub use queue::BeaconQueue;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::TestReporter;
use crate::error::{ApiError, AppResult};
use crate::storage::{
    DeviceInfo, EventKind, StatField, Storage, TrackedEvent, VariantLabel, VisitorSession,
};

/// One tracking request, as posted by the browser snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEventParams {
    /// Landing page the event belongs to.
    #[serde(default)]
    pub lp_id: String,
    /// Session the event belongs to.
    #[serde(default)]
    pub session_id: String,
    /// Event type; fixed-type endpoints fill this in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Component involved, for component-scoped events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    /// Variant involved, for component-scoped events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantLabel>,
    /// Arbitrary JSON payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Event time; defaults to receipt time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrackEventParams {
    /// Create params for a given event type
    pub fn new(
        lp_id: impl Into<String>,
        session_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            lp_id: lp_id.into(),
            session_id: session_id.into(),
            event_type: Some(event_type.into()),
            component_id: None,
            variant: None,
            data: None,
            timestamp: None,
        }
    }

    /// Scope to a component and variant
    pub fn with_component(mut self, component_id: impl Into<String>, variant: VariantLabel) -> Self {
        self.component_id = Some(component_id.into());
        self.variant = Some(variant);
        self
    }

    /// Set the payload
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Force the event type, as the fixed-type endpoints do
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

/// Confirmation of a recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub event_id: String,
    pub event_type: String,
}

/// Records tracking events and maintains derived state.
#[derive(Clone)]
pub struct EventRecorder {
    storage: Arc<dyn Storage>,
    reporter: TestReporter,
}

impl EventRecorder {
    /// Create a new recorder
    pub fn new(storage: Arc<dyn Storage>, reporter: TestReporter) -> Self {
        Self { storage, reporter }
    }

    /// Record one event.
    ///
    /// Validates identifiers, appends the event, then runs the event kind's
    /// side effects best-effort. Unknown event types are stored verbatim
    /// with no side effects.
    pub async fn record(&self, params: TrackEventParams) -> AppResult<RecordedEvent> {
        if params.session_id.trim().is_empty() {
            return Err(ApiError::validation("sessionId", "is required").into());
        }
        if params.lp_id.trim().is_empty() {
            return Err(ApiError::validation("lpId", "is required").into());
        }
        let event_type = match params.event_type.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return Err(ApiError::validation("eventType", "is required").into()),
        };

        let mut event = TrackedEvent::new(&params.session_id, &params.lp_id, &event_type);
        event.component_id = params.component_id.clone();
        event.variant = params.variant;
        event.payload = params.data.clone();
        if let Some(timestamp) = params.timestamp {
            event = event.at(timestamp);
        }

        self.storage.insert_event(&event).await?;

        if let Ok(kind) = event.event_type.parse::<EventKind>() {
            if let Err(e) = self.apply_side_effects(kind, &event).await {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Secondary tracking effects failed; raw event retained"
                );
            }
        } else {
            debug!(event_type = %event.event_type, "Unknown event type stored without side effects");
        }

        info!(
            event_id = %event.id,
            session_id = %event.session_id,
            lp_id = %event.lp_id,
            event_type = %event.event_type,
            "Event recorded"
        );

        Ok(RecordedEvent {
            event_id: event.id,
            event_type: event.event_type,
        })
    }

    async fn apply_side_effects(&self, kind: EventKind, event: &TrackedEvent) -> AppResult<()> {
        match kind {
            EventKind::Pageview => self.ensure_session(event).await,
            EventKind::ComponentView => self.bump_counter(event, StatField::Views).await,
            EventKind::Click => self.bump_counter(event, StatField::Clicks).await,
            EventKind::Conversion => self.handle_conversion(event).await,
            EventKind::ScrollDepth => self.update_scroll_depth(event).await,
            EventKind::Exit => self.handle_exit(event).await,
        }
    }

    /// Create the session record on first pageview.
    async fn ensure_session(&self, event: &TrackedEvent) -> AppResult<()> {
        if self.storage.get_session(&event.session_id).await?.is_some() {
            return Ok(());
        }

        let mut session = VisitorSession::new(&event.lp_id);
        session.id = event.session_id.clone();
        session.started_at = event.occurred_at;
        session.last_activity_at = event.occurred_at;

        if let Some(payload) = &event.payload {
            session.device = device_from_payload(payload);
            session.referrer = payload_str(payload, "referrer");
            session.utm_source = payload_str(payload, "utmSource");
            session.utm_campaign = payload_str(payload, "utmCampaign");
        }

        self.storage.create_session(&session).await?;
        debug!(session_id = %session.id, lp_id = %session.lp_id, "Session created");
        Ok(())
    }

    async fn bump_counter(&self, event: &TrackedEvent, field: StatField) -> AppResult<()> {
        let (Some(component_id), Some(variant)) = (&event.component_id, event.variant) else {
            debug!(
                event_id = %event.id,
                "Component-scoped event without component/variant, counters unchanged"
            );
            return Ok(());
        };

        self.storage
            .increment_stat(component_id, variant, field)
            .await?;
        Ok(())
    }

    async fn handle_conversion(&self, event: &TrackedEvent) -> AppResult<()> {
        self.bump_counter(event, StatField::Conversions).await?;

        if let Some(mut session) = self.storage.get_session(&event.session_id).await? {
            session.has_converted = true;
            session.conversion_type = event
                .payload
                .as_ref()
                .and_then(|p| payload_str(p, "conversionType"));
            session.last_activity_at = event.occurred_at;
            self.storage.update_session(&session).await?;
        }

        if let Some(component_id) = &event.component_id {
            self.reporter.recompute(component_id).await?;
        }

        Ok(())
    }

    async fn update_scroll_depth(&self, event: &TrackedEvent) -> AppResult<()> {
        let Some(mut session) = self.storage.get_session(&event.session_id).await? else {
            return Ok(());
        };

        if let Some(depth) = event.payload.as_ref().and_then(|p| payload_f64(p, "depth")) {
            session.max_scroll_depth = Some(
                session
                    .max_scroll_depth
                    .map_or(depth, |current| current.max(depth)),
            );
        }
        session.last_activity_at = event.occurred_at;
        self.storage.update_session(&session).await?;
        Ok(())
    }

    async fn handle_exit(&self, event: &TrackedEvent) -> AppResult<()> {
        let Some(mut session) = self.storage.get_session(&event.session_id).await? else {
            return Ok(());
        };

        session.last_activity_at = event.occurred_at;
        if let Some(payload) = &event.payload {
            if let Some(secs) = payload_f64(payload, "timeOnPage") {
                session.duration_secs = Some(secs as i64);
            }
            if let Some(depth) = payload_f64(payload, "scrollDepth") {
                session.max_scroll_depth = Some(
                    session
                        .max_scroll_depth
                        .map_or(depth, |current| current.max(depth)),
                );
            }
        }
        self.storage.update_session(&session).await?;
        Ok(())
    }
}

fn device_from_payload(payload: &serde_json::Value) -> DeviceInfo {
    let device = payload.get("device");
    DeviceInfo {
        device_type: device
            .and_then(|d| d.get("type"))
            .and_then(|t| t.as_str())
            .and_then(|t| t.parse().ok())
            .unwrap_or_default(),
        browser: device
            .and_then(|d| d.get("browser"))
            .and_then(|b| b.as_str())
            .map(str::to_string),
    }
}

fn payload_str(payload: &serde_json::Value, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn payload_f64(payload: &serde_json::Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(|v| v.as_f64())
}
