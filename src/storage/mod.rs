//! Storage layer for experiment persistence.
//!
//! This module provides SQLite-based storage for landing pages, components,
//! variants, visitor sessions, the append-only event log, denormalized
//! component counters, and test-result snapshots.
//!
//! The event log is the canonical source of truth for conversion math;
//! `component_stats` rows are a rebuildable dashboard cache.

mod sqlite;

pub use sqlite::SqliteStorage;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// One of the two content renderings of a component.
///
/// "a" is the incumbent/control, "b" the challenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantLabel {
    A,
    B,
}

impl VariantLabel {
    /// The opposite rendering, i.e. the loser when `self` wins.
    pub fn other(self) -> Self {
        match self {
            VariantLabel::A => VariantLabel::B,
            VariantLabel::B => VariantLabel::A,
        }
    }
}

impl std::fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantLabel::A => write!(f, "a"),
            VariantLabel::B => write!(f, "b"),
        }
    }
}

impl std::str::FromStr for VariantLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "a" => Ok(VariantLabel::A),
            "b" => Ok(VariantLabel::B),
            _ => Err(format!("Unknown variant label: {}", s)),
        }
    }
}

/// Known event kinds.
///
/// The API boundary accepts free-form event types; this enum only drives
/// the recorder's side effects. Unknown types are stored verbatim with no
/// side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pageview,
    ComponentView,
    Click,
    Conversion,
    ScrollDepth,
    Exit,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Pageview => write!(f, "pageview"),
            EventKind::ComponentView => write!(f, "component_view"),
            EventKind::Click => write!(f, "click"),
            EventKind::Conversion => write!(f, "conversion"),
            EventKind::ScrollDepth => write!(f, "scroll_depth"),
            EventKind::Exit => write!(f, "exit"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pageview" => Ok(EventKind::Pageview),
            "component_view" | "view" => Ok(EventKind::ComponentView),
            "click" => Ok(EventKind::Click),
            "conversion" => Ok(EventKind::Conversion),
            "scroll_depth" | "scroll" => Ok(EventKind::ScrollDepth),
            "exit" => Ok(EventKind::Exit),
            _ => Err(format!("Unknown event kind: {}", s)),
        }
    }
}

/// Visitor device classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Desktop => write!(f, "desktop"),
            DeviceType::Mobile => write!(f, "mobile"),
            DeviceType::Tablet => write!(f, "tablet"),
            DeviceType::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desktop" => Ok(DeviceType::Desktop),
            "mobile" => Ok(DeviceType::Mobile),
            "tablet" => Ok(DeviceType::Tablet),
            "unknown" => Ok(DeviceType::Unknown),
            _ => Err(format!("Unknown device type: {}", s)),
        }
    }
}

/// Landing-page lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpStatus {
    #[default]
    Draft,
    Published,
}

impl std::fmt::Display for LpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LpStatus::Draft => write!(f, "draft"),
            LpStatus::Published => write!(f, "published"),
        }
    }
}

impl std::str::FromStr for LpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(LpStatus::Draft),
            "published" => Ok(LpStatus::Published),
            _ => Err(format!("Unknown landing page status: {}", s)),
        }
    }
}

/// An account that owns landing pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user identifier.
    pub id: String,
    /// Unique email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Bearer token for API access.
    #[serde(skip_serializing)]
    pub api_token: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a fresh API token
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            name: name.into(),
            api_token: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A landing page, the unit of content under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingPage {
    /// Unique landing page identifier.
    pub id: String,
    /// Owning user ID.
    pub owner_id: String,
    /// Human-readable name.
    pub name: String,
    /// Lifecycle status.
    pub status: LpStatus,
    /// When the page was created.
    pub created_at: DateTime<Utc>,
    /// When the page was last updated.
    pub updated_at: DateTime<Utc>,
}

impl LandingPage {
    /// Create a new draft landing page
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            status: LpStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: LpStatus) -> Self {
        self.status = status;
        self
    }
}

/// A testable section of a landing page (hero, CTA, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Unique component identifier.
    pub id: String,
    /// Owning landing page ID.
    pub lp_id: String,
    /// Section type (e.g. "hero", "cta").
    pub kind: String,
    /// Render order within the page; immutable once set.
    pub position: i64,
    /// Parameters passed to the content generator.
    pub generation_params: Option<serde_json::Value>,
    /// When the component was created.
    pub created_at: DateTime<Utc>,
}

impl Component {
    /// Create a new component
    pub fn new(lp_id: impl Into<String>, kind: impl Into<String>, position: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            lp_id: lp_id.into(),
            kind: kind.into(),
            position,
            generation_params: None,
            created_at: Utc::now(),
        }
    }

    /// Set the generation parameters
    pub fn with_generation_params(mut self, params: serde_json::Value) -> Self {
        self.generation_params = Some(params);
        self
    }
}

/// One content rendering of a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Unique variant identifier.
    pub id: String,
    /// Owning component ID.
    pub component_id: String,
    /// "a" (incumbent) or "b" (challenger).
    pub label: VariantLabel,
    /// HTML payload.
    pub html: String,
    /// Optional CSS payload.
    pub css: Option<String>,
    /// Optional JS payload.
    pub js: Option<String>,
    /// Optional metadata.
    pub metadata: Option<serde_json::Value>,
    /// When the variant was created.
    pub created_at: DateTime<Utc>,
    /// When the content was last updated (e.g. by applying a winner).
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Create a new variant
    pub fn new(
        component_id: impl Into<String>,
        label: VariantLabel,
        html: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            component_id: component_id.into(),
            label,
            html: html.into(),
            css: None,
            js: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the CSS payload
    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    /// Set the JS payload
    pub fn with_js(mut self, js: impl Into<String>) -> Self {
        self.js = Some(js.into());
        self
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Visitor device details carried in the session cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device classification.
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// Browser family, when the client reports one.
    pub browser: Option<String>,
}

/// One visitor's tracked encounter with a landing page.
///
/// Carries the per-component variant-assignment map; an entry is immutable
/// for the session's lifetime unless an explicit URL override forces it.
/// Sessions are mutated on every tracked event and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSession {
    /// Unique session identifier.
    pub id: String,
    /// Landing page being visited.
    pub lp_id: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Last tracked activity.
    pub last_activity_at: DateTime<Utc>,
    /// Device details.
    pub device: DeviceInfo,
    /// Referrer URL, if any.
    pub referrer: Option<String>,
    /// UTM source parameter.
    pub utm_source: Option<String>,
    /// UTM campaign parameter.
    pub utm_campaign: Option<String>,
    /// Component id -> assigned variant.
    pub assignments: HashMap<String, VariantLabel>,
    /// Whether this session has converted.
    pub has_converted: bool,
    /// Conversion type (e.g. "signup"), when converted.
    pub conversion_type: Option<String>,
    /// Time on page in seconds, set by exit events.
    pub duration_secs: Option<i64>,
    /// Deepest observed scroll position (0.0-1.0).
    pub max_scroll_depth: Option<f64>,
}

impl VisitorSession {
    /// Create a new session for a landing page
    pub fn new(lp_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            lp_id: lp_id.into(),
            started_at: now,
            last_activity_at: now,
            device: DeviceInfo::default(),
            referrer: None,
            utm_source: None,
            utm_campaign: None,
            assignments: HashMap::new(),
            has_converted: false,
            conversion_type: None,
            duration_secs: None,
            max_scroll_depth: None,
        }
    }

    /// Set the device details
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Set the referrer
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Set the UTM source and campaign
    pub fn with_utm(mut self, source: Option<String>, campaign: Option<String>) -> Self {
        self.utm_source = source;
        self.utm_campaign = campaign;
        self
    }

    /// The assigned variant for a component, if any
    pub fn assignment_for(&self, component_id: &str) -> Option<VariantLabel> {
        self.assignments.get(component_id).copied()
    }
}

/// An immutable, append-only tracking fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    /// Unique event identifier.
    pub id: String,
    /// Session the event belongs to.
    pub session_id: String,
    /// Landing page the event belongs to.
    pub lp_id: String,
    /// Component involved, for component-scoped events.
    pub component_id: Option<String>,
    /// Variant involved, for component-scoped events.
    pub variant: Option<VariantLabel>,
    /// Free-form event type; see [`EventKind`] for the known kinds.
    pub event_type: String,
    /// Arbitrary JSON payload.
    pub payload: Option<serde_json::Value>,
    /// When the event occurred (defaults to receipt time).
    pub occurred_at: DateTime<Utc>,
}

impl TrackedEvent {
    /// Create a new event occurring now
    pub fn new(
        session_id: impl Into<String>,
        lp_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            lp_id: lp_id.into(),
            component_id: None,
            variant: None,
            event_type: event_type.into(),
            payload: None,
            occurred_at: Utc::now(),
        }
    }

    /// Scope the event to a component and variant
    pub fn with_component(mut self, component_id: impl Into<String>, variant: VariantLabel) -> Self {
        self.component_id = Some(component_id.into());
        self.variant = Some(variant);
        self
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the occurrence time
    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// Denormalized per-(component, variant) counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStats {
    pub component_id: String,
    pub variant: VariantLabel,
    pub views: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub updated_at: DateTime<Utc>,
}

/// Counter column selected by [`Storage::increment_stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    Views,
    Clicks,
    Conversions,
}

impl StatField {
    pub(crate) fn column(self) -> &'static str {
        match self {
            StatField::Views => "views",
            StatField::Clicks => "clicks",
            StatField::Conversions => "conversions",
        }
    }
}

/// Canonical per-variant aggregate from the raw event log.
///
/// `visitors` counts distinct sessions that viewed the variant;
/// `conversions` counts distinct sessions that converted on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAggregate {
    pub visitors: i64,
    pub conversions: i64,
}

/// Canonical aggregates for both variants of a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAggregate {
    pub component_id: String,
    pub variant_a: VariantAggregate,
    pub variant_b: VariantAggregate,
}

/// Landing-page traffic summary for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpTrafficSummary {
    pub pageviews: i64,
    pub sessions: i64,
    pub conversions: i64,
    pub conversion_rate: f64,
}

/// Per-variant outcome embedded in a test result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantOutcome {
    pub visitors: i64,
    pub conversions: i64,
    pub conversion_rate: f64,
}

/// Snapshot of a component's A/B test, recomputed on each conversion.
///
/// The winner decision is recorded here but not enforced until the explicit
/// apply action; `applied_to_production`/`applied_at` survive recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Unique test identifier.
    pub id: String,
    /// Owning landing page.
    pub lp_id: String,
    /// Component under test (one result per component).
    pub component_id: String,
    /// Variant "a" outcome.
    pub variant_a: VariantOutcome,
    /// Variant "b" outcome.
    pub variant_b: VariantOutcome,
    /// Relative conversion-rate improvement of "b" over "a", percent.
    pub improvement_pct: f64,
    /// Confidence in the observed difference, percent.
    pub confidence_pct: f64,
    /// Whether the difference passed the significance gate.
    pub is_significant: bool,
    /// Winning variant, when decided.
    pub winning_variant: Option<VariantLabel>,
    /// Whether the winner has been applied to production.
    pub applied_to_production: bool,
    /// When the winner was applied.
    pub applied_at: Option<DateTime<Utc>>,
    /// When this snapshot was computed.
    pub computed_at: DateTime<Utc>,
}

/// Storage trait for database operations.
///
/// Defines all persistence operations for experiment entities, the event
/// log, denormalized counters, and test results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    // User operations

    /// Create a new user.
    async fn create_user(&self, user: &User) -> StorageResult<()>;
    /// Get a user by ID.
    async fn get_user(&self, id: &str) -> StorageResult<Option<User>>;
    /// Resolve a user from an API bearer token.
    async fn get_user_by_token(&self, token: &str) -> StorageResult<Option<User>>;

    // Landing page operations

    /// Create a new landing page.
    async fn create_landing_page(&self, lp: &LandingPage) -> StorageResult<()>;
    /// Get a landing page by ID.
    async fn get_landing_page(&self, id: &str) -> StorageResult<Option<LandingPage>>;
    /// List landing pages owned by a user.
    async fn list_landing_pages(&self, owner_id: &str) -> StorageResult<Vec<LandingPage>>;
    /// Delete a landing page by ID.
    async fn delete_landing_page(&self, id: &str) -> StorageResult<()>;

    // Component operations

    /// Create a new component.
    async fn create_component(&self, component: &Component) -> StorageResult<()>;
    /// Get a component by ID.
    async fn get_component(&self, id: &str) -> StorageResult<Option<Component>>;
    /// Get a landing page's components in render order.
    async fn get_lp_components(&self, lp_id: &str) -> StorageResult<Vec<Component>>;

    // Variant operations

    /// Create a new variant.
    async fn create_variant(&self, variant: &Variant) -> StorageResult<()>;
    /// Get a variant by ID.
    async fn get_variant(&self, id: &str) -> StorageResult<Option<Variant>>;
    /// Get both variants of a component.
    async fn get_component_variants(&self, component_id: &str) -> StorageResult<Vec<Variant>>;
    /// Get one variant of a component by label.
    async fn get_component_variant(
        &self,
        component_id: &str,
        label: VariantLabel,
    ) -> StorageResult<Option<Variant>>;
    /// Overwrite a variant's content fields (html/css/js/metadata).
    async fn update_variant_content(&self, variant: &Variant) -> StorageResult<()>;

    // Session operations

    /// Create a new visitor session.
    async fn create_session(&self, session: &VisitorSession) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<VisitorSession>>;
    /// Update an existing session.
    async fn update_session(&self, session: &VisitorSession) -> StorageResult<()>;

    // Event log operations

    /// Append an event. This write is the durability boundary for tracking.
    async fn insert_event(&self, event: &TrackedEvent) -> StorageResult<()>;
    /// Canonical distinct-session aggregates for a component, from the raw
    /// event log.
    async fn variant_aggregates(&self, component_id: &str) -> StorageResult<ComponentAggregate>;
    /// Traffic summary for a landing page, from the raw event log.
    async fn lp_traffic_summary(&self, lp_id: &str) -> StorageResult<LpTrafficSummary>;

    // Denormalized counter operations

    /// Atomically increment one counter for a (component, variant) pair.
    async fn increment_stat(
        &self,
        component_id: &str,
        variant: VariantLabel,
        field: StatField,
    ) -> StorageResult<()>;
    /// Get counters for one component.
    async fn get_component_stats(&self, component_id: &str) -> StorageResult<Vec<ComponentStats>>;
    /// Get counters for all components of a landing page.
    async fn get_lp_component_stats(&self, lp_id: &str) -> StorageResult<Vec<ComponentStats>>;
    /// Rebuild a component's counters from the raw event log.
    async fn rebuild_component_stats(&self, component_id: &str) -> StorageResult<()>;

    // Test result operations

    /// Insert or update a component's test result.
    ///
    /// On update, metric fields are replaced while the row id and the
    /// `applied_to_production`/`applied_at` flags are preserved.
    async fn upsert_test_result(&self, result: &TestResult) -> StorageResult<()>;
    /// Get a test result by ID.
    async fn get_test_result(&self, id: &str) -> StorageResult<Option<TestResult>>;
    /// Get a component's test result.
    async fn get_component_test_result(
        &self,
        component_id: &str,
    ) -> StorageResult<Option<TestResult>>;
    /// Get all test results for a landing page.
    async fn get_lp_test_results(&self, lp_id: &str) -> StorageResult<Vec<TestResult>>;
    /// Stamp a test result as applied to production.
    async fn mark_winner_applied(&self, id: &str, applied_at: DateTime<Utc>) -> StorageResult<()>;
}
