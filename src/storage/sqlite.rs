use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{
    Component, ComponentAggregate, ComponentStats, DeviceInfo, LandingPage, LpTrafficSummary,
    StatField, Storage, TestResult, TrackedEvent, User, Variant, VariantAggregate, VariantLabel,
    VariantOutcome, VisitorSession,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory storage instance, mainly for tests.
    ///
    /// A single connection keeps the in-memory database alive for the
    /// pool's lifetime.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_user(&self, user: &User) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, api_token, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.api_token)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, name, api_token, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_user_by_token(&self, token: &str) -> StorageResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, name, api_token, created_at
            FROM users
            WHERE api_token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn create_landing_page(&self, lp: &LandingPage) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO landing_pages (id, owner_id, name, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lp.id)
        .bind(&lp.owner_id)
        .bind(&lp.name)
        .bind(lp.status.to_string())
        .bind(lp.created_at.to_rfc3339())
        .bind(lp.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_landing_page(&self, id: &str) -> StorageResult<Option<LandingPage>> {
        let row: Option<LandingPageRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, name, status, created_at, updated_at
            FROM landing_pages
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_landing_pages(&self, owner_id: &str) -> StorageResult<Vec<LandingPage>> {
        let rows: Vec<LandingPageRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, name, status, created_at, updated_at
            FROM landing_pages
            WHERE owner_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete_landing_page(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM landing_pages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_component(&self, component: &Component) -> StorageResult<()> {
        let params = component
            .generation_params
            .as_ref()
            .map(|p| serde_json::to_string(p).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO components (id, lp_id, kind, position, generation_params, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&component.id)
        .bind(&component.lp_id)
        .bind(&component.kind)
        .bind(component.position)
        .bind(&params)
        .bind(component.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_component(&self, id: &str) -> StorageResult<Option<Component>> {
        let row: Option<ComponentRow> = sqlx::query_as(
            r#"
            SELECT id, lp_id, kind, position, generation_params, created_at
            FROM components
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_lp_components(&self, lp_id: &str) -> StorageResult<Vec<Component>> {
        let rows: Vec<ComponentRow> = sqlx::query_as(
            r#"
            SELECT id, lp_id, kind, position, generation_params, created_at
            FROM components
            WHERE lp_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(lp_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_variant(&self, variant: &Variant) -> StorageResult<()> {
        let metadata = variant
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO variants (id, component_id, label, html, css, js, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.component_id)
        .bind(variant.label.to_string())
        .bind(&variant.html)
        .bind(&variant.css)
        .bind(&variant.js)
        .bind(&metadata)
        .bind(variant.created_at.to_rfc3339())
        .bind(variant.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_variant(&self, id: &str) -> StorageResult<Option<Variant>> {
        let row: Option<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, component_id, label, html, css, js, metadata, created_at, updated_at
            FROM variants
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_component_variants(&self, component_id: &str) -> StorageResult<Vec<Variant>> {
        let rows: Vec<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, component_id, label, html, css, js, metadata, created_at, updated_at
            FROM variants
            WHERE component_id = ?
            ORDER BY label ASC
            "#,
        )
        .bind(component_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_component_variant(
        &self,
        component_id: &str,
        label: VariantLabel,
    ) -> StorageResult<Option<Variant>> {
        let row: Option<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, component_id, label, html, css, js, metadata, created_at, updated_at
            FROM variants
            WHERE component_id = ? AND label = ?
            "#,
        )
        .bind(component_id)
        .bind(label.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_variant_content(&self, variant: &Variant) -> StorageResult<()> {
        let metadata = variant
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default());

        let result = sqlx::query(
            r#"
            UPDATE variants
            SET html = ?, css = ?, js = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&variant.html)
        .bind(&variant.css)
        .bind(&variant.js)
        .bind(&metadata)
        .bind(variant.updated_at.to_rfc3339())
        .bind(&variant.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::VariantNotFound {
                component_id: variant.component_id.clone(),
                label: variant.label.to_string(),
            });
        }

        Ok(())
    }

    async fn create_session(&self, session: &VisitorSession) -> StorageResult<()> {
        let assignments =
            serde_json::to_string(&session.assignments).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, lp_id, started_at, last_activity_at, device_type, browser,
                referrer, utm_source, utm_campaign, assignments, has_converted,
                conversion_type, duration_secs, max_scroll_depth
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.lp_id)
        .bind(session.started_at.to_rfc3339())
        .bind(session.last_activity_at.to_rfc3339())
        .bind(session.device.device_type.to_string())
        .bind(&session.device.browser)
        .bind(&session.referrer)
        .bind(&session.utm_source)
        .bind(&session.utm_campaign)
        .bind(&assignments)
        .bind(session.has_converted)
        .bind(&session.conversion_type)
        .bind(session.duration_secs)
        .bind(session.max_scroll_depth)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<VisitorSession>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, lp_id, started_at, last_activity_at, device_type, browser,
                   referrer, utm_source, utm_campaign, assignments, has_converted,
                   conversion_type, duration_secs, max_scroll_depth
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_session(&self, session: &VisitorSession) -> StorageResult<()> {
        let assignments =
            serde_json::to_string(&session.assignments).unwrap_or_else(|_| "{}".to_string());

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET last_activity_at = ?, device_type = ?, browser = ?, referrer = ?,
                utm_source = ?, utm_campaign = ?, assignments = ?, has_converted = ?,
                conversion_type = ?, duration_secs = ?, max_scroll_depth = ?
            WHERE id = ?
            "#,
        )
        .bind(session.last_activity_at.to_rfc3339())
        .bind(session.device.device_type.to_string())
        .bind(&session.device.browser)
        .bind(&session.referrer)
        .bind(&session.utm_source)
        .bind(&session.utm_campaign)
        .bind(&assignments)
        .bind(session.has_converted)
        .bind(&session.conversion_type)
        .bind(session.duration_secs)
        .bind(session.max_scroll_depth)
        .bind(&session.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: session.id.clone(),
            });
        }

        Ok(())
    }

    async fn insert_event(&self, event: &TrackedEvent) -> StorageResult<()> {
        let payload = event
            .payload
            .as_ref()
            .map(|p| serde_json::to_string(p).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO events (id, session_id, lp_id, component_id, variant, event_type, payload, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.session_id)
        .bind(&event.lp_id)
        .bind(&event.component_id)
        .bind(event.variant.map(|v| v.to_string()))
        .bind(&event.event_type)
        .bind(&payload)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn variant_aggregates(&self, component_id: &str) -> StorageResult<ComponentAggregate> {
        let rows: Vec<AggregateRow> = sqlx::query_as(
            r#"
            SELECT
                variant,
                COUNT(DISTINCT CASE WHEN event_type IN ('component_view', 'view') THEN session_id END) AS visitors,
                COUNT(DISTINCT CASE WHEN event_type = 'conversion' THEN session_id END) AS conversions
            FROM events
            WHERE component_id = ? AND variant IN ('a', 'b')
            GROUP BY variant
            "#,
        )
        .bind(component_id)
        .fetch_all(&self.pool)
        .await?;

        let mut aggregate = ComponentAggregate {
            component_id: component_id.to_string(),
            variant_a: VariantAggregate::default(),
            variant_b: VariantAggregate::default(),
        };

        for row in rows {
            let counts = VariantAggregate {
                visitors: row.visitors,
                conversions: row.conversions,
            };
            match row.variant.parse() {
                Ok(VariantLabel::A) => aggregate.variant_a = counts,
                Ok(VariantLabel::B) => aggregate.variant_b = counts,
                Err(_) => {}
            }
        }

        Ok(aggregate)
    }

    async fn lp_traffic_summary(&self, lp_id: &str) -> StorageResult<LpTrafficSummary> {
        let row: TrafficRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(CASE WHEN event_type = 'pageview' THEN 1 END) AS pageviews,
                COUNT(DISTINCT session_id) AS sessions,
                COUNT(DISTINCT CASE WHEN event_type = 'conversion' THEN session_id END) AS conversions
            FROM events
            WHERE lp_id = ?
            "#,
        )
        .bind(lp_id)
        .fetch_one(&self.pool)
        .await?;

        let conversion_rate = if row.sessions > 0 {
            row.conversions as f64 / row.sessions as f64
        } else {
            0.0
        };

        Ok(LpTrafficSummary {
            pageviews: row.pageviews,
            sessions: row.sessions,
            conversions: row.conversions,
            conversion_rate,
        })
    }

    async fn increment_stat(
        &self,
        component_id: &str,
        variant: VariantLabel,
        field: StatField,
    ) -> StorageResult<()> {
        let column = field.column();
        // Single upsert keyed on (component_id, variant): atomic under
        // concurrent writers, no find-or-create window.
        let sql = format!(
            r#"
            INSERT INTO component_stats (component_id, variant, {column}, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(component_id, variant)
            DO UPDATE SET {column} = {column} + 1, updated_at = excluded.updated_at
            "#
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(component_id)
            .bind(variant.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn get_component_stats(&self, component_id: &str) -> StorageResult<Vec<ComponentStats>> {
        let rows: Vec<ComponentStatsRow> = sqlx::query_as(
            r#"
            SELECT component_id, variant, views, clicks, conversions, updated_at
            FROM component_stats
            WHERE component_id = ?
            ORDER BY variant ASC
            "#,
        )
        .bind(component_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_lp_component_stats(&self, lp_id: &str) -> StorageResult<Vec<ComponentStats>> {
        let rows: Vec<ComponentStatsRow> = sqlx::query_as(
            r#"
            SELECT cs.component_id, cs.variant, cs.views, cs.clicks, cs.conversions, cs.updated_at
            FROM component_stats cs
            JOIN components c ON c.id = cs.component_id
            WHERE c.lp_id = ?
            ORDER BY c.position ASC, cs.variant ASC
            "#,
        )
        .bind(lp_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn rebuild_component_stats(&self, component_id: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM component_stats WHERE component_id = ?")
            .bind(component_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO component_stats (component_id, variant, views, clicks, conversions, updated_at)
            SELECT
                component_id,
                variant,
                COUNT(CASE WHEN event_type IN ('component_view', 'view') THEN 1 END),
                COUNT(CASE WHEN event_type = 'click' THEN 1 END),
                COUNT(CASE WHEN event_type = 'conversion' THEN 1 END),
                ?
            FROM events
            WHERE component_id = ? AND variant IN ('a', 'b')
            GROUP BY component_id, variant
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(component_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn upsert_test_result(&self, result: &TestResult) -> StorageResult<()> {
        // Metric fields are replaced on conflict; the row id and the
        // applied_to_production/applied_at stamps are preserved so an
        // applied result never flaps back to undecided.
        sqlx::query(
            r#"
            INSERT INTO test_results (
                id, lp_id, component_id,
                visitors_a, conversions_a, rate_a,
                visitors_b, conversions_b, rate_b,
                improvement_pct, confidence_pct, is_significant, winning_variant,
                applied_to_production, applied_at, computed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(component_id) DO UPDATE SET
                visitors_a = excluded.visitors_a,
                conversions_a = excluded.conversions_a,
                rate_a = excluded.rate_a,
                visitors_b = excluded.visitors_b,
                conversions_b = excluded.conversions_b,
                rate_b = excluded.rate_b,
                improvement_pct = excluded.improvement_pct,
                confidence_pct = excluded.confidence_pct,
                is_significant = excluded.is_significant,
                winning_variant = excluded.winning_variant,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(&result.id)
        .bind(&result.lp_id)
        .bind(&result.component_id)
        .bind(result.variant_a.visitors)
        .bind(result.variant_a.conversions)
        .bind(result.variant_a.conversion_rate)
        .bind(result.variant_b.visitors)
        .bind(result.variant_b.conversions)
        .bind(result.variant_b.conversion_rate)
        .bind(result.improvement_pct)
        .bind(result.confidence_pct)
        .bind(result.is_significant)
        .bind(result.winning_variant.map(|v| v.to_string()))
        .bind(result.applied_to_production)
        .bind(result.applied_at.map(|t| t.to_rfc3339()))
        .bind(result.computed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_test_result(&self, id: &str) -> StorageResult<Option<TestResult>> {
        let row: Option<TestResultRow> = sqlx::query_as(
            r#"
            SELECT id, lp_id, component_id,
                   visitors_a, conversions_a, rate_a,
                   visitors_b, conversions_b, rate_b,
                   improvement_pct, confidence_pct, is_significant, winning_variant,
                   applied_to_production, applied_at, computed_at
            FROM test_results
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_component_test_result(
        &self,
        component_id: &str,
    ) -> StorageResult<Option<TestResult>> {
        let row: Option<TestResultRow> = sqlx::query_as(
            r#"
            SELECT id, lp_id, component_id,
                   visitors_a, conversions_a, rate_a,
                   visitors_b, conversions_b, rate_b,
                   improvement_pct, confidence_pct, is_significant, winning_variant,
                   applied_to_production, applied_at, computed_at
            FROM test_results
            WHERE component_id = ?
            "#,
        )
        .bind(component_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_lp_test_results(&self, lp_id: &str) -> StorageResult<Vec<TestResult>> {
        let rows: Vec<TestResultRow> = sqlx::query_as(
            r#"
            SELECT id, lp_id, component_id,
                   visitors_a, conversions_a, rate_a,
                   visitors_b, conversions_b, rate_b,
                   improvement_pct, confidence_pct, is_significant, winning_variant,
                   applied_to_production, applied_at, computed_at
            FROM test_results
            WHERE lp_id = ?
            ORDER BY computed_at ASC
            "#,
        )
        .bind(lp_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn mark_winner_applied(&self, id: &str, applied_at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE test_results
            SET applied_to_production = 1, applied_at = ?
            WHERE id = ?
            "#,
        )
        .bind(applied_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Query {
                message: format!("test result not found: {}", id),
            });
        }

        Ok(())
    }
}

// Internal row types for SQLx mapping

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    api_token: String,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            api_token: row.api_token,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LandingPageRow {
    id: String,
    owner_id: String,
    name: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl From<LandingPageRow> for LandingPage {
    fn from(row: LandingPageRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            status: row.status.parse().unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ComponentRow {
    id: String,
    lp_id: String,
    kind: String,
    position: i64,
    generation_params: Option<String>,
    created_at: String,
}

impl From<ComponentRow> for Component {
    fn from(row: ComponentRow) -> Self {
        Self {
            id: row.id,
            lp_id: row.lp_id,
            kind: row.kind,
            position: row.position,
            generation_params: row.generation_params.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: String,
    component_id: String,
    label: String,
    html: String,
    css: Option<String>,
    js: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: row.id,
            component_id: row.component_id,
            label: row.label.parse().unwrap_or(VariantLabel::A),
            html: row.html,
            css: row.css,
            js: row.js,
            metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    lp_id: String,
    started_at: String,
    last_activity_at: String,
    device_type: String,
    browser: Option<String>,
    referrer: Option<String>,
    utm_source: Option<String>,
    utm_campaign: Option<String>,
    assignments: String,
    has_converted: bool,
    conversion_type: Option<String>,
    duration_secs: Option<i64>,
    max_scroll_depth: Option<f64>,
}

impl From<SessionRow> for VisitorSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            lp_id: row.lp_id,
            started_at: parse_timestamp(&row.started_at),
            last_activity_at: parse_timestamp(&row.last_activity_at),
            device: DeviceInfo {
                device_type: row.device_type.parse().unwrap_or_default(),
                browser: row.browser,
            },
            referrer: row.referrer,
            utm_source: row.utm_source,
            utm_campaign: row.utm_campaign,
            assignments: serde_json::from_str(&row.assignments).unwrap_or_default(),
            has_converted: row.has_converted,
            conversion_type: row.conversion_type,
            duration_secs: row.duration_secs,
            max_scroll_depth: row.max_scroll_depth,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    variant: String,
    visitors: i64,
    conversions: i64,
}

#[derive(sqlx::FromRow)]
struct TrafficRow {
    pageviews: i64,
    sessions: i64,
    conversions: i64,
}

#[derive(sqlx::FromRow)]
struct ComponentStatsRow {
    component_id: String,
    variant: String,
    views: i64,
    clicks: i64,
    conversions: i64,
    updated_at: String,
}

impl From<ComponentStatsRow> for ComponentStats {
    fn from(row: ComponentStatsRow) -> Self {
        Self {
            component_id: row.component_id,
            variant: row.variant.parse().unwrap_or(VariantLabel::A),
            views: row.views,
            clicks: row.clicks,
            conversions: row.conversions,
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TestResultRow {
    id: String,
    lp_id: String,
    component_id: String,
    visitors_a: i64,
    conversions_a: i64,
    rate_a: f64,
    visitors_b: i64,
    conversions_b: i64,
    rate_b: f64,
    improvement_pct: f64,
    confidence_pct: f64,
    is_significant: bool,
    winning_variant: Option<String>,
    applied_to_production: bool,
    applied_at: Option<String>,
    computed_at: String,
}

impl From<TestResultRow> for TestResult {
    fn from(row: TestResultRow) -> Self {
        Self {
            id: row.id,
            lp_id: row.lp_id,
            component_id: row.component_id,
            variant_a: VariantOutcome {
                visitors: row.visitors_a,
                conversions: row.conversions_a,
                conversion_rate: row.rate_a,
            },
            variant_b: VariantOutcome {
                visitors: row.visitors_b,
                conversions: row.conversions_b,
                conversion_rate: row.rate_b,
            },
            improvement_pct: row.improvement_pct,
            confidence_pct: row.confidence_pct,
            is_significant: row.is_significant,
            winning_variant: row.winning_variant.and_then(|s| s.parse().ok()),
            applied_to_production: row.applied_to_production,
            applied_at: row.applied_at.as_deref().map(parse_timestamp),
            computed_at: parse_timestamp(&row.computed_at),
        }
    }
}
