//! Test-result recomputation and winner application.
//!
//! Recomputation aggregates distinct sessions from the raw event log (the
//! canonical source), evaluates significance, and upserts the per-component
//! snapshot. Applying a winner is a manual, one-way transition that
//! overwrites the losing variant's content.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{SignificanceEvaluator, VariantCounts};
use crate::error::{ApiError, AppResult};
use crate::storage::{Storage, TestResult, VariantOutcome};

/// Recomputes and applies A/B test results for components.
#[derive(Clone)]
pub struct TestReporter {
    storage: Arc<dyn Storage>,
    evaluator: SignificanceEvaluator,
}

impl TestReporter {
    /// Create a new reporter
    pub fn new(storage: Arc<dyn Storage>, evaluator: SignificanceEvaluator) -> Self {
        Self { storage, evaluator }
    }

    /// Recompute a component's test result from the raw event log.
    ///
    /// The Undecided -> Decided transition happens here: the stored snapshot
    /// records the winner once the evaluation crosses the significance gate.
    /// Apply stamps on an existing snapshot are preserved.
    pub async fn recompute(&self, component_id: &str) -> AppResult<TestResult> {
        let component = self
            .storage
            .get_component(component_id)
            .await?
            .ok_or_else(|| ApiError::not_found("component", component_id))?;

        let aggregates = self.storage.variant_aggregates(component_id).await?;
        let a = VariantCounts::new(aggregates.variant_a.visitors, aggregates.variant_a.conversions);
        let b = VariantCounts::new(aggregates.variant_b.visitors, aggregates.variant_b.conversions);
        let evaluation = self.evaluator.evaluate(a, b);

        let existing = self.storage.get_component_test_result(component_id).await?;
        let result = TestResult {
            id: existing
                .as_ref()
                .map(|r| r.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            lp_id: component.lp_id,
            component_id: component_id.to_string(),
            variant_a: VariantOutcome {
                visitors: a.visitors,
                conversions: a.conversions,
                conversion_rate: evaluation.rate_a,
            },
            variant_b: VariantOutcome {
                visitors: b.visitors,
                conversions: b.conversions,
                conversion_rate: evaluation.rate_b,
            },
            improvement_pct: evaluation.improvement_pct,
            confidence_pct: evaluation.confidence_pct,
            is_significant: evaluation.is_significant,
            winning_variant: evaluation.winning_variant,
            applied_to_production: existing
                .as_ref()
                .map(|r| r.applied_to_production)
                .unwrap_or(false),
            applied_at: existing.as_ref().and_then(|r| r.applied_at),
            computed_at: Utc::now(),
        };

        self.storage.upsert_test_result(&result).await?;

        debug!(
            component_id = %component_id,
            improvement_pct = result.improvement_pct,
            confidence_pct = result.confidence_pct,
            significant = result.is_significant,
            "Test result recomputed"
        );

        Ok(result)
    }

    /// Apply a decided winner to production.
    ///
    /// Overwrites the losing variant's content fields with the winner's and
    /// stamps the test result. Rejected while the test is undecided, when
    /// the submitted variant is not the recorded winner, or after a previous
    /// apply (there is no rollback path).
    pub async fn apply_winner(
        &self,
        test_id: &str,
        component_id: &str,
        variant_id: &str,
    ) -> AppResult<TestResult> {
        let result = self
            .storage
            .get_test_result(test_id)
            .await?
            .ok_or_else(|| ApiError::not_found("test", test_id))?;

        if result.component_id != component_id {
            return Err(ApiError::validation(
                "componentId",
                "does not match the component under test",
            )
            .into());
        }

        if result.applied_to_production {
            return Err(ApiError::validation("testId", "winner already applied").into());
        }

        let winner_label = match (result.is_significant, result.winning_variant) {
            (true, Some(label)) => label,
            _ => {
                return Err(
                    ApiError::validation("testId", "test has not decided a winner").into(),
                )
            }
        };

        let winner = self
            .storage
            .get_component_variant(component_id, winner_label)
            .await?
            .ok_or_else(|| ApiError::not_found("variant", winner_label.to_string()))?;

        if winner.id != variant_id {
            return Err(ApiError::validation(
                "variantId",
                "is not the winning variant of this test",
            )
            .into());
        }

        let mut loser = self
            .storage
            .get_component_variant(component_id, winner_label.other())
            .await?
            .ok_or_else(|| ApiError::not_found("variant", winner_label.other().to_string()))?;

        loser.html = winner.html.clone();
        loser.css = winner.css.clone();
        loser.js = winner.js.clone();
        loser.metadata = winner.metadata.clone();
        loser.updated_at = Utc::now();
        self.storage.update_variant_content(&loser).await?;

        let applied_at = Utc::now();
        self.storage.mark_winner_applied(test_id, applied_at).await?;

        info!(
            test_id = %test_id,
            component_id = %component_id,
            winner = %winner_label,
            "Winning variant applied to production"
        );

        Ok(TestResult {
            applied_to_production: true,
            applied_at: Some(applied_at),
            ..result
        })
    }
}
