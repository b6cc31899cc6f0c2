use crate::config::AppConfig;
use crate::domain::context::new_correlation_id;
use crate::domain::session::PaymentSession;
use crate::domain::status::{OnInvalid, PaymentSessionStatus};
use crate::error::PaymentError;
use crate::service::provider_router::ProviderRouter;
use crate::service::status_sync::apply_provider_status;
use crate::store::{IdempotencyStore, SessionStore};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub candidates: usize,
    pub reconciled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<ReconcileFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileFailure {
    pub payment_session_id: String,
    pub code: String,
    pub message: String,
}

enum CandidateOutcome {
    Reconciled,
    Skipped,
}

/// Polls providers for sessions that never received a terminal webhook.
#[derive(Clone)]
pub struct Reconciler {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<dyn SessionStore>,
    pub orders: Arc<dyn IdempotencyStore>,
    pub router: ProviderRouter,
}

impl Reconciler {
    pub fn new(
        config: Arc<AppConfig>,
        sessions: Arc<dyn SessionStore>,
        orders: Arc<dyn IdempotencyStore>,
        router: ProviderRouter,
    ) -> Self {
        Self {
            config,
            sessions,
            orders,
            router,
        }
    }

    pub async fn run_forever(self, interval: std::time::Duration) {
        loop {
            match self
                .reconcile(Utc::now(), self.config.reconcile_stuck_minutes, self.config.reconcile_max_sessions)
                .await
            {
                Ok(report) if report.candidates > 0 => tracing::info!(
                    scanned = report.scanned,
                    reconciled = report.reconciled,
                    skipped = report.skipped,
                    failed = report.failed,
                    "reconciliation pass finished"
                ),
                Ok(_) => {}
                Err(err) => tracing::error!("reconciliation pass failed: {}", err),
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn reconcile(
        &self,
        now: DateTime<Utc>,
        stuck_minutes: i64,
        max_sessions: i64,
    ) -> Result<ReconcileReport, PaymentError> {
        let correlation_id = new_correlation_id();
        let older_than = now - Duration::minutes(stuck_minutes.max(0));
        let stale = self
            .sessions
            .list_stale(&PaymentSessionStatus::AWAITING_PROVIDER, older_than, max_sessions.max(0))
            .await?;

        let mut report = ReconcileReport {
            scanned: stale.len(),
            ..ReconcileReport::default()
        };

        for session in stale {
            report.candidates += 1;

            match self.reconcile_one(&session, &correlation_id).await {
                Ok(CandidateOutcome::Reconciled) => report.reconciled += 1,
                Ok(CandidateOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        payment_session_id = %session.id,
                        code = %err.code,
                        "reconciliation candidate aborted: {}",
                        err.message
                    );
                    report.failed += 1;
                    report.errors.push(ReconcileFailure {
                        payment_session_id: session.id.clone(),
                        code: err.code,
                        message: err.message,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn reconcile_one(&self, session: &PaymentSession, correlation_id: &str) -> Result<CandidateOutcome, PaymentError> {
        let selection = self.router.provider_for(session, correlation_id)?;
        let Some(order) = self.orders.find_order_by_session(&session.id).await? else {
            tracing::debug!(payment_session_id = %session.id, "no upstream order yet; nothing to poll");
            return Ok(CandidateOutcome::Skipped);
        };

        let reported = selection
            .gateway
            .fetch_status(correlation_id, &order)
            .await
            .map_err(|cause| {
                PaymentError::provider_unavailable(format!(
                    "status poll for session {} on {} failed: {}",
                    session.id, selection.provider_id, cause.message
                ))
                .with_code("RECONCILE_POLL_FAILED")
                .with_details(serde_json::json!({
                    "payment_session_id": session.id,
                    "provider": selection.provider_id,
                    "cause_code": cause.code,
                    "cause": cause.details,
                }))
                .with_correlation_id(correlation_id)
            })?;

        let synced =
            apply_provider_status(self.sessions.as_ref(), session, &reported, OnInvalid::Noop, correlation_id).await?;
        if !synced.persisted {
            return Ok(CandidateOutcome::Skipped);
        }

        tracing::info!(
            correlation_id,
            payment_session_id = %session.id,
            provider = %selection.provider_id,
            from = synced.transition.from.as_str(),
            to = synced.transition.to.as_str(),
            "payment session reconciled from provider status"
        );
        Ok(CandidateOutcome::Reconciled)
    }
}
