use crate::domain::session::{OrderRequest, ProviderOrder};
use crate::error::PaymentError;
use crate::domain::status::PaymentSessionStatus;
use crate::store::{
    immutability_violation, order_requires_pending, order_session_missing, DedupeOutcome, IdempotencyStore,
    OrderCreator,
};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

const ORDER_COLUMNS: &str =
    "session_id, provider_id, provider_order_id, amount_minor, currency, attempt_count, created_at";

/// Webhook dedupe and single-order-per-session guarantees, both enforced by
/// Postgres (unique indexes plus a transaction-scoped advisory lock) so they
/// hold across every running instance.
#[derive(Clone)]
pub struct IdempotencyRepo {
    pub pool: PgPool,
}

impl IdempotencyRepo {
    pub async fn insert_webhook_event(&self, provider: &str, event_id: &str, event_type: &str) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO webhook_events (provider, event_id, event_type, received_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn order_by_session(&self, session_id: &str) -> Result<Option<ProviderOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM provider_orders WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(map_order))
    }

    pub async fn order_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<ProviderOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM provider_orders WHERE provider_order_id = $1"
        ))
        .bind(provider_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(map_order))
    }

    async fn order_by_session_in(conn: &mut PgConnection, session_id: &str) -> Result<Option<ProviderOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM provider_orders WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(map_order))
    }

    /// Row-locks the session for the rest of the transaction, so no status
    /// write can land between the check and the order insert.
    async fn session_status_for_update(
        conn: &mut PgConnection,
        session_id: &str,
    ) -> Result<Option<PaymentSessionStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM payment_sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_optional(conn)
                .await?;

        Ok(status.map(|s| s.parse()).transpose()?)
    }

    async fn pin_session_amount(conn: &mut PgConnection, request: &OrderRequest) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_sessions
            SET amount_minor = $2, currency = $3, updated_at = now()
            WHERE id = $1 AND (amount_minor <> $2 OR currency <> $3)
            "#,
        )
        .bind(&request.session_id)
        .bind(request.amount_minor)
        .bind(request.currency.to_uppercase())
        .execute(conn)
        .await?;
        Ok(())
    }
}

fn map_order(row: PgRow) -> ProviderOrder {
    ProviderOrder {
        session_id: row.get("session_id"),
        provider_id: row.get("provider_id"),
        provider_order_id: row.get("provider_order_id"),
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        attempt_count: row.get("attempt_count"),
        created_at: row.get("created_at"),
    }
}

fn order_lock_key(session_id: &str) -> String {
    format!("provider_order:{session_id}")
}

#[async_trait]
impl IdempotencyStore for IdempotencyRepo {
    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
    ) -> Result<DedupeOutcome, PaymentError> {
        let inserted = self.insert_webhook_event(provider, event_id, event_type).await?;
        Ok(if inserted {
            DedupeOutcome::first()
        } else {
            DedupeOutcome::duplicate()
        })
    }

    async fn create_or_get_order(
        &self,
        request: &OrderRequest,
        creator: &dyn OrderCreator,
    ) -> Result<ProviderOrder, PaymentError> {
        let mut tx = self.pool.begin().await?;

        // Released on commit/rollback; concurrent initiates for this session
        // queue here instead of racing to the provider.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(order_lock_key(&request.session_id))
            .execute(&mut *tx)
            .await?;

        if let Some(existing) = Self::order_by_session_in(&mut *tx, &request.session_id).await? {
            if !existing.matches(request) {
                tx.rollback().await?;
                return Err(immutability_violation(&existing, request));
            }
            sqlx::query("UPDATE provider_orders SET attempt_count = attempt_count + 1 WHERE session_id = $1")
                .bind(&request.session_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(ProviderOrder {
                attempt_count: existing.attempt_count + 1,
                ..existing
            });
        }

        match Self::session_status_for_update(&mut *tx, &request.session_id).await? {
            None => return Err(order_session_missing(request)),
            Some(PaymentSessionStatus::Pending) => {}
            Some(status) => return Err(order_requires_pending(&request.session_id, status, request)),
        }
        Self::pin_session_amount(&mut *tx, request).await?;

        // Any failure from here drops `tx`, rolling back the amount pin too.
        let provider_order_id = creator.create_upstream_order(request).await?;

        sqlx::query(
            r#"
            INSERT INTO provider_orders (session_id, provider_id, provider_order_id, amount_minor, currency, attempt_count, created_at)
            VALUES ($1, $2, $3, $4, $5, 1, now())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&request.session_id)
        .bind(&request.provider_id)
        .bind(&provider_order_id)
        .bind(request.amount_minor)
        .bind(request.currency.to_uppercase())
        .execute(&mut *tx)
        .await?;

        let stored = Self::order_by_session_in(&mut *tx, &request.session_id)
            .await?
            .ok_or_else(|| {
                PaymentError::storage(format!(
                    "upstream order {} could not be mapped to session {}",
                    provider_order_id, request.session_id
                ))
                .with_correlation_id(&request.correlation_id)
            })?;
        tx.commit().await?;

        if stored.provider_order_id != provider_order_id {
            tracing::warn!(
                correlation_id = %request.correlation_id,
                session_id = %request.session_id,
                created = %provider_order_id,
                kept = %stored.provider_order_id,
                "duplicate upstream order created; converged on first persisted mapping"
            );
        }

        Ok(stored)
    }

    async fn find_order_by_session(&self, session_id: &str) -> Result<Option<ProviderOrder>, PaymentError> {
        Ok(self.order_by_session(session_id).await?)
    }

    async fn find_order_by_provider_order_id(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<ProviderOrder>, PaymentError> {
        Ok(self.order_by_provider_order_id(provider_order_id).await?)
    }
}
