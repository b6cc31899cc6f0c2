use crate::domain::session::{NewPaymentSession, PaymentSession, StatusUpdate};
use crate::domain::status::PaymentSessionStatus;
use crate::error::PaymentError;
use crate::store::SessionStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SESSION_COLUMNS: &str = "id, provider_id, status, amount_minor, currency, data, correlation_id, webhook_received_at, created_at, updated_at";

#[derive(Clone)]
pub struct SessionsRepo {
    pub pool: PgPool,
}

impl SessionsRepo {
    pub async fn find(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM payment_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_session).transpose()
    }

    pub async fn insert_if_absent(&self, session: &NewPaymentSession) -> Result<PaymentSession> {
        sqlx::query(
            r#"
            INSERT INTO payment_sessions (id, provider_id, status, amount_minor, currency, data, correlation_id, created_at, updated_at)
            VALUES ($1, $2, 'PENDING', $3, $4, '{}'::jsonb, $5, now(), now())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&session.id)
        .bind(&session.provider_id)
        .bind(session.amount_minor)
        .bind(session.currency.to_uppercase())
        .bind(&session.correlation_id)
        .execute(&self.pool)
        .await?;

        self.find(&session.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("payment session {} vanished after insert", session.id))
    }

    pub async fn update_status(&self, update: &StatusUpdate) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE payment_sessions
            SET status = $3,
                data = data || $4::jsonb,
                webhook_received_at = COALESCE($5, webhook_received_at),
                updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(&update.session_id)
        .bind(update.from.as_str())
        .bind(update.to.as_str())
        .bind(Value::Object(update.provider_refs.clone()))
        .bind(update.webhook_received_at)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn merge_data(&self, session_id: &str, refs: &Map<String, Value>) -> Result<()> {
        sqlx::query("UPDATE payment_sessions SET data = data || $2::jsonb, updated_at = now() WHERE id = $1")
            .bind(session_id)
            .bind(Value::Object(refs.clone()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_stale(
        &self,
        statuses: &[PaymentSessionStatus],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentSession>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM payment_sessions
            WHERE status = ANY($1) AND updated_at < $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#
        ))
        .bind(&statuses)
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_session).collect()
    }
}

fn map_session(row: PgRow) -> Result<PaymentSession> {
    let status: String = row.get("status");
    let data: Value = row.get("data");
    Ok(PaymentSession {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        status: status.parse()?,
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        data: match data {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        correlation_id: row.get("correlation_id"),
        webhook_received_at: row.get("webhook_received_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl SessionStore for SessionsRepo {
    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>, PaymentError> {
        Ok(self.find(session_id).await?)
    }

    async fn insert_if_absent(&self, session: NewPaymentSession) -> Result<PaymentSession, PaymentError> {
        Ok(SessionsRepo::insert_if_absent(self, &session).await?)
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<bool, PaymentError> {
        Ok(SessionsRepo::update_status(self, update).await?)
    }

    async fn merge_data(&self, session_id: &str, refs: &Map<String, Value>) -> Result<(), PaymentError> {
        Ok(SessionsRepo::merge_data(self, session_id, refs).await?)
    }

    async fn list_stale(
        &self,
        statuses: &[PaymentSessionStatus],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentSession>, PaymentError> {
        Ok(SessionsRepo::list_stale(self, statuses, older_than, limit).await?)
    }
}
