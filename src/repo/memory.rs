use crate::domain::session::{NewPaymentSession, OrderRequest, PaymentSession, ProviderOrder, StatusUpdate};
use crate::domain::status::PaymentSessionStatus;
use crate::error::PaymentError;
use crate::store::{
    immutability_violation, order_requires_pending, order_session_missing, DedupeOutcome, IdempotencyStore,
    OrderCreator, SessionStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// In-process store for tests and local development.
///
/// Keyed locks here only serialize callers inside one process; deployments
/// with more than one instance must use the Postgres repos.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<String, PaymentSession>>>,
    orders: Arc<RwLock<HashMap<String, ProviderOrder>>>,
    events: Arc<RwLock<HashSet<(String, String)>>>,
    order_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn keyed_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.order_locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>, PaymentError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn insert_if_absent(&self, session: NewPaymentSession) -> Result<PaymentSession, PaymentError> {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let stored = sessions
            .entry(session.id.clone())
            .or_insert_with(|| PaymentSession {
                id: session.id,
                provider_id: session.provider_id,
                status: PaymentSessionStatus::Pending,
                amount_minor: session.amount_minor,
                currency: session.currency,
                data: Map::new(),
                correlation_id: session.correlation_id,
                webhook_received_at: None,
                created_at: now,
                updated_at: now,
            });
        Ok(stored.clone())
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<bool, PaymentError> {
        let mut sessions = self.sessions.write().await;
        let Some(s) = sessions.get_mut(&update.session_id) else {
            return Ok(false);
        };
        if s.status != update.from {
            return Ok(false);
        }
        s.status = update.to;
        for (k, v) in &update.provider_refs {
            s.data.insert(k.clone(), v.clone());
        }
        if update.webhook_received_at.is_some() {
            s.webhook_received_at = update.webhook_received_at;
        }
        s.updated_at = Utc::now();
        Ok(true)
    }

    async fn merge_data(&self, session_id: &str, refs: &Map<String, Value>) -> Result<(), PaymentError> {
        let mut sessions = self.sessions.write().await;
        if let Some(s) = sessions.get_mut(session_id) {
            for (k, v) in refs {
                s.data.insert(k.clone(), v.clone());
            }
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_stale(
        &self,
        statuses: &[PaymentSessionStatus],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentSession>, PaymentError> {
        let sessions = self.sessions.read().await;
        let mut stale: Vec<PaymentSession> = sessions
            .values()
            .filter(|s| statuses.contains(&s.status) && s.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.updated_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
        _event_type: &str,
    ) -> Result<DedupeOutcome, PaymentError> {
        let inserted = self
            .events
            .write()
            .await
            .insert((provider.to_string(), event_id.to_string()));
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
        let lock = self.keyed_lock(&request.session_id).await;
        let _held = lock.lock().await;

        if let Some(existing) = self.orders.write().await.get_mut(&request.session_id) {
            if !existing.matches(request) {
                return Err(immutability_violation(existing, request));
            }
            existing.attempt_count += 1;
            return Ok(existing.clone());
        }

        match self.sessions.read().await.get(&request.session_id) {
            None => return Err(order_session_missing(request)),
            Some(s) if s.status != PaymentSessionStatus::Pending => {
                return Err(order_requires_pending(&s.id, s.status, request));
            }
            Some(_) => {}
        }

        let provider_order_id = creator.create_upstream_order(request).await?;

        let mut orders = self.orders.write().await;
        if let Some(other) = orders
            .values()
            .find(|o| o.provider_order_id == provider_order_id && o.session_id != request.session_id)
        {
            return Err(PaymentError::storage(format!(
                "upstream order {} is already mapped to session {}",
                provider_order_id, other.session_id
            )));
        }
        let stored = orders
            .entry(request.session_id.clone())
            .or_insert_with(|| ProviderOrder {
                session_id: request.session_id.clone(),
                provider_id: request.provider_id.clone(),
                provider_order_id,
                amount_minor: request.amount_minor,
                currency: request.currency.to_uppercase(),
                attempt_count: 1,
                created_at: Utc::now(),
            });
        let stored = stored.clone();
        drop(orders);

        if let Some(s) = self.sessions.write().await.get_mut(&request.session_id) {
            if s.amount_minor != stored.amount_minor || s.currency != stored.currency {
                s.amount_minor = stored.amount_minor;
                s.currency = stored.currency.clone();
                s.updated_at = Utc::now();
            }
        }
        Ok(stored)
    }

    async fn find_order_by_session(&self, session_id: &str) -> Result<Option<ProviderOrder>, PaymentError> {
        Ok(self.orders.read().await.get(session_id).cloned())
    }

    async fn find_order_by_provider_order_id(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<ProviderOrder>, PaymentError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.provider_order_id == provider_order_id)
            .cloned())
    }
}
