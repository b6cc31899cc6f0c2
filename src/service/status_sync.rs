use crate::domain::session::{PaymentSession, StatusUpdate};
use crate::domain::status::{transition, OnInvalid, PaymentSessionStatus, TransitionOutcome};
use crate::error::PaymentError;
use crate::gateways::ProviderStatus;
use crate::store::SessionStore;

#[derive(Debug, Clone, Copy)]
pub struct SyncOutcome {
    pub transition: TransitionOutcome,
    /// `false` when nothing changed or a concurrent writer moved the session first.
    pub persisted: bool,
}

impl SyncOutcome {
    pub fn status(&self) -> PaymentSessionStatus {
        if self.persisted {
            self.transition.to
        } else {
            self.transition.from
        }
    }
}

/// Applies what the provider reported to the stored session. Writes only a
/// valid, changing transition, and only through the status compare-and-set.
pub async fn apply_provider_status(
    sessions: &dyn SessionStore,
    session: &PaymentSession,
    reported: &ProviderStatus,
    on_invalid: OnInvalid,
    correlation_id: &str,
) -> Result<SyncOutcome, PaymentError> {
    let outcome = transition(session.status, reported.status, on_invalid, Some(correlation_id))?;
    if !(outcome.valid && outcome.changed) {
        return Ok(SyncOutcome {
            transition: outcome,
            persisted: false,
        });
    }

    let persisted = sessions
        .update_status(&StatusUpdate {
            session_id: session.id.clone(),
            from: outcome.from,
            to: outcome.to,
            provider_refs: reported.refs.clone(),
            webhook_received_at: None,
        })
        .await?;

    Ok(SyncOutcome {
        transition: outcome,
        persisted,
    })
}
