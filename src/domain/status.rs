use crate::error::{ErrorKind, PaymentError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

/// Provider-agnostic payment state shared by every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentSessionStatus {
    Pending,
    Authorized,
    Captured,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentSessionStatus {
    pub const ALL: [PaymentSessionStatus; 6] = [
        PaymentSessionStatus::Pending,
        PaymentSessionStatus::Authorized,
        PaymentSessionStatus::Captured,
        PaymentSessionStatus::Failed,
        PaymentSessionStatus::Cancelled,
        PaymentSessionStatus::Refunded,
    ];

    /// Statuses the reconciler polls for. Captured sessions only move on a
    /// refund, which is always initiated locally.
    pub const AWAITING_PROVIDER: [PaymentSessionStatus; 2] =
        [PaymentSessionStatus::Pending, PaymentSessionStatus::Authorized];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentSessionStatus::Pending => "PENDING",
            PaymentSessionStatus::Authorized => "AUTHORIZED",
            PaymentSessionStatus::Captured => "CAPTURED",
            PaymentSessionStatus::Failed => "FAILED",
            PaymentSessionStatus::Cancelled => "CANCELLED",
            PaymentSessionStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_terminal(self) -> bool {
        allowed_next(self).is_empty()
    }
}

impl fmt::Display for PaymentSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentSessionStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentSessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PaymentError::validation(format!("unknown payment status `{s}`")))
    }
}

/// What to do when a requested edge is not in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnInvalid {
    Throw,
    /// Leave state untouched and report `valid=false`. Required wherever an
    /// external system may report a stale or regressive status.
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub from: PaymentSessionStatus,
    pub to: PaymentSessionStatus,
    pub changed: bool,
    pub idempotent: bool,
    pub valid: bool,
}

impl TransitionOutcome {
    /// The status the session holds after applying this outcome.
    pub fn resulting_status(&self) -> PaymentSessionStatus {
        if self.changed {
            self.to
        } else {
            self.from
        }
    }
}

fn allowed_next(current: PaymentSessionStatus) -> &'static [PaymentSessionStatus] {
    use PaymentSessionStatus::*;
    match current {
        Pending => &[Authorized, Captured, Failed, Cancelled],
        Authorized => &[Captured, Failed, Cancelled],
        Captured => &[Refunded],
        Failed | Cancelled | Refunded => &[],
    }
}

pub fn can_transition(current: PaymentSessionStatus, next: PaymentSessionStatus) -> bool {
    current == next || allowed_next(current).contains(&next)
}

pub fn transition(
    current: PaymentSessionStatus,
    next: PaymentSessionStatus,
    on_invalid: OnInvalid,
    correlation_id: Option<&str>,
) -> Result<TransitionOutcome, PaymentError> {
    if current == next {
        return Ok(TransitionOutcome {
            from: current,
            to: next,
            changed: false,
            idempotent: true,
            valid: true,
        });
    }

    if allowed_next(current).contains(&next) {
        return Ok(TransitionOutcome {
            from: current,
            to: next,
            changed: true,
            idempotent: false,
            valid: true,
        });
    }

    match on_invalid {
        OnInvalid::Noop => Ok(TransitionOutcome {
            from: current,
            to: next,
            changed: false,
            idempotent: false,
            valid: false,
        }),
        OnInvalid::Throw => {
            let mut err = PaymentError::new(
                ErrorKind::InvalidTransition,
                format!("cannot move payment session from {current} to {next}"),
            )
            .with_details(json!({"from": current, "to": next}));
            if let Some(id) = correlation_id {
                err = err.with_correlation_id(id);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentSessionStatus::*;

    fn table_allows(from: PaymentSessionStatus, to: PaymentSessionStatus) -> bool {
        matches!(
            (from, to),
            (Pending, Authorized)
                | (Pending, Captured)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Authorized, Captured)
                | (Authorized, Failed)
                | (Authorized, Cancelled)
                | (Captured, Refunded)
        )
    }

    #[test]
    fn every_pair_matches_the_transition_table() {
        for from in PaymentSessionStatus::ALL {
            for to in PaymentSessionStatus::ALL {
                let out = transition(from, to, OnInvalid::Noop, None).unwrap();
                if from == to {
                    assert!(out.valid && out.idempotent && !out.changed, "{from}->{to}");
                } else {
                    assert_eq!(out.valid, table_allows(from, to), "{from}->{to}");
                    assert_eq!(out.changed, out.valid, "{from}->{to}");
                    assert!(!out.idempotent);
                }
                assert_eq!(can_transition(from, to), out.valid);
            }
        }
    }

    #[test]
    fn throw_mode_carries_correlation_id() {
        let err = transition(Captured, Authorized, OnInvalid::Throw, Some("corr-9")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidTransition);
        assert_eq!(err.correlation_id.as_deref(), Some("corr-9"));
    }

    #[test]
    fn noop_mode_keeps_current_status() {
        let out = transition(Captured, Authorized, OnInvalid::Noop, None).unwrap();
        assert!(!out.valid);
        assert_eq!(out.resulting_status(), Captured);
    }

    #[test]
    fn terminal_states_have_no_outbound_edges() {
        assert!(Failed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Captured.is_terminal());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("captured".parse::<PaymentSessionStatus>().unwrap(), Captured);
        assert!("settled".parse::<PaymentSessionStatus>().is_err());
    }
}
