//! Carrier webhook ingestion: signature check, event classification, and the
//! inbound, delivery-status, and verification-update handlers.

pub mod event;
pub mod handlers;
pub mod router;

use serde::Serialize;

use crate::store::{StoreError, VerificationStatus};

pub use event::{classify_event, EventData, EventKind, WebhookEnvelope};
pub use handlers::WebhookProcessor;
pub use router::{webhook_router, WebhookSettings};

/// What a handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandlerOutcome {
    Processed { effects: Vec<SideEffect> },
    Ignored { reason: String },
}

impl HandlerOutcome {
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }

    pub fn effects(&self) -> &[SideEffect] {
        match self {
            Self::Processed { effects } => effects,
            Self::Ignored { .. } => &[],
        }
    }
}

/// Individual state change or carrier call made while handling an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    ContactUpserted { phone: String },
    OptedOut { phone: String },
    OptedIn { phone: String },
    AutoReplySent { message_id: String },
    AutoReplyFailed { error: String },
    MessageRecorded { message_id: String },
    DeliveryStatusRecorded { message_id: String, status: String },
    VerificationUpdated {
        account_id: String,
        status: VerificationStatus,
        businesses: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("event is missing required field `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}
