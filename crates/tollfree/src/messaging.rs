//! Compliant outbound SMS on behalf of a provisioned business.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::AccessControl;
use crate::carrier::{CarrierError, CarrierGateway, OutboundSms, SentMessage};
use crate::compliance::ensure_footer;
use crate::error::{carrier_failure, json_error};
use crate::provisioning::validation::is_e164;
use crate::store::{BusinessId, MessageDirection, MessageUpsert, Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("business {0} not found")]
    BusinessNotFound(BusinessId),
    #[error("business has no toll-free number yet")]
    NotProvisioned,
    #[error("recipient {0} is not an E.164 number")]
    InvalidRecipient(String),
    #[error("message body is empty")]
    EmptyBody,
    #[error("recipient {0} has opted out")]
    OptedOut(String),
    #[error(transparent)]
    Carrier(#[from] CarrierError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct OutboundMessenger<S, C> {
    store: Arc<S>,
    carrier: Arc<C>,
}

impl<S, C> OutboundMessenger<S, C>
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    pub fn new(store: Arc<S>, carrier: Arc<C>) -> Self {
        Self { store, carrier }
    }

    /// Send `body` (with the opt-out footer) from the business's toll-free number.
    pub async fn send(
        &self,
        business_id: &BusinessId,
        to: &str,
        body: &str,
    ) -> Result<SentMessage, MessagingError> {
        let business = self
            .store
            .fetch_business(business_id)?
            .ok_or_else(|| MessagingError::BusinessNotFound(business_id.clone()))?;
        let (Some(account_id), Some(from)) = (&business.carrier_account_id, &business.from_number)
        else {
            return Err(MessagingError::NotProvisioned);
        };
        let to = to.trim();
        if !is_e164(to) {
            return Err(MessagingError::InvalidRecipient(to.to_string()));
        }
        if body.trim().is_empty() {
            return Err(MessagingError::EmptyBody);
        }
        if let Some(contact) = self.store.fetch_contact(business_id, to)? {
            if contact.opted_out {
                return Err(MessagingError::OptedOut(to.to_string()));
            }
        }

        let sms = OutboundSms {
            from: from.clone(),
            to: to.to_string(),
            body: ensure_footer(body),
        };
        let sent = self.carrier.send_message(account_id, &sms).await?;

        self.store.upsert_contact(business_id, to)?;
        self.store.upsert_message(MessageUpsert {
            carrier_message_id: sent.message_id.clone(),
            business_id: business_id.clone(),
            direction: MessageDirection::Outbound,
            from: sms.from,
            to: sms.to,
            body: sms.body,
            status: sent.status.clone(),
        })?;

        info!(business_id = %business_id, message_id = %sent.message_id, "outbound message sent");
        Ok(sent)
    }
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(alias = "businessId")]
    pub business_id: String,
    pub to: String,
    pub body: String,
}

struct RouteState<S, C> {
    messenger: Arc<OutboundMessenger<S, C>>,
    access: AccessControl,
}

impl<S, C> Clone for RouteState<S, C> {
    fn clone(&self) -> Self {
        Self {
            messenger: Arc::clone(&self.messenger),
            access: self.access.clone(),
        }
    }
}

pub fn messaging_router<S, C>(
    messenger: Arc<OutboundMessenger<S, C>>,
    access: AccessControl,
) -> Router
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    Router::new()
        .route("/api/messages/send", post(send_handler::<S, C>))
        .with_state(RouteState { messenger, access })
}

async fn send_handler<S, C>(
    State(state): State<RouteState<S, C>>,
    headers: HeaderMap,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Response
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return json_error(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()),
    };
    let business_id = BusinessId::new(request.business_id);
    if let Err(denied) = state.access.authorize_owner(&headers, &business_id) {
        return denied.into_response();
    }

    match state
        .messenger
        .send(&business_id, &request.to, &request.body)
        .await
    {
        Ok(sent) => {
            let payload = json!({
                "success": true,
                "message_id": sent.message_id,
                "status": sent.status,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(MessagingError::Carrier(err)) => carrier_failure(&err),
        Err(err @ (MessagingError::BusinessNotFound(_) | MessagingError::Store(StoreError::NotFound))) => {
            json_error(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(err @ (MessagingError::InvalidRecipient(_) | MessagingError::EmptyBody)) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        Err(err @ (MessagingError::NotProvisioned | MessagingError::OptedOut(_))) => {
            warn!(business_id = %business_id, error = %err, "outbound message refused");
            json_error(StatusCode::CONFLICT, err.to_string())
        }
        Err(MessagingError::Store(err)) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::COMPLIANCE_FOOTER;
    use crate::store::{Business, BusinessStore, ContactStore, InMemoryStore, MessageStore, PurchasedNumber};
    use crate::testing::FakeCarrier;

    fn provisioned_store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::with_businesses([Business::new(BusinessId::new("biz-1"), "Acme")]);
        let id = BusinessId::new("biz-1");
        store.set_carrier_account(&id, "acct-1").expect("account");
        store
            .record_purchased_number(
                &id,
                &PurchasedNumber {
                    phone_id: "pn-1".to_string(),
                    e164: "+18885551234".to_string(),
                },
            )
            .expect("number");
        Arc::new(store)
    }

    #[tokio::test]
    async fn sends_with_footer_and_records_message() {
        let store = provisioned_store();
        let carrier = Arc::new(FakeCarrier::default());
        let messenger = OutboundMessenger::new(Arc::clone(&store), Arc::clone(&carrier));

        let sent = messenger
            .send(&BusinessId::new("biz-1"), "+14155550123", "Your order is ready")
            .await
            .expect("sent");

        let (account, sms) = carrier.sent_messages().pop().expect("one message");
        assert_eq!(account, "acct-1");
        assert_eq!(sms.from, "+18885551234");
        assert!(sms.body.ends_with(COMPLIANCE_FOOTER));

        let stored = store
            .fetch_message(&sent.message_id)
            .expect("fetch")
            .expect("recorded");
        assert_eq!(stored.direction, Some(MessageDirection::Outbound));
        assert!(store
            .fetch_contact(&BusinessId::new("biz-1"), "+14155550123")
            .expect("fetch")
            .is_some());
    }

    #[tokio::test]
    async fn opted_out_recipient_is_refused() {
        let store = provisioned_store();
        let id = BusinessId::new("biz-1");
        store.upsert_contact(&id, "+14155550123").expect("contact");
        store
            .set_contact_opt_out(&id, "+14155550123", true)
            .expect("opt out");
        let carrier = Arc::new(FakeCarrier::default());
        let messenger = OutboundMessenger::new(Arc::clone(&store), Arc::clone(&carrier));

        let err = messenger
            .send(&id, "+14155550123", "Promo")
            .await
            .expect_err("refused");

        assert!(matches!(err, MessagingError::OptedOut(_)));
        assert!(carrier.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn carrier_failure_records_nothing() {
        let store = provisioned_store();
        let carrier = Arc::new(FakeCarrier::default());
        carrier.fail_sends(CarrierError::Transport("connection reset".to_string()));
        let messenger = OutboundMessenger::new(Arc::clone(&store), carrier);

        let err = messenger
            .send(&BusinessId::new("biz-1"), "+14155550123", "Hello")
            .await
            .expect_err("fails");

        assert!(matches!(err, MessagingError::Carrier(_)));
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn unprovisioned_business_cannot_send() {
        let store = Arc::new(InMemoryStore::with_businesses([Business::new(
            BusinessId::new("biz-2"),
            "New",
        )]));
        let messenger = OutboundMessenger::new(store, Arc::new(FakeCarrier::default()));

        let err = messenger
            .send(&BusinessId::new("biz-2"), "+14155550123", "Hello")
            .await
            .expect_err("refused");
        assert!(matches!(err, MessagingError::NotProvisioned));
    }
}
