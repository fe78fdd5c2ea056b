use std::sync::Arc;

use tracing::{debug, info, warn};

use super::event::{EventData, EventKind, WebhookEnvelope};
use super::{HandlerError, HandlerOutcome, SideEffect};
use crate::carrier::{map_vendor_status, CarrierGateway, OutboundSms};
use crate::compliance::{classify_keyword, ensure_footer, Keyword};
use crate::store::{Business, MessageDirection, MessageUpsert, Store};

const INBOUND_STATUS: &str = "received";

/// Applies carrier events to the store.
pub struct WebhookProcessor<S, C> {
    store: Arc<S>,
    carrier: Arc<C>,
}

impl<S, C> WebhookProcessor<S, C>
where
    S: Store + 'static,
    C: CarrierGateway + 'static,
{
    pub fn new(store: Arc<S>, carrier: Arc<C>) -> Self {
        Self { store, carrier }
    }

    pub async fn handle(&self, envelope: &WebhookEnvelope) -> Result<HandlerOutcome, HandlerError> {
        match envelope.kind() {
            EventKind::InboundMessage => self.inbound_message(&envelope.data).await,
            EventKind::DeliveryStatus { implied_status } => {
                self.delivery_status(&envelope.data, implied_status)
            }
            EventKind::VerificationUpdate => self.verification_update(&envelope.data),
            EventKind::Unknown(event_type) => {
                info!(event_type = %event_type, "unhandled webhook event acknowledged");
                Ok(HandlerOutcome::ignored(format!("unhandled event type `{event_type}`")))
            }
        }
    }

    async fn inbound_message(&self, data: &EventData) -> Result<HandlerOutcome, HandlerError> {
        let to = required(&data.to, "to")?;
        let from = required(&data.from, "from")?;
        let body = data.body.as_deref().ok_or(HandlerError::MissingField("body"))?;
        let message_id = required(&data.id, "id")?;

        let Some(business) = self.store.find_business_by_number(to)? else {
            info!(to, message_id, "inbound message for unknown number dropped");
            return Ok(HandlerOutcome::ignored(format!("no business owns {to}")));
        };
        if self.store.fetch_message(message_id)?.is_some() {
            debug!(message_id, "inbound message already processed");
            return Ok(HandlerOutcome::ignored("duplicate delivery"));
        }

        let mut effects = Vec::new();
        self.store.upsert_contact(&business.id, from)?;
        effects.push(SideEffect::ContactUpserted {
            phone: from.to_string(),
        });

        match classify_keyword(body) {
            Some(Keyword::Stop) => {
                self.store.set_contact_opt_out(&business.id, from, true)?;
                info!(business_id = %business.id, message_id, "contact opted out");
                effects.push(SideEffect::OptedOut {
                    phone: from.to_string(),
                });
                effects.push(self.auto_reply(&business, from, stop_reply(&business)).await);
            }
            Some(Keyword::Help) => {
                effects.push(self.auto_reply(&business, from, help_reply(&business)).await);
            }
            Some(Keyword::Start) => {
                self.store.set_contact_opt_out(&business.id, from, false)?;
                info!(business_id = %business.id, message_id, "contact opted back in");
                effects.push(SideEffect::OptedIn {
                    phone: from.to_string(),
                });
                effects.push(self.auto_reply(&business, from, start_reply(&business)).await);
            }
            None => {}
        }

        self.store.upsert_message(MessageUpsert {
            carrier_message_id: message_id.to_string(),
            business_id: business.id.clone(),
            direction: MessageDirection::Inbound,
            from: from.to_string(),
            to: to.to_string(),
            body: body.to_string(),
            status: INBOUND_STATUS.to_string(),
        })?;
        effects.push(SideEffect::MessageRecorded {
            message_id: message_id.to_string(),
        });

        Ok(HandlerOutcome::Processed { effects })
    }

    /// Best effort: a failed reply is reported as an effect, never as an error.
    async fn auto_reply(&self, business: &Business, to: &str, body: String) -> SideEffect {
        let (Some(account_id), Some(from)) = (&business.carrier_account_id, &business.from_number)
        else {
            warn!(business_id = %business.id, "auto-reply skipped, business has no carrier account");
            return SideEffect::AutoReplyFailed {
                error: "business has no carrier account".to_string(),
            };
        };

        let sms = OutboundSms {
            from: from.clone(),
            to: to.to_string(),
            body,
        };
        let sent = match self.carrier.send_message(account_id, &sms).await {
            Ok(sent) => sent,
            Err(err) => {
                warn!(business_id = %business.id, error = %err, "auto-reply failed");
                return SideEffect::AutoReplyFailed {
                    error: err.to_string(),
                };
            }
        };

        let recorded = self.store.upsert_message(MessageUpsert {
            carrier_message_id: sent.message_id.clone(),
            business_id: business.id.clone(),
            direction: MessageDirection::Outbound,
            from: sms.from,
            to: sms.to,
            body: sms.body,
            status: sent.status,
        });
        if let Err(err) = recorded {
            warn!(business_id = %business.id, message_id = %sent.message_id, error = %err, "auto-reply sent but not recorded");
        }
        SideEffect::AutoReplySent {
            message_id: sent.message_id,
        }
    }

    /// Overwrites the stored status with whatever the event carries; events are not ordered.
    fn delivery_status(
        &self,
        data: &EventData,
        implied_status: Option<String>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let message_id = required(&data.id, "id")?;
        let status = data
            .status
            .clone()
            .filter(|status| !status.trim().is_empty())
            .or(implied_status)
            .ok_or(HandlerError::MissingField("status"))?;
        let error = data.error_text();

        self.store
            .upsert_message_status(message_id, &status, error.as_deref())?;
        debug!(message_id, status = %status, "delivery status recorded");

        Ok(HandlerOutcome::Processed {
            effects: vec![SideEffect::DeliveryStatusRecorded {
                message_id: message_id.to_string(),
                status,
            }],
        })
    }

    fn verification_update(&self, data: &EventData) -> Result<HandlerOutcome, HandlerError> {
        let account_id = required(&data.account_id, "account_id")?;
        let vendor_status = required(&data.status, "status")?;
        let status = map_vendor_status(vendor_status);
        let error = data.error_text();

        let businesses = self.store.update_verification_status_for_account(
            account_id,
            status,
            error.as_deref(),
        )?;
        if businesses == 0 {
            info!(account_id, vendor_status, "verification update for unknown account");
        } else {
            info!(account_id, status = status.label(), businesses, "verification status updated");
        }

        Ok(HandlerOutcome::Processed {
            effects: vec![SideEffect::VerificationUpdated {
                account_id: account_id.to_string(),
                status,
                businesses,
            }],
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, HandlerError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(HandlerError::MissingField(field))
}

fn stop_reply(business: &Business) -> String {
    format!(
        "{}: You are unsubscribed and will receive no further messages. Reply START to resubscribe.",
        business.display_name()
    )
}

fn help_reply(business: &Business) -> String {
    let contact = business
        .onboarding
        .as_ref()
        .map(|profile| profile.contact_email.as_str())
        .filter(|email| !email.is_empty());
    let text = match contact {
        Some(email) => format!("{}: For help, contact {email}.", business.display_name()),
        None => format!("{}: For help, reply to this message.", business.display_name()),
    };
    ensure_footer(&text)
}

fn start_reply(business: &Business) -> String {
    ensure_footer(&format!(
        "{}: You are subscribed to messages again.",
        business.display_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::CarrierError;
    use crate::compliance::COMPLIANCE_FOOTER;
    use crate::store::{
        BusinessId, BusinessStore, ContactStore, InMemoryStore, MessageStore, PurchasedNumber,
        VerificationStatus,
    };
    use crate::testing::FakeCarrier;

    const NUMBER: &str = "+18885551234";
    const CUSTOMER: &str = "+14155550123";

    fn processor() -> (
        Arc<InMemoryStore>,
        Arc<FakeCarrier>,
        WebhookProcessor<InMemoryStore, FakeCarrier>,
    ) {
        let id = BusinessId::new("biz-1");
        let store = Arc::new(InMemoryStore::with_businesses([Business::new(id.clone(), "Acme")]));
        store.set_carrier_account(&id, "acct-1").expect("account");
        store
            .record_purchased_number(
                &id,
                &PurchasedNumber {
                    phone_id: "pn-1".to_string(),
                    e164: NUMBER.to_string(),
                },
            )
            .expect("number");
        let carrier = Arc::new(FakeCarrier::default());
        let processor = WebhookProcessor::new(Arc::clone(&store), Arc::clone(&carrier));
        (store, carrier, processor)
    }

    fn envelope(json: serde_json::Value) -> WebhookEnvelope {
        serde_json::from_value(json).expect("envelope")
    }

    fn inbound(id: &str, body: &str) -> WebhookEnvelope {
        envelope(serde_json::json!({
            "type": "message.received",
            "data": { "to": NUMBER, "from": CUSTOMER, "body": body, "id": id }
        }))
    }

    #[tokio::test]
    async fn stop_opts_out_and_confirms_once() {
        let (store, carrier, processor) = processor();

        let outcome = processor.handle(&inbound("s1", " Stop ")).await.expect("handled");

        let contact = store
            .fetch_contact(&BusinessId::new("biz-1"), CUSTOMER)
            .expect("fetch")
            .expect("contact");
        assert!(contact.opted_out);
        assert!(contact.opted_out_at.is_some());
        assert!(outcome
            .effects()
            .iter()
            .any(|effect| matches!(effect, SideEffect::AutoReplySent { .. })));
        assert_eq!(carrier.sent_messages().len(), 1);
        assert_eq!(store.message_count(), 2);

        let replay = processor.handle(&inbound("s1", "STOP")).await.expect("handled");
        assert!(matches!(replay, HandlerOutcome::Ignored { .. }));
        assert_eq!(carrier.sent_messages().len(), 1);
        assert_eq!(store.message_count(), 2);
    }

    #[tokio::test]
    async fn natural_language_stop_is_not_an_opt_out() {
        let (store, carrier, processor) = processor();

        processor
            .handle(&inbound("m1", "please stop by tomorrow"))
            .await
            .expect("handled");

        let contact = store
            .fetch_contact(&BusinessId::new("biz-1"), CUSTOMER)
            .expect("fetch")
            .expect("contact");
        assert!(!contact.opted_out);
        assert!(carrier.sent_messages().is_empty());
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn help_reply_carries_footer() {
        let (_store, carrier, processor) = processor();

        processor.handle(&inbound("h1", "HELP")).await.expect("handled");

        let (_, sms) = carrier.sent_messages().pop().expect("reply");
        assert!(sms.body.contains(COMPLIANCE_FOOTER));
        assert_eq!(sms.to, CUSTOMER);
        assert_eq!(sms.from, NUMBER);
    }

    #[tokio::test]
    async fn failed_reply_still_records_inbound_message() {
        let (store, carrier, processor) = processor();
        carrier.fail_sends(CarrierError::Transport("reset".to_string()));

        let outcome = processor.handle(&inbound("s2", "STOP")).await.expect("handled");

        assert!(outcome
            .effects()
            .iter()
            .any(|effect| matches!(effect, SideEffect::AutoReplyFailed { .. })));
        assert!(store.fetch_message("s2").expect("fetch").is_some());
        let contact = store
            .fetch_contact(&BusinessId::new("biz-1"), CUSTOMER)
            .expect("fetch")
            .expect("contact");
        assert!(contact.opted_out);
    }

    #[tokio::test]
    async fn start_opts_back_in() {
        let (store, _carrier, processor) = processor();
        processor.handle(&inbound("s1", "STOP")).await.expect("stop");
        processor.handle(&inbound("s2", "start")).await.expect("start");

        let contact = store
            .fetch_contact(&BusinessId::new("biz-1"), CUSTOMER)
            .expect("fetch")
            .expect("contact");
        assert!(!contact.opted_out);
        assert!(contact.opted_out_at.is_none());
    }

    #[tokio::test]
    async fn unknown_number_is_dropped() {
        let (store, _carrier, processor) = processor();
        let event = envelope(serde_json::json!({
            "type": "message.received",
            "data": { "to": "+18005550000", "from": CUSTOMER, "body": "STOP", "id": "x1" }
        }));

        let outcome = processor.handle(&event).await.expect("handled");

        assert!(matches!(outcome, HandlerOutcome::Ignored { .. }));
        assert_eq!(store.contact_count(), 0);
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn inbound_without_body_is_an_error() {
        let (_store, _carrier, processor) = processor();
        let event = envelope(serde_json::json!({
            "type": "message.received",
            "data": { "to": NUMBER, "from": CUSTOMER, "id": "x1" }
        }));

        let err = processor.handle(&event).await.expect_err("missing body");
        assert_eq!(err, HandlerError::MissingField("body"));
    }

    #[tokio::test]
    async fn delivery_events_overwrite_a_single_row() {
        let (store, _carrier, processor) = processor();
        let sent = envelope(serde_json::json!({ "type": "message.sent", "data": { "id": "m1" } }));
        let failed = envelope(serde_json::json!({
            "type": "message.failed",
            "data": { "id": "m1", "error": "unreachable handset" }
        }));

        processor.handle(&sent).await.expect("sent");
        processor.handle(&sent).await.expect("replayed");
        processor.handle(&failed).await.expect("failed");

        assert_eq!(store.message_count(), 1);
        let message = store.fetch_message("m1").expect("fetch").expect("row");
        assert_eq!(message.status.as_deref(), Some("failed"));
        assert_eq!(message.error.as_deref(), Some("unreachable handset"));
    }

    #[tokio::test]
    async fn generic_status_event_needs_explicit_status() {
        let (_store, _carrier, processor) = processor();
        let event = envelope(serde_json::json!({ "type": "message.status", "data": { "id": "m1" } }));

        let err = processor.handle(&event).await.expect_err("no status");
        assert_eq!(err, HandlerError::MissingField("status"));
    }

    #[tokio::test]
    async fn verification_update_applies_to_account() {
        let (store, _carrier, processor) = processor();
        let event = envelope(serde_json::json!({
            "type": "campaign.rejected",
            "data": { "account_id": "acct-1", "status": "rejected", "reason": "opt-in proof missing" }
        }));

        let outcome = processor.handle(&event).await.expect("handled");

        assert_eq!(
            outcome.effects(),
            &[SideEffect::VerificationUpdated {
                account_id: "acct-1".to_string(),
                status: VerificationStatus::Disabled,
                businesses: 1,
            }]
        );
        let business = store
            .fetch_business(&BusinessId::new("biz-1"))
            .expect("fetch")
            .expect("exists");
        assert_eq!(business.verification_status, VerificationStatus::Disabled);
        assert_eq!(
            business.last_verification_error.as_deref(),
            Some("opt-in proof missing")
        );
    }

    #[tokio::test]
    async fn unknown_events_are_ignored() {
        let (_store, _carrier, processor) = processor();
        let event = envelope(serde_json::json!({ "type": "call.completed", "data": {} }));

        let outcome = processor.handle(&event).await.expect("handled");
        assert!(matches!(outcome, HandlerOutcome::Ignored { .. }));
    }
}
