use serde::Deserialize;

const INBOUND_EVENTS: &[&str] = &["message.received", "message.inbound"];
const DELIVERY_EVENTS: &[&str] = &[
    "message.sent",
    "message.delivered",
    "message.failed",
    "message.undelivered",
    "message.status",
];
const VERIFICATION_EVENTS: &[&str] = &[
    "verification.updated",
    "account.status_updated",
    "campaign.approved",
    "campaign.rejected",
    "campaign.updated",
];

/// Top-level webhook body. Older payloads name the discriminator `event`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type", alias = "event", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub data: EventData,
}

impl WebhookEnvelope {
    pub fn parse(raw_body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw_body)
    }

    pub fn kind(&self) -> EventKind {
        classify_event(self.event_type.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
    #[serde(default, alias = "message_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl EventData {
    /// Error text from `error` (string or `{message}`), falling back to `reason`.
    pub fn error_text(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(ErrorDetail::text)
            .or_else(|| self.reason.clone())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Object {
        #[serde(default)]
        message: Option<String>,
    },
}

impl ErrorDetail {
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Object { message } => message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    InboundMessage,
    /// Carries the status implied by the event name, e.g. `delivered`.
    DeliveryStatus { implied_status: Option<String> },
    VerificationUpdate,
    Unknown(String),
}

pub fn classify_event(event_type: &str) -> EventKind {
    let event_type = event_type.trim();
    if INBOUND_EVENTS.contains(&event_type) {
        EventKind::InboundMessage
    } else if DELIVERY_EVENTS.contains(&event_type) {
        let implied_status = event_type
            .strip_prefix("message.")
            .filter(|suffix| *suffix != "status")
            .map(str::to_string);
        EventKind::DeliveryStatus { implied_status }
    } else if VERIFICATION_EVENTS.contains(&event_type) {
        EventKind::VerificationUpdate
    } else {
        EventKind::Unknown(event_type.to_string())
    }
}
