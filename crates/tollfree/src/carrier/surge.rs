use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::account::{AccountStrategy, SharedAccount, SubAccountPerBusiness};
use super::campaign::CampaignRequest;
use super::status::map_vendor_status;
use super::{
    CapabilityStatus, CarrierError, CarrierGateway, OutboundSms, SentMessage,
    VerificationSubmission,
};
use crate::config::CarrierConfig;
use crate::store::{
    Business, BusinessIdentity, OnboardingProfile, PurchasedNumber, VerificationStatus,
};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TOLL_FREE_CAPABILITY: &str = "toll_free_messaging";

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PhoneNumberResponse {
    id: String,
    number: String,
}

#[derive(Debug, Deserialize)]
struct CampaignResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccountStatusResponse {
    #[serde(default)]
    capabilities: HashMap<String, CapabilityEntry>,
}

#[derive(Debug, Deserialize)]
struct CapabilityEntry {
    status: String,
    #[serde(default)]
    errors: Vec<CapabilityIssue>,
}

#[derive(Debug, Deserialize)]
struct CapabilityIssue {
    #[serde(default)]
    field: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct PhoneNumberRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

/// Raw carrier HTTP API. Every call carries the bearer key and a request timeout.
#[derive(Clone)]
pub struct SurgeApi {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for SurgeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurgeApi")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SurgeApi {
    pub fn new(
        base_url: Url,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, CarrierError> {
        if base_url.cannot_be_a_base() {
            return Err(CarrierError::Configuration(format!(
                "{base_url} cannot be used as an API base"
            )));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| CarrierError::Configuration(err.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CarrierError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CarrierError::Configuration("invalid carrier base url".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.api_key)
    }

    async fn execute<R: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> Result<R, CarrierError> {
        let response = builder.send().await.map_err(|err| {
            warn!(operation, error = %err, "carrier request failed");
            CarrierError::Transport(err.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| CarrierError::Transport(err.to_string()))?;

        if !status.is_success() {
            warn!(operation, status = status.as_u16(), "carrier rejected request");
            return Err(CarrierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(operation, status = status.as_u16(), "carrier request succeeded");
        serde_json::from_str(&body)
            .map_err(|err| CarrierError::InvalidResponse(format!("{operation}: {err}")))
    }

    /// Creates a sub-account carrying the business's legal identity.
    pub async fn create_account(
        &self,
        business: &Business,
        profile: &OnboardingProfile,
    ) -> Result<String, CarrierError> {
        let (organization_type, identifiers) = match &profile.identity {
            BusinessIdentity::Ein { value } => ("company", json!([{ "type": "ein", "value": value }])),
            BusinessIdentity::SoleProprietor => ("sole_proprietor", json!([])),
        };
        let payload = json!({
            "name": business.display_name(),
            "organization": {
                "legal_name": profile.legal_name,
                "type": organization_type,
                "identifiers": identifiers,
                "email": profile.contact_email,
                "website": profile.website,
                "address": {
                    "line1": profile.address.street1,
                    "line2": profile.address.street2,
                    "locality": profile.address.city,
                    "region": profile.address.state,
                    "postal_code": profile.address.postal_code,
                    "country": profile.address.country,
                },
                "contact": {
                    "first_name": profile.contact_first_name,
                    "last_name": profile.contact_last_name,
                    "email": profile.contact_email,
                    "phone_number": profile.contact_phone,
                },
            },
            "metadata": { "business_id": business.id.as_str() },
        });

        let url = self.endpoint(&["accounts"])?;
        let account: AccountResponse = self
            .execute(
                self.request(Method::POST, url).json(&payload),
                "create_account",
            )
            .await?;
        info!(business_id = %business.id, account_id = %account.id, "carrier sub-account created");
        Ok(account.id)
    }

    pub async fn purchase_number(&self, account_id: &str) -> Result<PurchasedNumber, CarrierError> {
        let url = self.endpoint(&["accounts", account_id, "phone_numbers"])?;
        let number: PhoneNumberResponse = self
            .execute(
                self.request(Method::POST, url)
                    .json(&PhoneNumberRequest { kind: "toll_free" }),
                "purchase_number",
            )
            .await?;
        info!(account_id, phone_id = %number.id, number = %number.number, "toll-free number purchased");
        Ok(PurchasedNumber {
            phone_id: number.id,
            e164: number.number,
        })
    }

    pub async fn create_campaign(
        &self,
        account_id: &str,
        campaign: &CampaignRequest,
    ) -> Result<VerificationSubmission, CarrierError> {
        let url = self.endpoint(&["accounts", account_id, "campaigns"])?;
        let created: CampaignResponse = self
            .execute(
                self.request(Method::POST, url).json(campaign),
                "submit_verification",
            )
            .await?;
        info!(account_id, verification_id = %created.id, "verification campaign submitted");
        Ok(VerificationSubmission {
            verification_id: created.id,
            status: VerificationStatus::Pending,
        })
    }

    pub async fn account_status(&self, account_id: &str) -> Result<CapabilityStatus, CarrierError> {
        let url = self.endpoint(&["accounts", account_id, "status"])?;
        let response: AccountStatusResponse = self
            .execute(
                self.request(Method::GET, url)
                    .query(&[("capabilities", TOLL_FREE_CAPABILITY)]),
                "capability_status",
            )
            .await?;

        let entry = response
            .capabilities
            .get(TOLL_FREE_CAPABILITY)
            .ok_or_else(|| {
                CarrierError::InvalidResponse(format!(
                    "status response missing {TOLL_FREE_CAPABILITY}"
                ))
            })?;

        let details = if entry.errors.is_empty() {
            None
        } else {
            Some(
                entry
                    .errors
                    .iter()
                    .map(|issue| match &issue.field {
                        Some(field) => format!("{field}: {}", issue.message),
                        None => issue.message.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        Ok(CapabilityStatus {
            status: map_vendor_status(&entry.status),
            vendor_status: entry.status.clone(),
            details,
        })
    }

    pub async fn send_message(
        &self,
        account_id: &str,
        message: &OutboundSms,
    ) -> Result<SentMessage, CarrierError> {
        let url = self.endpoint(&["accounts", account_id, "messages"])?;
        let sent: MessageResponse = self
            .execute(self.request(Method::POST, url).json(message), "send_message")
            .await?;
        debug!(account_id, message_id = %sent.id, "message accepted by carrier");
        Ok(SentMessage {
            message_id: sent.id,
            status: sent.status.unwrap_or_else(|| "queued".to_string()),
        })
    }
}

/// Carrier client used in production.
#[derive(Debug)]
pub struct SurgeCarrier {
    api: SurgeApi,
    accounts: Box<dyn AccountStrategy>,
}

impl SurgeCarrier {
    pub fn new(api: SurgeApi, accounts: Box<dyn AccountStrategy>) -> Self {
        Self { api, accounts }
    }

    pub fn from_config(config: &CarrierConfig) -> Result<Self, CarrierError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| CarrierError::Configuration("SURGE_API_KEY is not set".to_string()))?;
        let api = SurgeApi::new(
            config.api_base_url.clone(),
            api_key,
            config.request_timeout_secs,
        )?;
        let accounts: Box<dyn AccountStrategy> = if config.use_sub_accounts {
            Box::new(SubAccountPerBusiness)
        } else {
            Box::new(SharedAccount::new(config.master_account_id.clone()))
        };
        Ok(Self::new(api, accounts))
    }

    pub fn api(&self) -> &SurgeApi {
        &self.api
    }
}

#[async_trait]
impl CarrierGateway for SurgeCarrier {
    async fn resolve_account(
        &self,
        business: &Business,
        profile: &OnboardingProfile,
    ) -> Result<String, CarrierError> {
        self.accounts.resolve(&self.api, business, profile).await
    }

    async fn purchase_number(&self, account_id: &str) -> Result<PurchasedNumber, CarrierError> {
        self.api.purchase_number(account_id).await
    }

    async fn submit_verification(
        &self,
        account_id: &str,
        campaign: &CampaignRequest,
    ) -> Result<VerificationSubmission, CarrierError> {
        self.api.create_campaign(account_id, campaign).await
    }

    async fn capability_status(&self, account_id: &str) -> Result<CapabilityStatus, CarrierError> {
        self.api.account_status(account_id).await
    }

    async fn send_message(
        &self,
        account_id: &str,
        message: &OutboundSms,
    ) -> Result<SentMessage, CarrierError> {
        self.api.send_message(account_id, message).await
    }
}
