use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::store::{BusinessIdentity, OnboardingProfile, PostalAddress};

/// Onboarding payload as submitted by the dashboard. Everything is optional here so
/// missing fields are reported individually instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessInfo {
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub dba_name: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub contact_first_name: Option<String>,
    #[serde(default)]
    pub contact_last_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub address: Option<AddressInput>,
    #[serde(default)]
    pub ein: Option<String>,
    #[serde(default)]
    pub sole_prop: Option<bool>,
    #[serde(default)]
    pub estimated_monthly_volume: Option<Value>,
    #[serde(default)]
    pub opt_in_evidence_url: Option<String>,
    #[serde(default)]
    pub privacy_policy_url: Option<String>,
    #[serde(default)]
    pub terms_url: Option<String>,
    #[serde(default)]
    pub use_case_categories: Vec<String>,
    #[serde(default)]
    pub use_case_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    #[serde(default, alias = "line1")]
    pub street1: Option<String>,
    #[serde(default, alias = "line2")]
    pub street2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "zip")]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every problem found in a business info payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid business info: {}", describe_fields(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|error| error.field == field)
    }
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|error| format!("{}: {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn e164_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("valid E.164 pattern"))
}

pub fn is_e164(value: &str) -> bool {
    e164_pattern().is_match(value)
}

/// Strips formatting and returns the nine EIN digits.
pub fn normalize_ein(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == 9).then_some(digits)
}

fn is_web_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

fn parse_volume(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .filter(|volume| *volume > 0)
            .and_then(|volume| u32::try_from(volume).ok()),
        Value::String(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|volume| *volume > 0),
        _ => None,
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn required(&mut self, field: &str, value: &Option<String>) -> String {
        match trimmed(value) {
            Some(value) => value,
            None => {
                self.push(field, "is required");
                String::new()
            }
        }
    }

    fn optional_url(&mut self, field: &str, value: &Option<String>) -> Option<String> {
        let value = trimmed(value)?;
        if !is_web_url(&value) {
            self.push(field, "must be a valid http(s) URL");
        }
        Some(value)
    }
}

/// Checks the payload and produces the profile persisted with the business.
pub fn validate_business_info(info: &BusinessInfo) -> Result<OnboardingProfile, ValidationError> {
    let mut check = Collector { errors: Vec::new() };

    let legal_name = check.required("legal_name", &info.legal_name);

    let contact_email = check.required("contact_email", &info.contact_email);
    if !contact_email.is_empty() && !looks_like_email(&contact_email) {
        check.push("contact_email", "must be a valid email address");
    }

    let contact_phone = trimmed(&info.contact_phone);
    if let Some(phone) = &contact_phone {
        if !is_e164(phone) {
            check.push("contact_phone", "must be in E.164 format, e.g. +14155550123");
        }
    }

    let opt_in_evidence_url = match trimmed(&info.opt_in_evidence_url) {
        Some(url) => {
            if !is_web_url(&url) {
                check.push("opt_in_evidence_url", "must be a valid http(s) URL");
            }
            url
        }
        None => {
            check.push("opt_in_evidence_url", "is required");
            String::new()
        }
    };
    let website = check.optional_url("website", &info.website);
    let privacy_policy_url = check.optional_url("privacy_policy_url", &info.privacy_policy_url);
    let terms_url = check.optional_url("terms_url", &info.terms_url);

    let estimated_monthly_volume = match &info.estimated_monthly_volume {
        Some(raw) => parse_volume(raw).unwrap_or_else(|| {
            check.push("estimated_monthly_volume", "must be a positive integer");
            0
        }),
        None => {
            check.push("estimated_monthly_volume", "is required");
            0
        }
    };

    let address_input = info.address.clone().unwrap_or_default();
    let address = PostalAddress {
        street1: check.required("address.street1", &address_input.street1),
        street2: trimmed(&address_input.street2),
        city: check.required("address.city", &address_input.city),
        state: check.required("address.state", &address_input.state),
        postal_code: check.required("address.postal_code", &address_input.postal_code),
        country: check.required("address.country", &address_input.country),
    };

    let ein = trimmed(&info.ein);
    let sole_prop = info.sole_prop.unwrap_or(false);
    let identity = match (ein, sole_prop) {
        (Some(_), true) => {
            check.push(
                "ein",
                "provide either an EIN or the sole proprietor flag, not both",
            );
            None
        }
        (None, false) => {
            check.push("ein", "an EIN or the sole proprietor flag is required");
            None
        }
        (Some(raw), false) => match normalize_ein(&raw) {
            Some(value) => Some(BusinessIdentity::Ein { value }),
            None => {
                check.push("ein", "must contain exactly 9 digits");
                None
            }
        },
        (None, true) => Some(BusinessIdentity::SoleProprietor),
    };

    if !check.errors.is_empty() {
        return Err(ValidationError {
            fields: check.errors,
        });
    }
    let identity = identity.ok_or_else(|| ValidationError::single("ein", "is required"))?;

    Ok(OnboardingProfile {
        legal_name,
        dba_name: trimmed(&info.dba_name),
        website,
        contact_first_name: trimmed(&info.contact_first_name),
        contact_last_name: trimmed(&info.contact_last_name),
        contact_email,
        contact_phone,
        address,
        identity,
        estimated_monthly_volume,
        opt_in_evidence_url,
        privacy_policy_url,
        terms_url,
        use_case_categories: info
            .use_case_categories
            .iter()
            .map(|category| category.trim().to_string())
            .filter(|category| !category.is_empty())
            .collect(),
        use_case_description: trimmed(&info.use_case_description),
    })
}
