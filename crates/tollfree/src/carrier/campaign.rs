use serde::Serialize;

use crate::compliance::ensure_footer;
use crate::store::OnboardingProfile;

const DEFAULT_USE_CASES: &[&str] = &["account_notification", "customer_care"];

/// Toll-free verification campaign submitted to the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignRequest {
    pub use_cases: Vec<String>,
    pub description: String,
    pub message_samples: Vec<String>,
    pub consent_flow: String,
    pub volume: u32,
    pub opt_in_evidence_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_and_conditions_url: Option<String>,
}

impl CampaignRequest {
    pub fn from_profile(profile: &OnboardingProfile) -> Self {
        let use_cases = if profile.use_case_categories.is_empty() {
            DEFAULT_USE_CASES.iter().map(|case| case.to_string()).collect()
        } else {
            profile.use_case_categories.clone()
        };

        Self {
            description: use_case_summary(profile, &use_cases),
            message_samples: sample_messages(profile),
            consent_flow: consent_flow(profile),
            volume: profile.estimated_monthly_volume,
            opt_in_evidence_url: profile.opt_in_evidence_url.clone(),
            privacy_policy_url: profile.privacy_policy_url.clone(),
            terms_and_conditions_url: profile.terms_url.clone(),
            use_cases,
        }
    }
}

pub fn use_case_summary(profile: &OnboardingProfile, use_cases: &[String]) -> String {
    let name = profile.display_name();
    let readable: Vec<String> = use_cases.iter().map(|case| case.replace('_', " ")).collect();
    let mut summary = format!(
        "{name} sends {} messages to customers who opted in to receive texts from {name}. \
         Estimated volume is {} messages per month.",
        readable.join(" and "),
        profile.estimated_monthly_volume
    );
    if let Some(extra) = profile
        .use_case_description
        .as_deref()
        .map(str::trim)
        .filter(|extra| !extra.is_empty())
    {
        summary.push(' ');
        summary.push_str(extra);
    }
    summary.push_str(" Recipients can reply STOP to opt out or HELP for help at any time.");
    summary
}

/// At least two samples, each carrying the STOP/HELP disclosure.
pub fn sample_messages(profile: &OnboardingProfile) -> Vec<String> {
    let name = profile.display_name();
    vec![
        ensure_footer(&format!(
            "{name}: Thanks for reaching out! We received your request and will follow up shortly."
        )),
        ensure_footer(&format!(
            "{name}: Reminder - your appointment is tomorrow. Reply to this message with any questions."
        )),
    ]
}

fn consent_flow(profile: &OnboardingProfile) -> String {
    format!(
        "Customers opt in by submitting their phone number and checking an unticked consent box \
         on {}. Evidence of the opt-in flow: {}",
        profile
            .website
            .as_deref()
            .unwrap_or("the business web form"),
        profile.opt_in_evidence_url
    )
}
