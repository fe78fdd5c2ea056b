use crate::store::VerificationStatus;

/// Maps the carrier's verification vocabulary onto the local lifecycle.
pub fn map_vendor_status(vendor: &str) -> VerificationStatus {
    match vendor.trim().to_ascii_lowercase().as_str() {
        "active" | "approved" => VerificationStatus::Active,
        "rejected" | "disabled" => VerificationStatus::Disabled,
        "action_required" | "incomplete" => VerificationStatus::ActionNeeded,
        _ => VerificationStatus::Pending,
    }
}
