use std::fmt::Debug;

use async_trait::async_trait;

use super::surge::SurgeApi;
use super::CarrierError;
use crate::store::{Business, OnboardingProfile};

/// Decides which carrier account a business provisions under. Chosen once when the
/// carrier client is built.
#[async_trait]
pub trait AccountStrategy: Debug + Send + Sync {
    async fn resolve(
        &self,
        api: &SurgeApi,
        business: &Business,
        profile: &OnboardingProfile,
    ) -> Result<String, CarrierError>;
}

/// Every business shares one master account.
#[derive(Debug, Clone)]
pub struct SharedAccount {
    master_account_id: Option<String>,
}

impl SharedAccount {
    pub fn new(master_account_id: Option<String>) -> Self {
        Self { master_account_id }
    }
}

#[async_trait]
impl AccountStrategy for SharedAccount {
    async fn resolve(
        &self,
        _api: &SurgeApi,
        _business: &Business,
        _profile: &OnboardingProfile,
    ) -> Result<String, CarrierError> {
        self.master_account_id
            .clone()
            .ok_or(CarrierError::MissingMasterAccount)
    }
}

/// Each business gets its own carrier sub-account.
#[derive(Debug, Clone, Default)]
pub struct SubAccountPerBusiness;

#[async_trait]
impl AccountStrategy for SubAccountPerBusiness {
    async fn resolve(
        &self,
        api: &SurgeApi,
        business: &Business,
        profile: &OnboardingProfile,
    ) -> Result<String, CarrierError> {
        api.create_account(business, profile).await
    }
}
