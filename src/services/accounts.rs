//! Account service client
//!
//! Company and rider identity live in an external account service; the
//! dispatch core only consumes profiles. Company profiles are cached briefly,
//! rider lookups are always live since online status changes constantly.

use moka::future::Cache;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::models::assignment::{CompanyProfile, RiderProfile};
use crate::models::error::{DispatchError, Result};

#[derive(Clone)]
pub struct AccountService {
    client: Client,
    base_url: String,
    company_cache: Arc<Cache<String, CompanyProfile>>,
}

impl AccountService {
    pub fn new(base_url: String) -> Self {
        let company_cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(60))
            .build();

        Self {
            client: Client::new(),
            base_url,
            company_cache: Arc::new(company_cache),
        }
    }

    pub async fn get_company(&self, company_id: &str) -> Result<CompanyProfile> {
        if let Some(profile) = self.company_cache.get(company_id).await {
            return Ok(profile);
        }

        let url = format!("{}/companies/{}", self.base_url, company_id);
        let profile: CompanyProfile = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))?
            .error_for_status()
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))?
            .json()
            .await
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))?;

        self.company_cache
            .insert(company_id.to_string(), profile.clone())
            .await;

        Ok(profile)
    }

    pub async fn get_rider(&self, rider_id: &str) -> Result<RiderProfile> {
        let url = format!("{}/riders/{}", self.base_url, rider_id);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))?
            .error_for_status()
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))?
            .json()
            .await
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))
    }

    /// All riders registered to a company, regardless of availability
    pub async fn company_riders(&self, company_id: &str) -> Result<Vec<RiderProfile>> {
        let url = format!("{}/companies/{}/riders", self.base_url, company_id);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))?
            .error_for_status()
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))?
            .json()
            .await
            .map_err(|e| DispatchError::Upstream(format!("account service: {}", e)))
    }
}
