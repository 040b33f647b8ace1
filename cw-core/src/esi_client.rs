use crate::pagination::PaginatedResponse;
use anyhow::{Context, Result};
use async_trait::async_trait;
use cw_domain::{
    ConstellationId, ConstellationInfo, ContractId, GroupId, GroupInfo, NameEntry, RawContract,
    RawContractItem, RegionId, StationInfo, StructureInfo, SystemId, SystemInfo, TypeId, TypeInfo,
};
use mockall::automock;
use reqwest::StatusCode;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use thiserror::Error;

pub const DEFAULT_ESI_BASE_URL: &str = "https://esi.evetech.net/latest";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Rate-limit responses that survived the retry middleware. Never counted
    /// against a retry cap, but visible to the tuning feedback loop.
    #[error("rate limited (status {status})")]
    RateLimited { status: u16 },
    #[error("API request failed. Status: {status}, Body: {body}")]
    Status { status: u16, body: String },
}

/// The slice of the market API this pipeline consumes. Single seam for the
/// resolvers, the expansion engine, and the analyzer; tests swap in
/// [`crate::in_memory_esi::InMemoryEsi`].
#[automock]
#[async_trait]
pub trait EsiClientTrait: Send + Sync + Debug {
    async fn list_public_contracts_page(&self, region_id: RegionId, page: u32) -> Result<PaginatedResponse<RawContract>>;

    async fn get_contract_items(&self, contract_id: ContractId) -> Result<Vec<RawContractItem>>;

    /// Bulk id-to-name lookup. Ids the remote cannot resolve are absent from
    /// the response; a single unknown id fails the whole call.
    async fn resolve_names(&self, ids: &[i64]) -> Result<Vec<NameEntry>>;

    async fn get_type(&self, type_id: TypeId) -> Result<Option<TypeInfo>>;
    async fn get_group(&self, group_id: GroupId) -> Result<Option<GroupInfo>>;

    async fn get_station(&self, station_id: i64) -> Result<Option<StationInfo>>;
    async fn get_structure(&self, structure_id: i64) -> Result<Option<StructureInfo>>;
    async fn get_system(&self, system_id: SystemId) -> Result<Option<SystemInfo>>;
    async fn get_constellation(&self, constellation_id: ConstellationId) -> Result<Option<ConstellationInfo>>;
}

#[derive(Debug, Clone)]
pub struct EsiClient {
    pub client: ClientWithMiddleware,
    base_url: String,
}

impl EsiClient {
    pub fn new(client: ClientWithMiddleware) -> Self {
        Self::with_base_url(client, DEFAULT_ESI_BASE_URL)
    }

    pub fn with_base_url(client: ClientWithMiddleware, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn make_api_call<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let resp = request.send().await.context("Failed to send request")?;

        let status = resp.status();
        let body = resp.text().await.context("Failed to get response body")?;

        if !status.is_success() {
            return Err(Self::status_error(status, body).into());
        }

        serde_json::from_str(&body).map_err(|e| anyhow::anyhow!("Error decoding response: '{:?}'. Response body was: '{}'", e, body))
    }

    /// Variant of [`Self::make_api_call`] where 404 is a terminal,
    /// non-retryable "does not exist" answer rather than an error.
    async fn make_optional_api_call<T: DeserializeOwned>(request: RequestBuilder) -> Result<Option<T>> {
        let resp = request.send().await.context("Failed to send request")?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = resp.text().await.context("Failed to get response body")?;

        if !status.is_success() {
            return Err(Self::status_error(status, body).into());
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Error decoding response: '{:?}'. Response body was: '{}'", e, body))
    }

    async fn make_paginated_api_call<T: DeserializeOwned>(request: RequestBuilder) -> Result<PaginatedResponse<T>> {
        let resp = request.send().await.context("Failed to send request")?;

        let status = resp.status();
        let pages = resp
            .headers()
            .get("x-pages")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(1);

        let body = resp.text().await.context("Failed to get response body")?;

        if !status.is_success() {
            return Err(Self::status_error(status, body).into());
        }

        let data = serde_json::from_str(&body).map_err(|e| anyhow::anyhow!("Error decoding response: '{:?}'. Response body was: '{}'", e, body))?;

        Ok(PaginatedResponse { data, pages })
    }

    fn status_error(status: StatusCode, body: String) -> ApiError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 420 {
            ApiError::RateLimited { status: status.as_u16() }
        } else {
            ApiError::Status {
                status: status.as_u16(),
                body,
            }
        }
    }
}

#[async_trait]
impl EsiClientTrait for EsiClient {
    async fn list_public_contracts_page(&self, region_id: RegionId, page: u32) -> Result<PaginatedResponse<RawContract>> {
        let request = self
            .client
            .get(self.url(&format!("/contracts/public/{}/", region_id.0)))
            .query(&[("page", page.to_string())]);

        Self::make_paginated_api_call(request).await
    }

    async fn get_contract_items(&self, contract_id: ContractId) -> Result<Vec<RawContractItem>> {
        Self::make_api_call(
            self.client
                .get(self.url(&format!("/contracts/public/items/{}/", contract_id.0))),
        )
        .await
    }

    async fn resolve_names(&self, ids: &[i64]) -> Result<Vec<NameEntry>> {
        Self::make_api_call(self.client.post(self.url("/universe/names/")).json(&ids)).await
    }

    async fn get_type(&self, type_id: TypeId) -> Result<Option<TypeInfo>> {
        Self::make_optional_api_call(self.client.get(self.url(&format!("/universe/types/{}/", type_id.0)))).await
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Option<GroupInfo>> {
        Self::make_optional_api_call(self.client.get(self.url(&format!("/universe/groups/{}/", group_id.0)))).await
    }

    async fn get_station(&self, station_id: i64) -> Result<Option<StationInfo>> {
        Self::make_optional_api_call(self.client.get(self.url(&format!("/universe/stations/{}/", station_id)))).await
    }

    async fn get_structure(&self, structure_id: i64) -> Result<Option<StructureInfo>> {
        Self::make_optional_api_call(self.client.get(self.url(&format!("/universe/structures/{}/", structure_id)))).await
    }

    async fn get_system(&self, system_id: SystemId) -> Result<Option<SystemInfo>> {
        Self::make_optional_api_call(self.client.get(self.url(&format!("/universe/systems/{}/", system_id.0)))).await
    }

    async fn get_constellation(&self, constellation_id: ConstellationId) -> Result<Option<ConstellationInfo>> {
        Self::make_optional_api_call(self.client.get(self.url(&format!("/universe/constellations/{}/", constellation_id.0)))).await
    }
}
