use crate::{
    CharacterId, ConstellationId, ContractId, ContractKind, CorporationId, GroupId, LocationId,
    RegionId, SystemId, TypeId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a public-contracts catalog page, exactly as the remote API
/// returns it. Enrichment turns this into a [`crate::Contract`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RawContract {
    pub contract_id: ContractId,
    #[serde(rename = "type")]
    pub kind: ContractKind,
    pub issuer_id: CharacterId,
    pub issuer_corporation_id: CorporationId,
    #[serde(default)]
    pub start_location_id: Option<LocationId>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub title: String,
    pub date_issued: DateTime<Utc>,
    pub date_expired: DateTime<Utc>,
    #[serde(default)]
    pub for_corporation: bool,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RawContractItem {
    pub record_id: i64,
    pub type_id: TypeId,
    pub quantity: i64,
    pub is_included: bool,
    #[serde(default)]
    pub is_blueprint_copy: Option<bool>,
    #[serde(default)]
    pub material_efficiency: Option<i32>,
    #[serde(default)]
    pub time_efficiency: Option<i32>,
    #[serde(default)]
    pub runs: Option<i32>,
}

/// One entry of the bulk id-to-name endpoint response.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NameEntry {
    pub id: i64,
    pub name: String,
    pub category: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub name: String,
    pub group_id: GroupId,
    #[serde(default)]
    pub published: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GroupInfo {
    pub group_id: GroupId,
    pub name: String,
    pub category_id: crate::CategoryId,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub station_id: LocationId,
    pub name: String,
    pub system_id: SystemId,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StructureInfo {
    pub name: String,
    pub solar_system_id: SystemId,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub system_id: SystemId,
    pub name: String,
    pub constellation_id: ConstellationId,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ConstellationInfo {
    pub constellation_id: ConstellationId,
    pub name: String,
    pub region_id: RegionId,
}
