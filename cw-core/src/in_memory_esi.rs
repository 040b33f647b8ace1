use crate::esi_client::EsiClientTrait;
use crate::pagination::PaginatedResponse;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use cw_domain::{
    CategoryId, ConstellationId, ConstellationInfo, ContractId, GroupId, GroupInfo, NameEntry,
    RawContract, RawContractItem, RegionId, StationInfo, StructureInfo, SystemId, SystemInfo,
    TypeId, TypeInfo,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

pub const BLUEPRINT_GROUP_ID: i64 = 105;
pub const SHIP_GROUP_ID: i64 = 27;

/// In-memory stand-in for the remote market API, mirroring the shape the real
/// client exposes. Tests seed it with a small universe and can make
/// individual ids fail on purpose.
#[derive(Debug, Default)]
pub struct InMemoryEsi {
    contracts: RwLock<HashMap<i64, Vec<RawContract>>>,
    items: RwLock<HashMap<i64, Vec<RawContractItem>>>,
    names: RwLock<HashMap<i64, String>>,
    failing_name_ids: RwLock<HashSet<i64>>,
    types: RwLock<HashMap<i64, TypeInfo>>,
    groups: RwLock<HashMap<i64, GroupInfo>>,
    stations: RwLock<HashMap<i64, StationInfo>>,
    structures: RwLock<HashMap<i64, StructureInfo>>,
    systems: RwLock<HashMap<i64, SystemInfo>>,
    constellations: RwLock<HashMap<i64, ConstellationInfo>>,

    station_call_count: AtomicUsize,
    type_call_count: AtomicUsize,
    name_call_count: AtomicUsize,
    item_call_count: AtomicUsize,
}

impl InMemoryEsi {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_station(&self, station_id: i64, system_id: i64, constellation_id: i64, region_id: i64) {
        self.stations.write().unwrap().insert(
            station_id,
            StationInfo {
                station_id: cw_domain::LocationId(station_id),
                name: format!("Station {}", station_id),
                system_id: SystemId(system_id),
            },
        );
        self.add_system(system_id, constellation_id, region_id);
    }

    pub fn add_station_without_system(&self, station_id: i64, system_id: i64) {
        self.stations.write().unwrap().insert(
            station_id,
            StationInfo {
                station_id: cw_domain::LocationId(station_id),
                name: format!("Station {}", station_id),
                system_id: SystemId(system_id),
            },
        );
    }

    pub fn add_structure(&self, structure_id: i64, system_id: i64, constellation_id: i64, region_id: i64) {
        self.structures.write().unwrap().insert(
            structure_id,
            StructureInfo {
                name: format!("Structure {}", structure_id),
                solar_system_id: SystemId(system_id),
            },
        );
        self.add_system(system_id, constellation_id, region_id);
    }

    fn add_system(&self, system_id: i64, constellation_id: i64, region_id: i64) {
        self.systems.write().unwrap().insert(
            system_id,
            SystemInfo {
                system_id: SystemId(system_id),
                name: format!("System {}", system_id),
                constellation_id: ConstellationId(constellation_id),
            },
        );
        self.constellations.write().unwrap().insert(
            constellation_id,
            ConstellationInfo {
                constellation_id: ConstellationId(constellation_id),
                name: format!("Constellation {}", constellation_id),
                region_id: RegionId(region_id),
            },
        );
    }

    pub fn set_name(&self, id: i64, name: &str) {
        self.names.write().unwrap().insert(id, name.to_string());
    }

    pub fn fail_name_id(&self, id: i64) {
        self.failing_name_ids.write().unwrap().insert(id);
    }

    pub fn add_blueprint_type(&self, type_id: i64, name: &str) {
        self.add_type(type_id, name, BLUEPRINT_GROUP_ID, 9);
    }

    pub fn add_ship_type(&self, type_id: i64, name: &str) {
        self.add_type(type_id, name, SHIP_GROUP_ID, 6);
    }

    fn add_type(&self, type_id: i64, name: &str, group_id: i64, category_id: i64) {
        self.types.write().unwrap().insert(
            type_id,
            TypeInfo {
                type_id: TypeId(type_id),
                name: name.to_string(),
                group_id: GroupId(group_id),
                published: true,
            },
        );
        self.groups.write().unwrap().entry(group_id).or_insert(GroupInfo {
            group_id: GroupId(group_id),
            name: format!("Group {}", group_id),
            category_id: CategoryId(category_id),
        });
    }

    pub fn add_contract(&self, region_id: i64, raw: RawContract, items: Vec<RawContractItem>) {
        self.items.write().unwrap().insert(raw.contract_id.0, items);
        self.contracts.write().unwrap().entry(region_id).or_default().push(raw);
    }

    /// Adds a catalog entry whose item fetch will fail, for exercising the
    /// skip-on-failure path of the expansion engine.
    pub fn add_contract_without_items(&self, region_id: i64, raw: RawContract) {
        self.contracts.write().unwrap().entry(region_id).or_default().push(raw);
    }

    pub fn remove_contract(&self, region_id: i64, contract_id: ContractId) {
        if let Some(raws) = self.contracts.write().unwrap().get_mut(&region_id) {
            raws.retain(|raw| raw.contract_id != contract_id);
        }
        self.items.write().unwrap().remove(&contract_id.0);
    }

    pub fn station_calls(&self) -> usize {
        self.station_call_count.load(Ordering::Relaxed)
    }

    pub fn type_calls(&self) -> usize {
        self.type_call_count.load(Ordering::Relaxed)
    }

    pub fn name_calls(&self) -> usize {
        self.name_call_count.load(Ordering::Relaxed)
    }

    pub fn item_calls(&self) -> usize {
        self.item_call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EsiClientTrait for InMemoryEsi {
    async fn list_public_contracts_page(&self, region_id: RegionId, _page: u32) -> Result<PaginatedResponse<RawContract>> {
        let data = self
            .contracts
            .read()
            .unwrap()
            .get(&region_id.0)
            .cloned()
            .unwrap_or_default();
        Ok(PaginatedResponse { data, pages: 1 })
    }

    async fn get_contract_items(&self, contract_id: ContractId) -> Result<Vec<RawContractItem>> {
        self.item_call_count.fetch_add(1, Ordering::Relaxed);
        self.items
            .read()
            .unwrap()
            .get(&contract_id.0)
            .cloned()
            .ok_or_else(|| anyhow!("no items recorded for contract {}", contract_id.0))
    }

    async fn resolve_names(&self, ids: &[i64]) -> Result<Vec<NameEntry>> {
        self.name_call_count.fetch_add(1, Ordering::Relaxed);

        let failing = self.failing_name_ids.read().unwrap();
        if let Some(bad_id) = ids.iter().find(|id| failing.contains(id)) {
            bail!("name lookup rejected, id {} is not resolvable", bad_id);
        }

        let names = self.names.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                names.get(id).map(|name| NameEntry {
                    id: *id,
                    name: name.clone(),
                    category: "character".to_string(),
                })
            })
            .collect())
    }

    async fn get_type(&self, type_id: TypeId) -> Result<Option<TypeInfo>> {
        self.type_call_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.types.read().unwrap().get(&type_id.0).cloned())
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Option<GroupInfo>> {
        Ok(self.groups.read().unwrap().get(&group_id.0).cloned())
    }

    async fn get_station(&self, station_id: i64) -> Result<Option<StationInfo>> {
        self.station_call_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.stations.read().unwrap().get(&station_id).cloned())
    }

    async fn get_structure(&self, structure_id: i64) -> Result<Option<StructureInfo>> {
        Ok(self.structures.read().unwrap().get(&structure_id).cloned())
    }

    async fn get_system(&self, system_id: SystemId) -> Result<Option<SystemInfo>> {
        Ok(self.systems.read().unwrap().get(&system_id.0).cloned())
    }

    async fn get_constellation(&self, constellation_id: ConstellationId) -> Result<Option<ConstellationInfo>> {
        Ok(self.constellations.read().unwrap().get(&constellation_id.0).cloned())
    }
}
