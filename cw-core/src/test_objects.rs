use chrono::{TimeZone, Utc};
use cw_domain::{
    BlueprintVariant, CharacterId, Contract, ContractId, ContractItem, ContractKind,
    ContractStatus, CorporationId, LocationId, RawContract, RawContractItem, TypeId,
};

pub fn raw_exchange_contract(contract_id: i64, issuer_id: i64, corporation_id: i64, location_id: i64, price: f64) -> RawContract {
    RawContract {
        contract_id: ContractId(contract_id),
        kind: ContractKind::ItemExchange,
        issuer_id: CharacterId(issuer_id),
        issuer_corporation_id: CorporationId(corporation_id),
        start_location_id: Some(LocationId(location_id)),
        price,
        title: "".to_string(),
        date_issued: Utc.with_ymd_and_hms(2024, 2, 2, 12, 0, 0).unwrap(),
        date_expired: Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap(),
        for_corporation: false,
        volume: 0.01,
    }
}

pub fn raw_copy_item(type_id: i64, quantity: i64) -> RawContractItem {
    RawContractItem {
        record_id: type_id,
        type_id: TypeId(type_id),
        quantity,
        is_included: true,
        is_blueprint_copy: Some(true),
        material_efficiency: Some(10),
        time_efficiency: Some(20),
        runs: Some(3),
    }
}

pub fn raw_original_item(type_id: i64, quantity: i64) -> RawContractItem {
    RawContractItem {
        record_id: type_id,
        type_id: TypeId(type_id),
        quantity,
        is_included: true,
        is_blueprint_copy: None,
        material_efficiency: Some(0),
        time_efficiency: Some(0),
        runs: None,
    }
}

pub fn raw_plain_item(type_id: i64, quantity: i64) -> RawContractItem {
    RawContractItem {
        record_id: type_id,
        type_id: TypeId(type_id),
        quantity,
        is_included: true,
        is_blueprint_copy: None,
        material_efficiency: None,
        time_efficiency: None,
        runs: None,
    }
}

pub fn single_item_contract(
    contract_id: i64,
    issuer_id: i64,
    location_id: i64,
    type_id: i64,
    variant: BlueprintVariant,
    price: f64,
    quantity: i64,
) -> Contract {
    Contract {
        contract_id: ContractId(contract_id),
        kind: ContractKind::ItemExchange,
        status: ContractStatus::Outstanding,
        issuer_id: CharacterId(issuer_id),
        issuer_corporation_id: CorporationId(98000001),
        issuer_name: format!("Issuer {}", issuer_id),
        issuer_corporation_name: "Acme Corp".to_string(),
        start_location_id: LocationId(location_id),
        price,
        title: "".to_string(),
        date_issued: Utc.with_ymd_and_hms(2024, 2, 2, 12, 0, 0).unwrap(),
        items: vec![ContractItem {
            type_id: TypeId(type_id),
            name: format!("Type {}", type_id),
            quantity,
            is_blueprint_copy: variant == BlueprintVariant::Copy,
            variant,
            material_efficiency: variant.is_blueprint().then_some(0),
            time_efficiency: variant.is_blueprint().then_some(0),
        }],
        item_count: 1,
    }
}
