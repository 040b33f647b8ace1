use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ContractId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct CharacterId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct CorporationId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TypeId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct GroupId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct CategoryId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct LocationId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct SystemId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ConstellationId(pub i64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct RegionId(pub i64);

/// Location ids at or above this value are player-owned structures; below it
/// they are NPC stations. The two live behind different lookup endpoints.
pub const STRUCTURE_ID_THRESHOLD: i64 = 1_000_000_000_000;

/// Category of all blueprint types. Membership in this category is what makes
/// an item a template ("original") when it is not explicitly flagged as a copy.
pub const BLUEPRINT_CATEGORY_ID: CategoryId = CategoryId(9);

/// Display-name fallback when resolution fails or the entity is gone.
pub const UNKNOWN_NAME: &str = "Unknown";

impl LocationId {
    pub fn is_structure(&self) -> bool {
        self.0 >= STRUCTURE_ID_THRESHOLD
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    ItemExchange,
    Auction,
    Courier,
    Loan,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    // public contract listings only ever contain outstanding contracts, so a
    // record without an explicit status defaults to outstanding
    #[default]
    Outstanding,
    Finished,
    Expired,
    Deleted,
    Accepted,
}

/// Originals and copies of the same blueprint type are never interchangeable.
/// `None` marks an item that is not a blueprint at all.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintVariant {
    Original,
    Copy,
    None,
}

impl BlueprintVariant {
    pub fn is_blueprint(&self) -> bool {
        !matches!(self, BlueprintVariant::None)
    }
}

/// Resolved metadata for an item type. Entries are treated as permanently
/// correct once cached; type names and categories do not change meaning.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TypeMetadata {
    pub name: String,
    pub group_id: GroupId,
    pub category_id: CategoryId,
}

impl TypeMetadata {
    pub fn is_blueprint(&self) -> bool {
        self.category_id == BLUEPRINT_CATEGORY_ID
    }
}

/// A single line of an enriched contract. The efficiency fields only exist
/// for blueprint variants; `None` and `Some(0)` round-trip distinctly.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ContractItem {
    pub type_id: TypeId,
    pub name: String,
    pub quantity: i64,
    pub is_blueprint_copy: bool,
    pub variant: BlueprintVariant,
    pub material_efficiency: Option<i32>,
    pub time_efficiency: Option<i32>,
}

/// An enriched tradeable listing as kept in the local snapshot.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Contract {
    pub contract_id: ContractId,
    pub kind: ContractKind,
    #[serde(default)]
    pub status: ContractStatus,
    pub issuer_id: CharacterId,
    pub issuer_corporation_id: CorporationId,
    pub issuer_name: String,
    pub issuer_corporation_name: String,
    pub start_location_id: LocationId,
    pub price: f64,
    pub title: String,
    pub date_issued: DateTime<Utc>,
    pub items: Vec<ContractItem>,
    pub item_count: usize,
}

impl Contract {
    /// The single line item, if the contract has exactly one.
    pub fn single_item(&self) -> Option<&ContractItem> {
        match self.items.as_slice() {
            [item] => Some(item),
            _ => None,
        }
    }

    /// Price per unit of the single line item. `None` for multi-item
    /// contracts or when price/quantity are not both positive; such
    /// contracts are excluded from competitive analysis.
    pub fn unit_price(&self) -> Option<f64> {
        let item = self.single_item()?;
        if self.price > 0.0 && item.quantity > 0 {
            Some(self.price / item.quantity as f64)
        } else {
            None
        }
    }

    pub fn has_blueprint_item(&self) -> bool {
        self.items.iter().any(|item| item.variant.is_blueprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bpc_item(type_id: i64, quantity: i64) -> ContractItem {
        ContractItem {
            type_id: TypeId(type_id),
            name: "Raven Blueprint".to_string(),
            quantity,
            is_blueprint_copy: true,
            variant: BlueprintVariant::Copy,
            material_efficiency: Some(10),
            time_efficiency: Some(20),
        }
    }

    fn exchange_contract(price: f64, items: Vec<ContractItem>) -> Contract {
        let item_count = items.len();
        Contract {
            contract_id: ContractId(1),
            kind: ContractKind::ItemExchange,
            status: ContractStatus::Outstanding,
            issuer_id: CharacterId(90000001),
            issuer_corporation_id: CorporationId(98000001),
            issuer_name: "Unknown".to_string(),
            issuer_corporation_name: "Unknown".to_string(),
            start_location_id: LocationId(60003760),
            price,
            title: "".to_string(),
            date_issued: Default::default(),
            items,
            item_count,
        }
    }

    #[test]
    fn unit_price_requires_exactly_one_item_and_positive_numbers() {
        assert_eq!(exchange_contract(100.0, vec![bpc_item(500, 4)]).unit_price(), Some(25.0));
        assert_eq!(exchange_contract(0.0, vec![bpc_item(500, 4)]).unit_price(), None);
        assert_eq!(exchange_contract(100.0, vec![bpc_item(500, 0)]).unit_price(), None);
        assert_eq!(
            exchange_contract(100.0, vec![bpc_item(500, 1), bpc_item(501, 1)]).unit_price(),
            None
        );
        assert_eq!(exchange_contract(100.0, vec![]).unit_price(), None);
    }

    #[test]
    fn efficiency_absence_and_zero_round_trip_distinctly() {
        let mut item = bpc_item(500, 1);
        item.material_efficiency = None;
        item.time_efficiency = Some(0);

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains(r#""material_efficiency":null"#));
        assert!(json.contains(r#""time_efficiency":0"#));

        let decoded: ContractItem = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.material_efficiency, None);
        assert_eq!(decoded.time_efficiency, Some(0));
    }

    #[test]
    fn contract_kind_uses_wire_names() {
        let kind: ContractKind = serde_json::from_str(r#""item_exchange""#).unwrap();
        assert_eq!(kind, ContractKind::ItemExchange);

        let kind: ContractKind = serde_json::from_str(r#""no_such_kind""#).unwrap();
        assert_eq!(kind, ContractKind::Unknown);
    }

    #[test]
    fn structure_threshold_splits_location_ranges() {
        assert!(!LocationId(60003760).is_structure());
        assert!(LocationId(1_035_466_617_946).is_structure());
    }
}
