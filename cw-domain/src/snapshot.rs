use crate::{Contract, ContractId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The full local projection of the remote catalog, persisted as one
/// document. After every successful sync its ids match the remotely observed
/// ids exactly.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ContractSnapshot {
    pub contracts: Vec<Contract>,
}

impl ContractSnapshot {
    pub fn ids(&self) -> HashSet<ContractId> {
        self.contracts.iter().map(|c| c.contract_id).collect()
    }

    pub fn get(&self, id: ContractId) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.contract_id == id)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Drops every contract whose id is not in `remote_ids`. Removed
    /// contracts were fulfilled, expired, or deleted remotely; the catalog
    /// does not say which, and we do not ask.
    pub fn retain_ids(&mut self, remote_ids: &HashSet<ContractId>) {
        self.contracts.retain(|c| remote_ids.contains(&c.contract_id));
    }

    pub fn merge(&mut self, expanded: Vec<Contract>) {
        let known = self.ids();
        self.contracts.extend(
            expanded
                .into_iter()
                .filter(|c| !known.contains(&c.contract_id)),
        );
    }

    pub fn sorted_by_id(mut self) -> Self {
        self.contracts.sort_by_key(|c| c.contract_id);
        self
    }
}

/// Subset of the snapshot restricted to contracts carrying at least one
/// blueprint item. Always rebuilt wholesale from the snapshot, never merged
/// incrementally.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct FilteredProjection {
    pub contracts: Vec<Contract>,
}

impl FilteredProjection {
    pub fn from_snapshot(snapshot: &ContractSnapshot) -> Self {
        Self {
            contracts: snapshot
                .contracts
                .iter()
                .filter(|c| c.has_blueprint_item())
                .cloned()
                .collect_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BlueprintVariant, CharacterId, ContractItem, ContractKind, ContractStatus, CorporationId,
        LocationId, TypeId,
    };

    fn contract(id: i64, variant: BlueprintVariant) -> Contract {
        Contract {
            contract_id: ContractId(id),
            kind: ContractKind::ItemExchange,
            status: ContractStatus::Outstanding,
            issuer_id: CharacterId(1),
            issuer_corporation_id: CorporationId(2),
            issuer_name: "Issuer".to_string(),
            issuer_corporation_name: "Corp".to_string(),
            start_location_id: LocationId(60003760),
            price: 100.0,
            title: "".to_string(),
            date_issued: Default::default(),
            items: vec![ContractItem {
                type_id: TypeId(42),
                name: "Item".to_string(),
                quantity: 1,
                is_blueprint_copy: variant == BlueprintVariant::Copy,
                variant,
                material_efficiency: None,
                time_efficiency: None,
            }],
            item_count: 1,
        }
    }

    #[test]
    fn retain_and_merge_enforce_the_set_difference_invariant() {
        let mut snapshot = ContractSnapshot {
            contracts: vec![
                contract(1, BlueprintVariant::None),
                contract(2, BlueprintVariant::Copy),
            ],
        };

        let remote_ids: HashSet<ContractId> = [ContractId(2), ContractId(3)].into_iter().collect();
        snapshot.retain_ids(&remote_ids);
        snapshot.merge(vec![contract(3, BlueprintVariant::Original)]);

        assert_eq!(snapshot.ids(), remote_ids);
    }

    #[test]
    fn merge_never_duplicates_known_ids() {
        let mut snapshot = ContractSnapshot {
            contracts: vec![contract(1, BlueprintVariant::None)],
        };
        snapshot.merge(vec![contract(1, BlueprintVariant::Copy)]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.get(ContractId(1)).unwrap().items[0].variant,
            BlueprintVariant::None
        );
    }

    #[test]
    fn filtered_projection_keeps_only_blueprint_contracts() {
        let snapshot = ContractSnapshot {
            contracts: vec![
                contract(1, BlueprintVariant::None),
                contract(2, BlueprintVariant::Copy),
                contract(3, BlueprintVariant::Original),
            ],
        };

        let filtered = FilteredProjection::from_snapshot(&snapshot);
        assert_eq!(
            filtered
                .contracts
                .iter()
                .map(|c| c.contract_id)
                .collect::<Vec<_>>(),
            vec![ContractId(2), ContractId(3)]
        );
    }
}
