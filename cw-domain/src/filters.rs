use crate::{CharacterId, Contract};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Caller-supplied narrowing of the competitor set. An empty filter passes
/// every candidate.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct CompetitionFilters {
    /// When present, only contracts from these issuers count as competitors.
    pub issuer_allow_list: Option<HashSet<CharacterId>>,
    /// When present, the candidate's issuer name, corporation name, or title
    /// must contain this substring (case-insensitive).
    pub issuer_substring: Option<String>,
}

impl CompetitionFilters {
    pub fn passes(&self, candidate: &Contract) -> bool {
        if let Some(allow_list) = &self.issuer_allow_list {
            if !allow_list.contains(&candidate.issuer_id) {
                return false;
            }
        }

        if let Some(needle) = &self.issuer_substring {
            let needle = needle.to_lowercase();
            let matches = candidate.issuer_name.to_lowercase().contains(&needle)
                || candidate
                    .issuer_corporation_name
                    .to_lowercase()
                    .contains(&needle)
                || candidate.title.to_lowercase().contains(&needle);
            if !matches {
                return false;
            }
        }

        true
    }
}
