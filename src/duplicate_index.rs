// 📇 Duplicate Index - Facility id → every group it belongs to
//
// Built in a single pass over the materialized groups. A facility can sit in
// several groups across several attribute types; each `(type, key)` appears
// at most once per facility.

use crate::grouping::{AttributeType, GroupSet};
use crate::records::FacilityId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One group membership as seen from a single facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub attribute: AttributeType,
    pub key: String,

    /// Every other member of the group, in group order
    pub other_member_ids: Vec<FacilityId>,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    by_facility: HashMap<FacilityId, Vec<GroupMembership>>,
}

impl DuplicateIndex {
    pub fn build(groups: &GroupSet) -> Self {
        let mut by_facility: HashMap<FacilityId, Vec<GroupMembership>> = HashMap::new();
        let mut seen: HashSet<(FacilityId, AttributeType, String)> = HashSet::new();

        for group in groups.iter() {
            for member in &group.members {
                let identity = (member.clone(), group.attribute, group.key.clone());
                if !seen.insert(identity) {
                    continue;
                }

                let others = group
                    .members
                    .iter()
                    .filter(|m| *m != member)
                    .cloned()
                    .collect();

                by_facility
                    .entry(member.clone())
                    .or_default()
                    .push(GroupMembership {
                        attribute: group.attribute,
                        key: group.key.clone(),
                        other_member_ids: others,
                    });
            }
        }

        DuplicateIndex { by_facility }
    }

    /// Memberships of a facility (empty slice if it belongs to no group)
    pub fn memberships(&self, facility_id: &str) -> &[GroupMembership] {
        self.by_facility
            .get(facility_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, facility_id: &str) -> bool {
        self.by_facility.contains_key(facility_id)
    }

    /// Number of facilities with at least one membership
    pub fn facility_count(&self) -> usize {
        self.by_facility.len()
    }

    /// Distinct attribute types a facility is linked by, in type order
    pub fn badges(&self, facility_id: &str) -> Vec<AttributeType> {
        let mut types: Vec<AttributeType> = self
            .memberships(facility_id)
            .iter()
            .map(|m| m.attribute)
            .collect();
        types.sort();
        types.dedup();
        types
    }
}

// ============================================================================
// TESTS
// ============================================================================
