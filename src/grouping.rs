// 🔗 Key Extractor / Grouper - Bucket facilities by shared normalized keys
//
// One pass per attribute type. Each pass owns its bucket map, so the four
// passes run in parallel and are merged afterwards in fixed type order.
// Buckets with fewer than two members never become groups.

use crate::config::KeyThresholds;
use crate::normalize::{digit_count, normalize};
use crate::records::{Facility, FacilityId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// ATTRIBUTE TYPE
// ============================================================================

/// Kind of shared attribute linking two facilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// Same street address
    Address,

    /// Same phone number
    Phone,

    /// Same owning business / licensee
    Owner,

    /// Same administrator contact
    Admin,
}

impl AttributeType {
    /// All types, in merge order
    pub const ALL: [AttributeType; 4] = [
        AttributeType::Address,
        AttributeType::Phone,
        AttributeType::Owner,
        AttributeType::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Address => "address",
            AttributeType::Phone => "phone",
            AttributeType::Owner => "owner",
            AttributeType::Admin => "admin",
        }
    }

    /// Raw field this type reads from a facility
    pub fn raw_value<'a>(&self, facility: &'a Facility) -> Option<&'a str> {
        match self {
            AttributeType::Address => facility.address.as_deref(),
            AttributeType::Phone => facility.phone.as_deref(),
            AttributeType::Owner => facility.business_name.as_deref(),
            AttributeType::Admin => facility.contact_email.as_deref(),
        }
    }

    /// Whether a normalized key is long enough to anchor a group.
    ///
    /// Phone keys count digits only.
    pub fn accepts(&self, key: &str, thresholds: &KeyThresholds) -> bool {
        let len = key.len();
        match self {
            AttributeType::Address => len > thresholds.address_min_len,
            AttributeType::Phone => digit_count(key) >= thresholds.phone_min_digits,
            AttributeType::Owner => len > thresholds.owner_min_len,
            AttributeType::Admin => len > thresholds.admin_min_len,
        }
    }

    /// Normalized key for a facility, or `None` if below threshold
    pub fn key_for(&self, facility: &Facility, thresholds: &KeyThresholds) -> Option<String> {
        let key = normalize(self.raw_value(facility));
        if self.accepts(&key, thresholds) {
            Some(key)
        } else {
            None
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DUPLICATE GROUP
// ============================================================================

/// Facilities sharing one normalized key under one attribute type.
///
/// Always has at least two members, in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub attribute: AttributeType,
    pub key: String,
    pub members: Vec<FacilityId>,
}

impl DuplicateGroup {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, facility_id: &str) -> bool {
        self.members.iter().any(|m| m == facility_id)
    }
}

// ============================================================================
// GROUP SET
// ============================================================================

/// All materialized duplicate groups of one batch.
///
/// Groups are ordered by attribute type (see [`AttributeType::ALL`]), then
/// by the position of each key's first facility in the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSet {
    groups: Vec<DuplicateGroup>,
}

impl GroupSet {
    pub fn from_groups(groups: Vec<DuplicateGroup>) -> Self {
        GroupSet { groups }
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter()
    }

    pub fn of_type(&self, attribute: AttributeType) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(move |g| g.attribute == attribute)
    }

    /// Look up a group by `(type, key)`
    pub fn get(&self, attribute: AttributeType, key: &str) -> Option<&DuplicateGroup> {
        self.groups
            .iter()
            .find(|g| g.attribute == attribute && g.key == key)
    }

    /// Number of groups per attribute type (types without groups omitted)
    pub fn counts_by_type(&self) -> HashMap<AttributeType, usize> {
        let mut counts = HashMap::new();
        for group in &self.groups {
            *counts.entry(group.attribute).or_insert(0) += 1;
        }
        counts
    }
}

// ============================================================================
// GROUPING
// ============================================================================

/// Bucket facilities by normalized key for a single attribute type.
///
/// Returns only buckets with two or more members.
pub fn group_by_attribute(
    attribute: AttributeType,
    facilities: &[Facility],
    thresholds: &KeyThresholds,
) -> Vec<DuplicateGroup> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(String, Vec<FacilityId>)> = Vec::new();
    let mut skipped = 0usize;

    for facility in facilities {
        let key = match attribute.key_for(facility, thresholds) {
            Some(k) => k,
            None => {
                skipped += 1;
                continue;
            }
        };

        match positions.get(&key) {
            Some(&pos) => buckets[pos].1.push(facility.id.clone()),
            None => {
                positions.insert(key.clone(), buckets.len());
                buckets.push((key, vec![facility.id.clone()]));
            }
        }
    }

    let groups: Vec<DuplicateGroup> = buckets
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(key, members)| DuplicateGroup {
            attribute,
            key,
            members,
        })
        .collect();

    debug!(
        attribute = attribute.as_str(),
        groups = groups.len(),
        skipped,
        "grouping pass finished"
    );

    groups
}

/// Run all four grouping passes and merge them into one [`GroupSet`].
pub fn group_facilities(facilities: &[Facility], thresholds: &KeyThresholds) -> GroupSet {
    let per_type: Vec<Vec<DuplicateGroup>> = AttributeType::ALL
        .par_iter()
        .map(|attribute| group_by_attribute(*attribute, facilities, thresholds))
        .collect();

    let groups: Vec<DuplicateGroup> = per_type.into_iter().flatten().collect();
    let set = GroupSet::from_groups(groups);

    let counts = set.counts_by_type();
    info!(
        address = counts.get(&AttributeType::Address).copied().unwrap_or(0),
        phone = counts.get(&AttributeType::Phone).copied().unwrap_or(0),
        owner = counts.get(&AttributeType::Owner).copied().unwrap_or(0),
        admin = counts.get(&AttributeType::Admin).copied().unwrap_or(0),
        "duplicate groups materialized"
    );

    set
}

// ============================================================================
// TESTS
// ============================================================================
