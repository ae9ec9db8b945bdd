//! Facility identifiers and their fixed adjacency groups.
//!
//! A facility (court) is addressed on the booking page by the DOM id of its
//! checkbox, `facilityNo<N>`. Courts are physically laid out in rows; two
//! neighbours inside the same row form an "adjacent pair".

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// DOM id prefix the site uses for facility checkboxes.
pub const FACILITY_PREFIX: &str = "facilityNo";

/// Opaque facility token (the checkbox id on the page).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(String);

impl FacilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_number(n: u32) -> Self {
        Self(format!("{FACILITY_PREFIX}{n}"))
    }

    /// Court number, if the id follows the site's `facilityNo<N>` scheme.
    pub fn number(&self) -> Option<u32> {
        self.0.strip_prefix(FACILITY_PREFIX)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses a user-facing court entry: either a bare number (`"5"`) or an
    /// already-prefixed id (`"facilityNo5"`).
    pub fn parse_entry(entry: &str) -> Result<Self, ModelError> {
        let entry = entry.trim();
        if let Some(rest) = entry.strip_prefix(FACILITY_PREFIX) {
            if rest.parse::<u32>().is_ok() {
                return Ok(Self::new(entry));
            }
        }
        entry
            .parse::<u32>()
            .map(Self::from_number)
            .map_err(|_| ModelError::InvalidFacility(entry.to_string()))
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FacilityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Fixed adjacency groups. Order matters: groups are searched in definition
/// order and pairs are enumerated left to right inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<FacilityId>>", into = "Vec<Vec<FacilityId>>")]
pub struct FacilityLayout {
    groups: Vec<Vec<FacilityId>>,
}

impl TryFrom<Vec<Vec<FacilityId>>> for FacilityLayout {
    type Error = ModelError;

    fn try_from(groups: Vec<Vec<FacilityId>>) -> Result<Self, Self::Error> {
        Self::new(groups)
    }
}

impl From<FacilityLayout> for Vec<Vec<FacilityId>> {
    fn from(layout: FacilityLayout) -> Self {
        layout.groups
    }
}

impl FacilityLayout {
    pub fn new(groups: Vec<Vec<FacilityId>>) -> Result<Self, ModelError> {
        let groups: Vec<_> = groups.into_iter().filter(|g| !g.is_empty()).collect();
        if groups.is_empty() {
            return Err(ModelError::EmptyLayout);
        }
        Ok(Self { groups })
    }

    /// Builds a layout from court numbers, e.g. `[[1, 2, 3, 4], [5, 6, 7, 8]]`.
    pub fn from_numbers(groups: &[&[u32]]) -> Result<Self, ModelError> {
        Self::new(
            groups
                .iter()
                .map(|g| g.iter().copied().map(FacilityId::from_number).collect())
                .collect(),
        )
    }

    pub fn groups(&self) -> &[Vec<FacilityId>] {
        &self.groups
    }

    /// Index of the first group containing `id`.
    pub fn group_of(&self, id: &FacilityId) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(id))
    }

    /// Order in which groups are searched for adjacent pairs.
    ///
    /// Groups holding a preferred facility come first, in the order the
    /// preferences were given, each group at most once. All other groups
    /// follow in definition order.
    pub fn search_order(&self, preferred: &[FacilityId]) -> Vec<&[FacilityId]> {
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(self.groups.len());

        for id in preferred {
            if let Some(idx) = self.group_of(id) {
                if seen.insert(idx) {
                    order.push(self.groups[idx].as_slice());
                }
            }
        }

        for (idx, group) in self.groups.iter().enumerate() {
            if seen.insert(idx) {
                order.push(group.as_slice());
            }
        }

        order
    }
}

impl Default for FacilityLayout {
    /// The site's three rows of four courts.
    fn default() -> Self {
        Self {
            groups: (0..3)
                .map(|row| (1..=4).map(|i| FacilityId::from_number(row * 4 + i)).collect())
                .collect(),
        }
    }
}

/// Neighbouring pairs inside one group, left to right.
pub fn adjacent_pairs(group: &[FacilityId]) -> impl Iterator<Item = (&FacilityId, &FacilityId)> {
    group.windows(2).map(|w| (&w[0], &w[1]))
}
