//! Per-stream test exclusions
//!
//! Maps a resource id to the set of test tags that must not run against it.
//! Validated once at load time so workers never parse skip rules themselves.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shared::ResourceId;

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipMap {
    entries: BTreeMap<ResourceId, BTreeSet<String>>,
}

impl SkipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from command-line groups of the form `[stream, tag, tag, ...]`
    pub fn from_groups(groups: &[Vec<String>]) -> HarnessResult<Self> {
        let mut map = SkipMap::new();
        for group in groups {
            let (stream, tags) = match group.split_first() {
                Some((stream, tags)) if !tags.is_empty() => (stream, tags),
                _ => {
                    return Err(HarnessError::configuration(format!(
                        "skip entry {group:?} must name a stream followed by at least one tag"
                    )));
                }
            };
            let resource = ResourceId::new(stream.as_str())?;
            map.insert(resource, tags.iter().cloned());
        }
        Ok(map)
    }

    pub fn insert<I, S>(&mut self, resource: ResourceId, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.entries.entry(resource).or_default();
        for tag in tags {
            let tag = tag.into();
            let tag = tag.trim();
            if !tag.is_empty() {
                entry.insert(tag.to_string());
            }
        }
    }

    /// Merge another map into this one, unioning tag sets
    pub fn merge(&mut self, other: SkipMap) {
        for (resource, tags) in other.entries {
            self.entries.entry(resource).or_default().extend(tags);
        }
    }

    pub fn excluded_tags(&self, resource: &ResourceId) -> Option<&BTreeSet<String>> {
        self.entries.get(resource)
    }

    /// First tag of `tags` excluded for `resource`, if any
    pub fn skip_reason<'a>(&self, resource: &ResourceId, tags: &[&'a str]) -> Option<&'a str> {
        let excluded = self.entries.get(resource)?;
        tags.iter().copied().find(|tag| excluded.contains(*tag))
    }

    /// Every resource named here must be one of the declared resources
    pub fn validate_against(&self, declared: &[ResourceId]) -> HarnessResult<()> {
        for resource in self.entries.keys() {
            if !declared.contains(resource) {
                return Err(HarnessError::configuration(format!(
                    "skip rules reference undeclared stream '{resource}'"
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
