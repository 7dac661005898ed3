//! Which catalog entries a run should process.

use std::collections::HashMap;

use crate::catalog::DatasetDescriptor;
use crate::state::StateRecord;

pub const DEFAULT_THEME_KEYWORD: &str = "hospital";

/// Case-insensitive substring match on the descriptor's theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeFilter {
    keyword: String,
}

impl ThemeFilter {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn matches(&self, descriptor: &DatasetDescriptor) -> bool {
        descriptor.theme.contains_ignore_case(&self.keyword)
    }
}

impl Default for ThemeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_THEME_KEYWORD)
    }
}

/// Unseen identifiers always qualify; seen ones only when `modified` sorts
/// strictly after the recorded value. Plain string ordering, no timezone handling.
pub fn needs_update(descriptor: &DatasetDescriptor, state: &StateRecord) -> bool {
    match state.last_modified(&descriptor.identifier) {
        None => true,
        Some(recorded) => descriptor.modified.as_str() > recorded,
    }
}

/// One descriptor per identifier: the entry with the greatest `modified`
/// (the earlier one on ties), at the position where the identifier first appears.
pub fn latest_per_identifier(descriptors: &[DatasetDescriptor]) -> Vec<&DatasetDescriptor> {
    let mut kept: Vec<&DatasetDescriptor> = Vec::with_capacity(descriptors.len());
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for descriptor in descriptors {
        let Some(&slot) = slots.get(descriptor.identifier.as_str()) else {
            slots.insert(descriptor.identifier.as_str(), kept.len());
            kept.push(descriptor);
            continue;
        };
        let current = kept[slot];
        let (newest, dropped) = if descriptor.modified > current.modified {
            (descriptor, current)
        } else {
            (current, descriptor)
        };
        tracing::warn!(
            dataset = %descriptor.identifier,
            kept = %newest.modified,
            dropped = %dropped.modified,
            "duplicate catalog identifier, keeping the newest entry"
        );
        kept[slot] = newest;
    }
    kept
}

/// Descriptors passing both the theme filter and [`needs_update`], in catalog
/// order, with duplicate identifiers reduced by [`latest_per_identifier`].
pub fn select<'a>(
    descriptors: &'a [DatasetDescriptor],
    theme: &ThemeFilter,
    state: &StateRecord,
) -> Vec<&'a DatasetDescriptor> {
    latest_per_identifier(descriptors)
        .into_iter()
        .filter(|descriptor| theme.matches(descriptor) && needs_update(descriptor, state))
        .collect()
}
