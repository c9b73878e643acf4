use std::collections::BTreeMap;

use crate::error::{StyleError, TransformError};

use super::profile::{Style, StyleProfile};

/// Read-only registry of style profiles, keyed by name.
///
/// The registry is populated once from the built-in [`Style`] set and never
/// mutated afterwards, so it can be shared freely between concurrent requests.
/// Unknown names are an error; there is no default style.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    styles: BTreeMap<&'static str, Style>,
}

impl StyleRegistry {
    /// Create a registry with all built-in styles.
    ///
    /// Every profile is validated; a misconfigured constant fails here instead
    /// of on the first request that uses it.
    pub fn new() -> Result<Self, TransformError> {
        let mut styles = BTreeMap::new();
        for style in Style::ALL {
            style.profile().validate()?;
            styles.insert(style.name(), style);
        }
        Ok(Self { styles })
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Result<&'static StyleProfile, StyleError> {
        self.resolve(name).map(|style| style.profile())
    }

    /// Look up the style variant by name.
    pub fn resolve(&self, name: &str) -> Result<Style, StyleError> {
        self.styles
            .get(name)
            .copied()
            .ok_or_else(|| StyleError::UnknownStyle {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Check if a style is available.
    pub fn contains(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    /// All style names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.styles.keys().copied().collect()
    }

    /// All profiles in name order.
    pub fn profiles(&self) -> impl Iterator<Item = &'static StyleProfile> + '_ {
        self.styles.values().map(|style| style.profile())
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}
