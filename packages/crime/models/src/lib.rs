#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Offense category taxonomy for the crime log.
//!
//! The source case log reports a free-text offense description per
//! incident. Descriptions are bucketed into a small [`OffenseCategory`]
//! enum by exact membership in an [`OffenseTaxonomy`], which is loaded
//! from configuration rather than compiled in.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Top-level offense groupings used by downstream analysis.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum OffenseCategory {
    /// Crimes against persons (assault, murder, threats)
    #[serde(rename = "violent_crime")]
    #[strum(serialize = "violent_crime")]
    Violent,
    /// Crimes against property (larceny, burglary, vandalism)
    #[serde(rename = "property_crime")]
    #[strum(serialize = "property_crime")]
    Property,
    /// Everything not listed in the taxonomy
    #[serde(rename = "other_crime")]
    #[strum(serialize = "other_crime")]
    Other,
}

impl OffenseCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Violent, Self::Property, Self::Other]
    }
}

/// Offense descriptions that map to the violent and property categories.
///
/// Matching is exact and case-sensitive: the lists must contain the
/// descriptions verbatim as the source publishes them (including the
/// source's own spelling quirks).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffenseTaxonomy {
    /// Descriptions classified as [`OffenseCategory::Violent`].
    #[serde(default)]
    pub violent: BTreeSet<String>,
    /// Descriptions classified as [`OffenseCategory::Property`].
    #[serde(default)]
    pub property: BTreeSet<String>,
}

impl OffenseTaxonomy {
    /// Builds a taxonomy from two description lists.
    #[must_use]
    pub fn new<V, P>(violent: V, property: P) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            violent: violent.into_iter().map(Into::into).collect(),
            property: property.into_iter().map(Into::into).collect(),
        }
    }

    /// Classifies an offense description.
    ///
    /// Violent membership is checked first, so a description listed in
    /// both sets is violent.
    #[must_use]
    pub fn classify(&self, description: &str) -> OffenseCategory {
        if self.violent.contains(description) {
            OffenseCategory::Violent
        } else if self.property.contains(description) {
            OffenseCategory::Property
        } else {
            OffenseCategory::Other
        }
    }

    /// Descriptions that appear in both lists.
    #[must_use]
    pub fn overlapping(&self) -> Vec<&str> {
        self.violent
            .intersection(&self.property)
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    fn taxonomy() -> OffenseTaxonomy {
        OffenseTaxonomy::new(
            ["Assault, Aggravated", "Murder\\Manslaughter"],
            ["Burglary", "Larceny, Other"],
        )
    }

    #[test]
    fn classifies_by_exact_membership() {
        let t = taxonomy();
        assert_eq!(t.classify("Assault, Aggravated"), OffenseCategory::Violent);
        assert_eq!(t.classify("Burglary"), OffenseCategory::Property);
        assert_eq!(t.classify("Jaywalking"), OffenseCategory::Other);
    }

    #[test]
    fn classification_is_case_sensitive() {
        let t = taxonomy();
        assert_eq!(t.classify("burglary"), OffenseCategory::Other);
        assert_eq!(t.classify("Burglary "), OffenseCategory::Other);
    }

    #[test]
    fn category_string_forms() {
        assert_eq!(OffenseCategory::Violent.to_string(), "violent_crime");
        assert_eq!(OffenseCategory::Property.as_ref(), "property_crime");
        assert_eq!(
            OffenseCategory::from_str("other_crime").unwrap(),
            OffenseCategory::Other
        );
        assert_eq!(
            serde_json::to_string(&OffenseCategory::Violent).unwrap(),
            "\"violent_crime\""
        );
    }

    #[test]
    fn detects_overlap() {
        let t = OffenseTaxonomy::new(["Robbery"], ["Robbery", "Arson"]);
        assert_eq!(t.overlapping(), vec!["Robbery"]);
        assert_eq!(t.classify("Robbery"), OffenseCategory::Violent);
    }
}
