// crates/exam-catalog-core/src/core/filter_option.rs
// ============================================================================
// Module: Exam Catalog Filter Options
// Description: Search facet options (regions, prefectures, fields, ...).
// Purpose: Model the auxiliary filter vocabulary and its parent rules.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Filter options are an independent vocabulary used by search facets. They
//! are not part of the University aggregate. A prefecture may point at its
//! region and a sub-classification at its classification; every other
//! category is parentless.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FilterOptionId;
use crate::core::model::RecordMeta;

// ============================================================================
// SECTION: Categories
// ============================================================================

/// Filter option category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterCategory {
    /// Geographic region (関東, 関西, ...).
    Region,
    /// Prefecture, child of a region.
    Prefecture,
    /// Exam schedule label.
    Schedule,
    /// Academic field.
    AcademicField,
    /// University classification (国立, 私立, ...).
    Classification,
    /// Sub-classification, child of a classification.
    SubClassification,
}

impl FilterCategory {
    /// All categories in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Region,
        Self::Prefecture,
        Self::Schedule,
        Self::AcademicField,
        Self::Classification,
        Self::SubClassification,
    ];

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Region => "REGION",
            Self::Prefecture => "PREFECTURE",
            Self::Schedule => "SCHEDULE",
            Self::AcademicField => "ACADEMIC_FIELD",
            Self::Classification => "CLASSIFICATION",
            Self::SubClassification => "SUB_CLASSIFICATION",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == label)
    }

    /// Maximum name length for options in this category.
    #[must_use]
    pub const fn max_name_chars(self) -> usize {
        match self {
            Self::Region => 20,
            Self::Prefecture | Self::Schedule => 10,
            Self::AcademicField | Self::Classification | Self::SubClassification => 50,
        }
    }

    /// Category a parent option must belong to, if parents are allowed.
    #[must_use]
    pub const fn parent_category(self) -> Option<Self> {
        match self {
            Self::Prefecture => Some(Self::Region),
            Self::SubClassification => Some(Self::Classification),
            Self::Region | Self::Schedule | Self::AcademicField | Self::Classification => None,
        }
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Filter Option
// ============================================================================

/// Single filter option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FilterOptionId>,
    /// Option category.
    pub category: FilterCategory,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Optional parent option (same table).
    #[serde(default)]
    pub parent_id: Option<FilterOptionId>,
    /// Sort key among options of the same category.
    #[serde(default)]
    pub display_order: i32,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl FilterOption {
    /// Creates an unsaved, parentless option.
    #[must_use]
    pub fn new(category: FilterCategory, name: impl Into<String>, display_order: i32) -> Self {
        Self {
            id: None,
            category,
            name: name.into(),
            parent_id: None,
            display_order,
            meta: RecordMeta::default(),
        }
    }

    /// Sets the parent option and returns the option.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: FilterOptionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_parse_back() {
        for category in FilterCategory::ALL {
            assert_eq!(FilterCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(FilterCategory::parse("region"), None);
    }

    #[test]
    fn only_prefecture_and_sub_classification_have_parents() {
        assert_eq!(FilterCategory::Prefecture.parent_category(), Some(FilterCategory::Region));
        assert_eq!(
            FilterCategory::SubClassification.parent_category(),
            Some(FilterCategory::Classification)
        );
        assert_eq!(FilterCategory::Region.parent_category(), None);
        assert_eq!(FilterCategory::AcademicField.parent_category(), None);
    }
}
