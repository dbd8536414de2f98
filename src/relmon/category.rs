use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{RelmonError, Result};
use crate::relmon::item::{Item, ItemInput};

/// Name of the category whose items are additionally bucketed by run number.
pub const DATA_CATEGORY: &str = "Data";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HltMode {
    #[default]
    No,
    Only,
    Both,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    #[default]
    Initial,
    Comparing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default, alias = "HLT")]
    pub hlt: HltMode,
    #[serde(default)]
    pub automatic_pairing: bool,
    #[serde(default)]
    pub status: CategoryStatus,
    #[serde(default)]
    pub reference: Vec<Item>,
    #[serde(default)]
    pub target: Vec<Item>,
}

impl Category {
    pub fn new(name: &str, hlt: HltMode, automatic_pairing: bool) -> Self {
        Self {
            name: name.trim().to_string(),
            hlt,
            automatic_pairing,
            status: CategoryStatus::Initial,
            reference: Vec::new(),
            target: Vec::new(),
        }
    }

    pub fn with_reference(mut self, name: &str) -> Self {
        self.reference.push(Item::new(name));
        self
    }

    pub fn with_target(mut self, name: &str) -> Self {
        self.target.push(Item::new(name));
        self
    }

    /// Whether run numbers take part in bucketing for this category.
    pub fn is_data(&self) -> bool {
        self.name == DATA_CATEGORY
    }

    /// A category missing either side cannot produce a comparison.
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty() || self.target.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.reference.len() + self.target.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.reference.iter().chain(self.target.iter())
    }

    pub fn reset(&mut self) {
        self.status = CategoryStatus::Initial;
        self.reference.iter_mut().for_each(Item::reset);
        self.target.iter_mut().for_each(Item::reset);
    }
}

/// Category as accepted from clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default, alias = "HLT")]
    pub hlt: HltMode,
    #[serde(default)]
    pub automatic_pairing: bool,
    #[serde(default)]
    pub reference: Vec<ItemInput>,
    #[serde(default)]
    pub target: Vec<ItemInput>,
}

impl From<CategoryInput> for Category {
    fn from(input: CategoryInput) -> Self {
        let mut category = Category::new(&input.name, input.hlt, input.automatic_pairing);
        category.reference = input.reference.into_iter().map(Item::from).collect();
        category.target = input.target.into_iter().map(Item::from).collect();
        category
    }
}

/// Reject category lists that repeat a name.
pub fn ensure_unique_names(categories: &[Category]) -> Result<()> {
    let mut seen = HashSet::new();
    for category in categories {
        if category.name.is_empty() {
            return Err(RelmonError::InvalidJob(
                "category name must not be empty".to_string(),
            ));
        }
        if !seen.insert(category.name.as_str()) {
            return Err(RelmonError::InvalidJob(format!(
                "duplicate category {:?}",
                category.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relmon::item::ItemStatus;

    #[test]
    fn reset_returns_items_to_initial() {
        let mut category = Category::new("FullSim", HltMode::Both, true)
            .with_reference("ref")
            .with_target("tgt");
        category.status = CategoryStatus::Done;
        category.reference[0].status = ItemStatus::Downloaded;
        category.target[0].file_name = "x.root".to_string();

        category.reset();

        assert_eq!(category.status, CategoryStatus::Initial);
        assert_eq!(category.reference[0], Item::new("ref"));
        assert_eq!(category.target[0], Item::new("tgt"));
        assert_eq!(category.hlt, HltMode::Both);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let categories = vec![
            Category::new("Data", HltMode::No, false),
            Category::new("Data", HltMode::Only, true),
        ];
        assert!(matches!(
            ensure_unique_names(&categories),
            Err(RelmonError::InvalidJob(_))
        ));
    }

    #[test]
    fn input_accepts_legacy_hlt_key() {
        let input: CategoryInput = serde_json::from_str(
            r#"{"name": " FullSim ", "HLT": "only", "automatic_pairing": true,
                "reference": ["a"], "target": [{"name": "b"}]}"#,
        )
        .unwrap();
        let category = Category::from(input);
        assert_eq!(category.name, "FullSim");
        assert_eq!(category.hlt, HltMode::Only);
        assert!(category.automatic_pairing);
        assert_eq!(category.item_count(), 2);
        assert!(!category.is_empty());
        assert!(!category.is_data());
    }
}
