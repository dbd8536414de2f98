use serde::{Deserialize, Serialize};

/// Progress of a single dataset item, as reported by the remote worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Initial,
    Downloading,
    Downloaded,
    NoWorkflow,
    NoDqmio,
    NoRoot,
    NoMatch,
    Failed,
}

impl ItemStatus {
    /// Statuses after which the item will never take part in a comparison.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            ItemStatus::NoWorkflow
                | ItemStatus::NoDqmio
                | ItemStatus::NoRoot
                | ItemStatus::NoMatch
                | ItemStatus::Failed
        )
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Initial => write!(f, "initial"),
            ItemStatus::Downloading => write!(f, "downloading"),
            ItemStatus::Downloaded => write!(f, "downloaded"),
            ItemStatus::NoWorkflow => write!(f, "no_workflow"),
            ItemStatus::NoDqmio => write!(f, "no_dqmio"),
            ItemStatus::NoRoot => write!(f, "no_root"),
            ItemStatus::NoMatch => write!(f, "no_match"),
            ItemStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One reference or target dataset inside a category.
///
/// `name` is the external workflow name. The file fields are filled in by the
/// remote worker once it has resolved and downloaded the DQMIO file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub status: ItemStatus,
}

impl Item {
    pub fn new(name: &str) -> Self {
        Self {
            name: sanitize_name(name),
            file_name: String::new(),
            file_url: String::new(),
            file_size: 0,
            status: ItemStatus::Initial,
        }
    }

    /// Forget everything the remote side reported, keep only the name.
    pub fn reset(&mut self) {
        *self = Item::new(&self.name);
    }

    pub fn has_file(&self) -> bool {
        !self.file_name.is_empty()
    }
}

/// Item as accepted from clients: a bare workflow name or a full object.
///
/// Converted into [`Item`] once, when the category is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemInput {
    Name(String),
    Full(Item),
}

impl From<ItemInput> for Item {
    fn from(input: ItemInput) -> Self {
        match input {
            ItemInput::Name(name) => Item::new(&name),
            ItemInput::Full(item) => Item {
                name: sanitize_name(&item.name),
                ..item
            },
        }
    }
}

/// Trim and replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
