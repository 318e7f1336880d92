use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Encoding used to index a detail's values
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventDetailType {
    String,
    Integer,
    Float,
    Long,
    Double,
    IpAddress,
    Path,
}

impl EventDetailType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            EventDetailType::Integer
                | EventDetailType::Float
                | EventDetailType::Long
                | EventDetailType::Double
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, EventDetailType::Integer | EventDetailType::Long)
    }
}

/// A detail configured for indexing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDetailItem {
    /// Detail name as it appears on events
    pub key: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub detail_type: EventDetailType,
}

impl EventDetailItem {
    pub fn new(key: impl Into<String>, detail_type: EventDetailType) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            detail_type,
        }
    }
}

/// Registry of indexed details, keyed by detail key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedDetails {
    items: BTreeMap<String, EventDetailItem>,
}

impl IndexedDetails {
    pub fn new(items: impl IntoIterator<Item = EventDetailItem>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.key.clone(), i)).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&EventDetailItem> {
        self.items.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventDetailItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
