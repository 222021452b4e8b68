//! Host configuration category.
//!
//! A category is a JSON object whose members are configuration items; each
//! item is itself an object of string attributes:
//!
//! ```text
//! {
//!   "script": { "type": "script", "default": "", "file": "/data/scripts/lab_script_offset.rhai" },
//!   "config": { "type": "JSON", "default": "{}", "value": "{\"offset\": 5}" },
//!   "enable": { "type": "boolean", "default": "false", "value": "true" }
//! }
//! ```

use super::ConfigError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known item attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAttribute {
    /// Current value
    Value,
    /// Default value
    Default,
    /// Item type
    Type,
    /// Description
    Description,
    /// Name shown in the UI
    DisplayName,
    /// Display order
    Order,
    /// Path of an uploaded file (script items)
    File,
}

impl ItemAttribute {
    /// Attribute name as written in the category JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemAttribute::Value => "value",
            ItemAttribute::Default => "default",
            ItemAttribute::Type => "type",
            ItemAttribute::Description => "description",
            ItemAttribute::DisplayName => "displayName",
            ItemAttribute::Order => "order",
            ItemAttribute::File => "file",
        }
    }
}

impl fmt::Display for ItemAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a named configuration category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigCategory {
    name: String,
    items: BTreeMap<String, Map<String, Value>>,
}

impl ConfigCategory {
    /// Parse a category from its JSON text.
    ///
    /// Members that are not objects are kept as items whose only attribute is
    /// `value`.
    pub fn new(name: impl Into<String>, json: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let root: Value = serde_json::from_str(json)?;
        let Value::Object(members) = root else {
            return Err(ConfigError::NotAnObject(name));
        };

        let items = members
            .into_iter()
            .map(|(item, value)| {
                let attributes = match value {
                    Value::Object(attributes) => attributes,
                    other => {
                        let mut attributes = Map::new();
                        attributes.insert("value".to_string(), other);
                        attributes
                    }
                };
                (item, attributes)
            })
            .collect();

        Ok(Self { name, items })
    }

    /// Empty category.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    /// Category name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the category defines `item`.
    pub fn item_exists(&self, item: &str) -> bool {
        self.items.contains_key(item)
    }

    /// Current value of an item: its `value` attribute, or `default` if unset.
    ///
    /// Non-string JSON values come back as compact JSON text.
    pub fn value(&self, item: &str) -> Result<String, ConfigError> {
        let attributes = self.attributes(item)?;
        attributes
            .get(ItemAttribute::Value.as_str())
            .or_else(|| attributes.get(ItemAttribute::Default.as_str()))
            .map(attribute_text)
            .ok_or_else(|| ConfigError::AttributeNotFound {
                item: item.to_string(),
                attribute: ItemAttribute::Value.to_string(),
            })
    }

    /// A specific attribute of an item.
    pub fn item_attribute(&self, item: &str, attribute: ItemAttribute) -> Result<String, ConfigError> {
        self.attributes(item)?
            .get(attribute.as_str())
            .map(attribute_text)
            .ok_or_else(|| ConfigError::AttributeNotFound {
                item: item.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Set an item attribute, creating the item if needed.
    pub fn set_item_attribute(&mut self, item: &str, attribute: ItemAttribute, value: impl Into<String>) {
        self.items
            .entry(item.to_string())
            .or_default()
            .insert(attribute.as_str().to_string(), Value::String(value.into()));
    }

    /// Names of all items.
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    fn attributes(&self, item: &str) -> Result<&Map<String, Value>, ConfigError> {
        self.items.get(item).ok_or_else(|| ConfigError::ItemNotFound {
            item: item.to_string(),
        })
    }
}

fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY: &str = r#"{
        "plugin": { "type": "string", "default": "script", "readonly": "true" },
        "script": { "type": "script", "default": "", "file": "/data/scripts/MyCat_script_transform.py" },
        "config": { "type": "JSON", "default": "{}", "value": { "offset": 5 } },
        "enable": { "type": "boolean", "default": "false", "value": "true" }
    }"#;

    #[test]
    fn test_parse_category() {
        let category = ConfigCategory::new("MyCat", CATEGORY).unwrap();
        assert_eq!(category.name(), "MyCat");
        assert!(category.item_exists("script"));
        assert!(!category.item_exists("missing"));
        assert_eq!(category.items().count(), 4);
    }

    #[test]
    fn test_value_falls_back_to_default() {
        let category = ConfigCategory::new("MyCat", CATEGORY).unwrap();
        assert_eq!(category.value("enable").unwrap(), "true");
        assert_eq!(category.value("plugin").unwrap(), "script");
        assert!(matches!(
            category.value("missing"),
            Err(ConfigError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_json_value_rendered_as_text() {
        let category = ConfigCategory::new("MyCat", CATEGORY).unwrap();
        assert_eq!(category.value("config").unwrap(), r#"{"offset":5}"#);
    }

    #[test]
    fn test_item_attribute() {
        let category = ConfigCategory::new("MyCat", CATEGORY).unwrap();
        assert_eq!(
            category.item_attribute("script", ItemAttribute::File).unwrap(),
            "/data/scripts/MyCat_script_transform.py"
        );
        assert!(matches!(
            category.item_attribute("config", ItemAttribute::File),
            Err(ConfigError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(matches!(
            ConfigCategory::new("x", "[1, 2]"),
            Err(ConfigError::NotAnObject(_))
        ));
        assert!(matches!(ConfigCategory::new("x", "{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_set_item_attribute() {
        let mut category = ConfigCategory::empty("x");
        category.set_item_attribute("script", ItemAttribute::File, "a_script_b.rhai");
        assert_eq!(
            category.item_attribute("script", ItemAttribute::File).unwrap(),
            "a_script_b.rhai"
        );
    }
}
