//! Configuration hand-off from the host category to the script.

use super::binding::{ConfigPush, ScriptBinding};
use crate::config::ConfigCategory;
use crate::error::AppResult;

/// Category item holding the script's JSON configuration.
pub const CONFIG_ITEM_NAME: &str = "config";

/// Blob pushed when the category has no `config` item.
pub const EMPTY_CONFIGURATION: &str = "{}";

/// The script configuration held by `category`, or `{}` if it has none.
pub fn filter_configuration(category: &ConfigCategory) -> String {
    if category.item_exists(CONFIG_ITEM_NAME) {
        category
            .value(CONFIG_ITEM_NAME)
            .unwrap_or_else(|_| EMPTY_CONFIGURATION.to_string())
    } else {
        EMPTY_CONFIGURATION.to_string()
    }
}

/// Push the category's configuration into the bound script.
pub fn push_configuration(binding: &ScriptBinding, category: &ConfigCategory) -> AppResult<ConfigPush> {
    let blob = filter_configuration(category);
    binding.push_config(&blob)
}
