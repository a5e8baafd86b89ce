// Helper functions for extracting values from KDL nodes

use crate::{ConfigError, ConfigResult};
use kdl::KdlNode;

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

/// First positional argument as an unsigned integer that must be at least one.
pub(crate) fn get_positive_arg(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value =
        get_first_integer_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    positive(value, field)
}

/// Named property as an unsigned integer that must be at least one.
pub(crate) fn get_positive_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<u64>> {
    match node.get(name) {
        None => Ok(None),
        Some(v) => {
            let value = v.as_integer().ok_or_else(|| ConfigError::InvalidValue {
                field: name.to_string(),
                message: "expected an integer".to_string(),
            })?;
            positive(value, name).map(Some)
        }
    }
}

fn positive(value: i128, field: &str) -> ConfigResult<u64> {
    if value < 1 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be at least 1, got {}", value),
        });
    }
    u64::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is too large", value),
    })
}
