//! Layered structural merge.
//!
//! Typed specs are lowered to JSON, merged field by field and lifted back, so
//! the merge rules live here once instead of at each call site. The strategy
//! of a field follows from its schema shape:
//!
//! | shape    | strategy          | unset means        |
//! |----------|-------------------|--------------------|
//! | mapping  | `RecurseMapping`  | never (recurse)    |
//! | sequence | `ReplaceSequence` | empty sequence     |
//! | scalar   | `ReplaceScalar`   | `null` or `""`     |
//!
//! A mapping meeting a non-mapping (or a sequence meeting a non-sequence) is a
//! [`NodeAgentError::MergeFailure`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{NodeAgentError, NodeAgentResult};

/// How an overlay value combines with the base value at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Keys in the overlay replace or add entries, recursively.
    RecurseMapping,
    /// A non-empty overlay sequence replaces the base wholesale.
    ReplaceSequence,
    /// A set overlay scalar replaces the base.
    ReplaceScalar,
}

impl MergeStrategy {
    /// Strategy for a value; `None` for `null`, which never changes the base.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(_) => Some(MergeStrategy::RecurseMapping),
            Value::Array(_) => Some(MergeStrategy::ReplaceSequence),
            Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Some(MergeStrategy::ReplaceScalar)
            }
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            MergeStrategy::RecurseMapping => "mapping",
            MergeStrategy::ReplaceSequence => "sequence",
            MergeStrategy::ReplaceScalar => "scalar",
        }
    }
}

/// Whether an overlay value counts as set. `false` and `0` are set values.
pub fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Merge `overlay` into `base` in place. `path` names `base` in errors.
pub fn merge_value(base: &mut Value, overlay: &Value, path: &str) -> NodeAgentResult<()> {
    let Some(strategy) = MergeStrategy::of(overlay) else {
        return Ok(());
    };

    let Some(base_strategy) = MergeStrategy::of(base) else {
        if is_set(overlay) {
            *base = overlay.clone();
        }
        return Ok(());
    };

    if strategy != base_strategy
        && (strategy != MergeStrategy::ReplaceScalar
            || base_strategy != MergeStrategy::ReplaceScalar)
    {
        return Err(NodeAgentError::merge(
            display_path(path),
            format!(
                "cannot merge {} over {}",
                strategy.shape(),
                base_strategy.shape()
            ),
        ));
    }

    match (strategy, base, overlay) {
        (MergeStrategy::RecurseMapping, Value::Object(base_map), Value::Object(overlay_map)) => {
            merge_mapping(base_map, overlay_map, path)
        }
        (_, base, overlay) => {
            if is_set(overlay) {
                *base = overlay.clone();
            }
            Ok(())
        }
    }
}

fn merge_mapping(
    base: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
    path: &str,
) -> NodeAgentResult<()> {
    for (key, value) in overlay {
        let child = child_path(path, key);
        match base.get_mut(key) {
            Some(slot) => merge_value(slot, value, &child)?,
            None => {
                if is_set(value) {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Ok(())
}

/// Merge typed `overlay` over typed `base`, returning a new value.
pub fn merge<T>(base: &T, overlay: &T) -> NodeAgentResult<T>
where
    T: Serialize + DeserializeOwned,
{
    merge_at(base, overlay, "")
}

/// Like [`merge`], with `path` naming the merged field in errors.
pub fn merge_at<T>(base: &T, overlay: &T, path: &str) -> NodeAgentResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(base)?;
    let overlay = serde_json::to_value(overlay)?;
    merge_value(&mut merged, &overlay, path)?;
    serde_json::from_value(merged)
        .map_err(|e| NodeAgentError::merge(display_path(path), e.to_string()))
}

/// Fold `layers` left to right over `base`; later layers win.
pub fn merge_layers<'a, T, I>(base: &T, layers: I) -> NodeAgentResult<T>
where
    T: Serialize + DeserializeOwned + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut merged = serde_json::to_value(base)?;
    for layer in layers {
        let overlay = serde_json::to_value(layer)?;
        merge_value(&mut merged, &overlay, "")?;
    }
    serde_json::from_value(merged).map_err(|e| NodeAgentError::merge("<root>", e.to_string()))
}

/// Drop `null` entries from mappings, recursively. Used when rendering typed
/// values into control-plane manifests.
pub fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(prune_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(prune_nulls),
        _ => {}
    }
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}
