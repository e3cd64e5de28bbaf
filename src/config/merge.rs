//! Seed profile merging
//!
//! Profiles are layered in the order given on the command line: a base
//! profile followed by any number of overlays. Merging happens on raw YAML
//! values before deserialization, so an overlay only needs the keys it
//! changes.
//!
//! An overlay may carry a top-level `merge_how` key (`append`, `prepend`,
//! `replace` or `no_replace`) selecting how its lists combine with the
//! layers below it. Users are matched by `name` and interfaces by `mac`,
//! so an overlay can change a single field of an existing entry.

use serde_yaml::Value;
use tracing::debug;

/// Key selecting the list merge strategy of a profile layer
pub const MERGE_HOW_KEY: &str = "merge_how";

/// Top-level lists whose entries are identified by a field
///
/// An overlay entry with the same identity merges into the existing entry
/// instead of being added beside it.
pub const KEYED_LISTS: &[(&str, &str)] = &[("users", "name"), ("interfaces", "mac")];

/// Merge strategy for list fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMergeStrategy {
    /// Append new items to existing list
    #[default]
    Append,
    /// Prepend new items to existing list
    Prepend,
    /// Replace entire list
    Replace,
    /// No change (keep original)
    NoReplace,
}

impl ListMergeStrategy {
    /// Parse from string (as used in merge_how)
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "append" => Self::Append,
            "prepend" => Self::Prepend,
            "replace" => Self::Replace,
            "no_replace" | "noreplace" => Self::NoReplace,
            _ => Self::Append,
        }
    }
}

/// Merge two YAML values recursively
///
/// Mappings merge key by key, scalars from `overlay` win and a null overlay
/// keeps the base value.
pub fn merge_yaml_values(base: &Value, overlay: &Value, list_strategy: ListMergeStrategy) -> Value {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            let mut result = base_map.clone();

            for (key, overlay_value) in overlay_map {
                let merged = match result.get(key) {
                    Some(base_value) => merge_yaml_values(base_value, overlay_value, list_strategy),
                    None => overlay_value.clone(),
                };
                result.insert(key.clone(), merged);
            }

            Value::Mapping(result)
        }

        (Value::Sequence(base_seq), Value::Sequence(overlay_seq)) => match list_strategy {
            ListMergeStrategy::Append => {
                let mut result = base_seq.clone();
                for item in overlay_seq {
                    if !result.contains(item) {
                        result.push(item.clone());
                    }
                }
                Value::Sequence(result)
            }
            ListMergeStrategy::Prepend => {
                let mut result = overlay_seq.clone();
                for item in base_seq {
                    if !result.contains(item) {
                        result.push(item.clone());
                    }
                }
                Value::Sequence(result)
            }
            ListMergeStrategy::Replace => Value::Sequence(overlay_seq.clone()),
            ListMergeStrategy::NoReplace => Value::Sequence(base_seq.clone()),
        },

        (base_value, Value::Null) => base_value.clone(),

        (_, overlay_value) => overlay_value.clone(),
    }
}

fn entry_key(item: &Value, field: &str) -> Option<String> {
    item.get(field)
        .and_then(Value::as_str)
        .map(|key| key.trim().to_ascii_lowercase())
}

/// Merge two lists whose entries are identified by `field`
///
/// Entries sharing a key merge recursively. Other overlay entries are added
/// according to the strategy.
pub fn merge_keyed_sequences(
    base: &[Value],
    overlay: &[Value],
    field: &str,
    list_strategy: ListMergeStrategy,
) -> Value {
    match list_strategy {
        ListMergeStrategy::Replace => return Value::Sequence(overlay.to_vec()),
        ListMergeStrategy::NoReplace => return Value::Sequence(base.to_vec()),
        ListMergeStrategy::Append | ListMergeStrategy::Prepend => {}
    }

    let mut result = base.to_vec();
    let mut added = Vec::new();
    for item in overlay {
        let existing = entry_key(item, field).and_then(|key| {
            result
                .iter()
                .position(|entry| entry_key(entry, field).as_deref() == Some(key.as_str()))
        });
        match existing {
            Some(index) => {
                let merged = merge_yaml_values(&result[index], item, list_strategy);
                result[index] = merged;
            }
            None if !result.contains(item) && !added.contains(item) => added.push(item.clone()),
            None => {}
        }
    }

    if list_strategy == ListMergeStrategy::Prepend {
        added.extend(result);
        Value::Sequence(added)
    } else {
        result.extend(added);
        Value::Sequence(result)
    }
}

/// Merge one profile layer onto the merged layers below it
fn merge_layer(base: &Value, layer: &Value, list_strategy: ListMergeStrategy) -> Value {
    let mut merged = merge_yaml_values(base, layer, list_strategy);

    for (list, field) in KEYED_LISTS {
        if let (Some(Value::Sequence(base_seq)), Some(Value::Sequence(layer_seq))) =
            (base.get(*list), layer.get(*list))
        {
            let keyed = merge_keyed_sequences(base_seq, layer_seq, field, list_strategy);
            if let Some(map) = merged.as_mapping_mut() {
                map.insert(Value::String((*list).to_string()), keyed);
            }
        }
    }

    merged
}

/// Remove and parse the `merge_how` key of a layer
pub fn take_merge_strategy(layer: &mut Value) -> ListMergeStrategy {
    layer
        .as_mapping_mut()
        .and_then(|map| map.remove(MERGE_HOW_KEY))
        .and_then(|how| how.as_str().map(ListMergeStrategy::parse))
        .unwrap_or_default()
}

/// Merge profile layers in order (later layers have higher priority)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    let mut result = Value::Null;

    for (index, mut layer) in layers.into_iter().enumerate() {
        let strategy = take_merge_strategy(&mut layer);
        if index > 0 {
            debug!("Merging profile layer {} ({:?})", index, strategy);
        }
        result = merge_layer(&result, &layer, strategy);
    }

    result
}
