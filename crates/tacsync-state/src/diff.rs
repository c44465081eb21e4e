//! State diffing algorithm for efficient synchronization
//!
//! Snapshots are lowered to `serde_json::Value` trees and compared
//! structurally, so map-key ordering never produces spurious patches. Arrays
//! registered as keyed collections are matched by an identity field instead
//! of by position.

use crate::StateError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Root key of the presentation-only sub-tree
pub const UI_ROOT: &str = "ui";

/// One step of a patch path
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Key(k) => write!(f, "{k}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

/// A single structural change
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Patch {
    pub path: Vec<PathSegment>,
    pub op: PatchOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    pub fn add(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            path,
            op: PatchOp::Add,
            value: Some(value),
        }
    }

    pub fn remove(path: Vec<PathSegment>) -> Self {
        Self {
            path,
            op: PatchOp::Remove,
            value: None,
        }
    }

    pub fn replace(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            path,
            op: PatchOp::Replace,
            value: Some(value),
        }
    }

    /// Whether the first path segment is the given key
    pub fn is_rooted_at(&self, key: &str) -> bool {
        matches!(self.path.first(), Some(PathSegment::Key(k)) if k == key)
    }

    fn path_string(&self) -> String {
        let parts: Vec<String> = self.path.iter().map(ToString::to_string).collect();
        format!("/{}", parts.join("/"))
    }
}

/// Ordered patch list plus the sequence number it was produced under
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Diff {
    #[serde(default)]
    pub version: u64,
    pub patches: Vec<Patch>,
}

impl Diff {
    pub fn new(patches: Vec<Patch>) -> Self {
        Self {
            version: 0,
            patches,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Drop every patch that touches the presentation sub-tree
    pub fn without_ui(mut self) -> Self {
        self.patches = filter_ui_patches(self.patches);
        self
    }
}

/// Remove patches rooted at the `ui` sub-tree
pub fn filter_ui_patches(patches: Vec<Patch>) -> Vec<Patch> {
    patches
        .into_iter()
        .filter(|p| !p.is_rooted_at(UI_ROOT))
        .collect()
}

/// Structural diff/patch engine
#[derive(Debug, Clone)]
pub struct DiffEngine {
    /// Array key name -> identity field of its elements
    keyed: BTreeMap<String, String>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
            .keyed("characters", "name")
            .keyed("projectiles", "id")
            .keyed("popups", "id")
    }
}

impl DiffEngine {
    /// Engine with no keyed collections
    pub fn new() -> Self {
        Self {
            keyed: BTreeMap::new(),
        }
    }

    /// Match elements of arrays stored under `collection` by `field`
    pub fn keyed(mut self, collection: &str, field: &str) -> Self {
        self.keyed.insert(collection.to_string(), field.to_string());
        self
    }

    /// Generate a diff that turns `base` into `target`
    pub fn compute<T: Serialize>(&self, base: &T, target: &T) -> Result<Diff, StateError> {
        let base = to_value(base)?;
        let target = to_value(target)?;
        Ok(Diff::new(self.compute_values(&base, &target)))
    }

    pub fn compute_values(&self, base: &Value, target: &Value) -> Vec<Patch> {
        let mut patches = Vec::new();
        let mut path = Vec::new();
        self.diff_value(&mut path, base, target, &mut patches);
        patches
    }

    /// Apply a diff to a snapshot, producing a new snapshot
    ///
    /// The base is never touched; on error nothing is applied.
    pub fn apply<T: Serialize + DeserializeOwned>(
        &self,
        base: &T,
        diff: &Diff,
    ) -> Result<T, StateError> {
        let value = self.apply_values(&to_value(base)?, diff)?;
        serde_json::from_value(value).map_err(|e| StateError::MalformedDiff {
            index: diff.patches.len(),
            reason: format!("patched state does not decode: {e}"),
        })
    }

    pub fn apply_values(&self, base: &Value, diff: &Diff) -> Result<Value, StateError> {
        let mut working = base.clone();
        for (index, patch) in diff.patches.iter().enumerate() {
            apply_patch(&mut working, patch).map_err(|reason| StateError::MalformedDiff {
                index,
                reason: format!("{} {}: {}", op_name(patch.op), patch.path_string(), reason),
            })?;
        }
        Ok(working)
    }

    fn diff_value(
        &self,
        path: &mut Vec<PathSegment>,
        base: &Value,
        target: &Value,
        out: &mut Vec<Patch>,
    ) {
        if base == target {
            return;
        }

        match (base, target) {
            (Value::Object(b), Value::Object(t)) if !(is_flat(b) && is_flat(t)) => {
                self.diff_object(path, b, t, out)
            }
            (Value::Array(b), Value::Array(t)) => match self.identity_field(path) {
                Some(field) if self.is_keyable(b, field) && self.is_keyable(t, field) => {
                    self.diff_keyed(path, field, b, t, out)
                }
                _ => self.diff_indexed(path, b, t, out),
            },
            _ => out.push(Patch::replace(path.clone(), target.clone())),
        }
    }

    fn diff_object(
        &self,
        path: &mut Vec<PathSegment>,
        base: &Map<String, Value>,
        target: &Map<String, Value>,
        out: &mut Vec<Patch>,
    ) {
        let mut removed: Vec<&String> = base.keys().filter(|k| !target.contains_key(*k)).collect();
        removed.sort();
        for key in removed {
            path.push(PathSegment::Key(key.clone()));
            out.push(Patch::remove(path.clone()));
            path.pop();
        }

        let mut keys: Vec<&String> = target.keys().collect();
        keys.sort();
        for key in keys {
            path.push(PathSegment::Key(key.clone()));
            match (base.get(key), &target[key]) {
                (None, value) => out.push(Patch::add(path.clone(), value.clone())),
                (Some(old), new) => self.diff_value(path, old, new, out),
            }
            path.pop();
        }
    }

    fn diff_indexed(
        &self,
        path: &mut Vec<PathSegment>,
        base: &[Value],
        target: &[Value],
        out: &mut Vec<Patch>,
    ) {
        let common = base.len().min(target.len());
        for i in 0..common {
            path.push(PathSegment::Index(i));
            self.diff_value(path, &base[i], &target[i], out);
            path.pop();
        }

        if target.len() > base.len() {
            for (i, value) in target.iter().enumerate().skip(common) {
                path.push(PathSegment::Index(i));
                out.push(Patch::add(path.clone(), value.clone()));
                path.pop();
            }
        } else {
            for i in (common..base.len()).rev() {
                path.push(PathSegment::Index(i));
                out.push(Patch::remove(path.clone()));
                path.pop();
            }
        }
    }

    fn diff_keyed(
        &self,
        path: &mut Vec<PathSegment>,
        field: &str,
        base: &[Value],
        target: &[Value],
        out: &mut Vec<Patch>,
    ) {
        let base_ids: Vec<&str> = base.iter().filter_map(|v| identity(v, field)).collect();
        let target_ids: Vec<&str> = target.iter().filter_map(|v| identity(v, field)).collect();
        let base_index: HashMap<&str, usize> =
            base_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let target_set: HashSet<&str> = target_ids.iter().copied().collect();

        // Survivors must keep their relative order, otherwise ship the whole array
        let survivors_base: Vec<&str> = base_ids
            .iter()
            .copied()
            .filter(|id| target_set.contains(id))
            .collect();
        let survivors_target: Vec<&str> = target_ids
            .iter()
            .copied()
            .filter(|id| base_index.contains_key(id))
            .collect();
        if survivors_base != survivors_target {
            out.push(Patch::replace(path.clone(), Value::Array(target.to_vec())));
            return;
        }

        for (i, id) in base_ids.iter().enumerate().rev() {
            if !target_set.contains(id) {
                path.push(PathSegment::Index(i));
                out.push(Patch::remove(path.clone()));
                path.pop();
            }
        }

        for (i, id) in target_ids.iter().enumerate() {
            if !base_index.contains_key(id) {
                path.push(PathSegment::Index(i));
                out.push(Patch::add(path.clone(), target[i].clone()));
                path.pop();
            }
        }

        for (i, id) in target_ids.iter().enumerate() {
            if let Some(&old) = base_index.get(id) {
                path.push(PathSegment::Index(i));
                self.diff_value(path, &base[old], &target[i], out);
                path.pop();
            }
        }
    }

    fn identity_field(&self, path: &[PathSegment]) -> Option<&str> {
        match path.last() {
            Some(PathSegment::Key(key)) => self.keyed.get(key).map(String::as_str),
            _ => None,
        }
    }

    /// Every element carries a unique string identity
    fn is_keyable(&self, items: &[Value], field: &str) -> bool {
        let mut seen = HashSet::new();
        items
            .iter()
            .all(|v| identity(v, field).map(|id| seen.insert(id)).unwrap_or(false))
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, StateError> {
    serde_json::to_value(value).map_err(|e| StateError::SerializationError(e.to_string()))
}

fn identity<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

/// A record whose fields are all scalars is replaced as a unit
fn is_flat(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map
            .values()
            .all(|v| !matches!(v, Value::Object(_) | Value::Array(_)))
}

fn op_name(op: PatchOp) -> &'static str {
    match op {
        PatchOp::Add => "add",
        PatchOp::Remove => "remove",
        PatchOp::Replace => "replace",
    }
}

fn navigate_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key)?,
            (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

fn apply_patch(root: &mut Value, patch: &Patch) -> Result<(), String> {
    let value = match patch.op {
        PatchOp::Remove => None,
        PatchOp::Add | PatchOp::Replace => Some(
            patch
                .value
                .clone()
                .ok_or_else(|| "missing value".to_string())?,
        ),
    };

    let Some((last, parent_path)) = patch.path.split_last() else {
        return match value {
            Some(value) => {
                *root = value;
                Ok(())
            }
            None => Err("cannot remove the root".to_string()),
        };
    };

    let parent = navigate_mut(root, parent_path).ok_or_else(|| "parent missing".to_string())?;

    match (parent, last) {
        (Value::Object(map), PathSegment::Key(key)) => match (patch.op, value) {
            (PatchOp::Add, Some(value)) => {
                map.insert(key.clone(), value);
                Ok(())
            }
            (PatchOp::Replace, Some(value)) => match map.get_mut(key) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(format!("key {key:?} missing")),
            },
            (PatchOp::Remove, _) => map
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| format!("key {key:?} missing")),
            _ => Err("missing value".to_string()),
        },
        (Value::Array(items), PathSegment::Index(i)) => {
            let i = *i;
            match (patch.op, value) {
                (PatchOp::Add, Some(value)) if i <= items.len() => {
                    items.insert(i, value);
                    Ok(())
                }
                (PatchOp::Replace, Some(value)) if i < items.len() => {
                    items[i] = value;
                    Ok(())
                }
                (PatchOp::Remove, _) if i < items.len() => {
                    items.remove(i);
                    Ok(())
                }
                _ => Err(format!("index {i} out of range (len {})", items.len())),
            }
        }
        _ => Err("path segment does not match container type".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_values_produce_no_patches() {
        let engine = DiffEngine::default();
        let value = json!({"a": 1, "b": [1, 2, {"c": true}]});
        assert!(engine.compute_values(&value, &value.clone()).is_empty());
    }

    #[test]
    fn test_flat_record_replaced_as_unit() {
        let engine = DiffEngine::default();
        let base = json!({"position": {"x": 20, "y": 25}});
        let target = json!({"position": {"x": 21, "y": 25}});

        let patches = engine.compute_values(&base, &target);
        assert_eq!(
            patches,
            vec![Patch::replace(
                vec!["position".into()],
                json!({"x": 21, "y": 25})
            )]
        );
    }

    #[test]
    fn test_keyed_reorder_is_single_replace() {
        let engine = DiffEngine::default();
        let base = json!({"characters": [{"name": "a"}, {"name": "b"}]});
        let target = json!({"characters": [{"name": "b"}, {"name": "a"}]});

        let patches = engine.compute_values(&base, &target);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, PatchOp::Replace);
        assert!(!patches.iter().any(|p| p.op == PatchOp::Remove));
    }

    #[test]
    fn test_keyed_removal_matches_identity() {
        let engine = DiffEngine::default();
        let base = json!({"characters": [
            {"name": "a", "hp": 1},
            {"name": "b", "hp": 2},
            {"name": "c", "hp": 3}
        ]});
        let target = json!({"characters": [
            {"name": "a", "hp": 1},
            {"name": "c", "hp": 9}
        ]});

        let patches = engine.compute_values(&base, &target);
        assert_eq!(patches[0], Patch::remove(vec!["characters".into(), 1.into()]));
        assert_eq!(
            patches[1],
            Patch::replace(vec!["characters".into(), 1.into()], json!({"name": "c", "hp": 9}))
        );

        let applied = engine.apply_values(&base, &Diff::new(patches)).unwrap();
        assert_eq!(applied, target);
    }

    #[test]
    fn test_indexed_shrink_removes_from_the_end() {
        let engine = DiffEngine::new();
        let base = json!([1, 2, 3, 4]);
        let target = json!([1, 2]);

        let patches = engine.compute_values(&base, &target);
        assert_eq!(
            patches,
            vec![Patch::remove(vec![3.into()]), Patch::remove(vec![2.into()])]
        );
    }

    #[test]
    fn test_missing_parent_is_malformed() {
        let engine = DiffEngine::new();
        let base = json!({"a": {}});
        let diff = Diff::new(vec![Patch::add(
            vec!["missing".into(), "child".into()],
            json!(1),
        )]);

        let err = engine.apply_values(&base, &diff).unwrap_err();
        assert!(matches!(err, StateError::MalformedDiff { index: 0, .. }));
    }

    #[test]
    fn test_failed_apply_leaves_nothing_half_done() {
        let engine = DiffEngine::new();
        let base = json!({"a": 1});
        let diff = Diff::new(vec![
            Patch::replace(vec!["a".into()], json!(2)),
            Patch::remove(vec!["nope".into()]),
        ]);

        assert!(engine.apply_values(&base, &diff).is_err());
        assert_eq!(base, json!({"a": 1}));
    }

    #[test]
    fn test_filter_ui_patches() {
        let patches = vec![
            Patch::replace(vec!["ui".into(), "highlights".into()], json!([])),
            Patch::replace(vec!["game".into(), "turn".into()], json!("p2")),
        ];

        let kept = filter_ui_patches(patches);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].is_rooted_at("game"));
    }

    #[test]
    fn test_patch_wire_format() {
        let patch = Patch::replace(
            vec!["characters".into(), 0.into(), "position".into()],
            json!({"x": 21, "y": 25}),
        );
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({"path": ["characters", 0, "position"], "op": "replace", "value": {"x": 21, "y": 25}})
        );

        let decoded: Patch = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, patch);
    }
}
