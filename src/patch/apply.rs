//! Applying patches to plain values.

use super::{InsertPosition, Patch, PatchError, Path, PathSegment, dmp};
use crate::model::{Block, Value, json_key, value_to_json};
use serde_json::Value as Json;

fn member_index(array: &[Json], segment: &PathSegment) -> Option<usize> {
    match segment {
        PathSegment::Key { key } => array
            .iter()
            .position(|member| json_key(member) == Some(key.as_str())),
        PathSegment::Index(index) => (*index < array.len()).then_some(*index),
        PathSegment::Field(_) => None,
    }
}

fn step<'a>(node: &'a mut Json, segment: &PathSegment, path: &Path) -> Result<&'a mut Json, PatchError> {
    match segment {
        PathSegment::Field(name) => node
            .as_object_mut()
            .ok_or_else(|| PatchError::NotAnObject(path.clone()))?
            .get_mut(name)
            .ok_or_else(|| PatchError::PathNotFound(path.clone())),
        _ => {
            let array = node
                .as_array_mut()
                .ok_or_else(|| PatchError::NotAnArray(path.clone()))?;
            let index =
                member_index(array, segment).ok_or_else(|| PatchError::PathNotFound(path.clone()))?;
            Ok(&mut array[index])
        }
    }
}

fn navigate<'a>(root: &'a mut Json, segments: &[PathSegment], path: &Path) -> Result<&'a mut Json, PatchError> {
    let mut node = root;
    for segment in segments {
        node = step(node, segment, path)?;
    }
    Ok(node)
}

/// Applies one patch to a JSON tree in place.
///
/// Unsetting a path that does not exist is a no-op; every other patch
/// requires its target (or the target's parent, for `set`) to exist.
pub fn apply_patch(root: &mut Json, patch: &Patch) -> Result<(), PatchError> {
    let path = patch.path();
    let Some((last, parents)) = path.segments().split_last() else {
        return apply_at_root(root, patch);
    };

    if let Patch::Unset { .. } = patch {
        let Ok(parent) = navigate(root, parents, path) else {
            return Ok(());
        };
        match (last, parent) {
            (PathSegment::Field(name), Json::Object(map)) => {
                map.remove(name);
            }
            (segment, Json::Array(array)) => {
                if let Some(index) = member_index(array, segment) {
                    array.remove(index);
                }
            }
            _ => {}
        }
        return Ok(());
    }

    let parent = navigate(root, parents, path)?;
    match patch {
        Patch::Set { value, .. } => match last {
            PathSegment::Field(name) => {
                parent
                    .as_object_mut()
                    .ok_or_else(|| PatchError::NotAnObject(path.clone()))?
                    .insert(name.clone(), value.clone());
                Ok(())
            }
            segment => {
                let target = step(parent, segment, path)?;
                *target = value.clone();
                Ok(())
            }
        },
        Patch::Insert {
            position, items, ..
        } => {
            let array = parent
                .as_array_mut()
                .ok_or_else(|| PatchError::InvalidInsertTarget(path.clone()))?;
            if let PathSegment::Field(_) = last {
                return Err(PatchError::InvalidInsertTarget(path.clone()));
            }
            let index =
                member_index(array, last).ok_or_else(|| PatchError::PathNotFound(path.clone()))?;
            let at = match position {
                InsertPosition::Before => index,
                InsertPosition::After => index + 1,
            };
            array.splice(at..at, items.iter().cloned());
            Ok(())
        }
        Patch::DiffMatchPatch { value, .. } => {
            let target = step(parent, last, path)?;
            let text = target
                .as_str()
                .ok_or_else(|| PatchError::NotAString(path.clone()))?;
            *target = Json::String(dmp::apply_patch(text, value)?);
            Ok(())
        }
        Patch::Unset { .. } => Ok(()),
    }
}

fn apply_at_root(root: &mut Json, patch: &Patch) -> Result<(), PatchError> {
    match patch {
        Patch::Set { value, .. } => {
            *root = value.clone();
            Ok(())
        }
        Patch::Unset { .. } => {
            *root = Json::Null;
            Ok(())
        }
        Patch::Insert { path, .. } => Err(PatchError::InvalidInsertTarget(path.clone())),
        Patch::DiffMatchPatch { path, .. } => Err(PatchError::NotAString(path.clone())),
    }
}

/// Applies patches in order to a copy of `value`. Unsetting the root yields
/// an empty value.
pub fn apply_patches(value: &[Block], patches: &[Patch]) -> Result<Value, PatchError> {
    let mut root = value_to_json(value);
    for patch in patches {
        apply_patch(&mut root, patch)?;
    }
    match root {
        Json::Null => Ok(Vec::new()),
        root => serde_json::from_value(root).map_err(|err| PatchError::InvalidDocument(err.to_string())),
    }
}

/// Applies a document-level patch addressed at `block` to that block alone.
///
/// The first path segment is taken to address the block itself. Returns
/// `None` when the patch removes the block.
pub fn apply_to_block(block: &Block, patch: &Patch) -> Result<Option<Block>, PatchError> {
    let relative = patch.with_path(patch.path().tail());
    let mut root = Json::Object(block.fields().clone());
    apply_patch(&mut root, &relative)?;
    match root {
        Json::Null => Ok(None),
        Json::Object(map) => Ok(Some(Block::from_map(map))),
        _ => Err(PatchError::NotAnObject(patch.path().clone())),
    }
}
