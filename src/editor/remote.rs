//! Applying externally produced patches to the internal tree.
//!
//! Patches are mapped onto node operations where their shape allows it, so
//! the selection stays anchored and untouched nodes are left alone. Anything
//! else falls back to patching the plain block and writing back the fields
//! that changed.

use super::{Editor, Node, Operation, diff_props};
use crate::model::{Block, CHILDREN, TEXT};
use crate::patch::{InsertPosition, Patch, PatchError, Path, PathSegment, apply_patch, apply_to_block, dmp};
use serde_json::Value as Json;

fn position_in(keys: impl Iterator<Item = Option<String>>, len: usize, segment: &PathSegment) -> Option<usize> {
    match segment {
        PathSegment::Key { key } => keys
            .enumerate()
            .find(|(_, candidate)| candidate.as_deref() == Some(key.as_str()))
            .map(|(index, _)| index),
        PathSegment::Index(index) => (*index < len).then_some(*index),
        PathSegment::Field(_) => None,
    }
}

fn into_block(item: &Json, path: &Path) -> Result<Block, PatchError> {
    match item {
        Json::Object(map) => Ok(Block::from_map(map.clone())),
        _ => Err(PatchError::NotAnObject(path.clone())),
    }
}

impl Editor {
    /// Applies one remote patch. Unsetting something that does not exist is
    /// a no-op.
    pub fn apply_remote(&mut self, patch: &Patch) -> Result<(), PatchError> {
        let path = patch.path();
        let Some(first) = path.first() else {
            return self.apply_remote_root(patch);
        };
        let keys = self.nodes.iter().map(|node| node.key().map(str::to_string));
        let Some(block) = position_in(keys, self.nodes.len(), first) else {
            return match patch {
                Patch::Unset { .. } => Ok(()),
                _ => Err(PatchError::PathNotFound(path.clone())),
            };
        };

        let segments = path.segments();
        if segments.len() == 1 {
            return self.apply_remote_block(block, patch);
        }
        let is_children = matches!(&segments[1], PathSegment::Field(field) if field == CHILDREN);
        if is_children && segments.len() >= 3 && matches!(self.nodes[block], Node::Text(_)) {
            return self.apply_remote_child(block, patch);
        }

        match apply_to_block(&self.nodes[block].to_block(), patch)? {
            Some(updated) => {
                let props = diff_props(self.nodes[block].to_block().fields(), updated.fields());
                self.apply(Operation::SetBlock {
                    index: block,
                    props,
                })?;
            }
            None => {
                self.apply(Operation::RemoveBlock { index: block })?;
            }
        }
        Ok(())
    }

    fn apply_remote_root(&mut self, patch: &Patch) -> Result<(), PatchError> {
        let blocks = match patch {
            Patch::Set { value, path } => match value {
                Json::Array(items) => items
                    .iter()
                    .map(|item| into_block(item, path))
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(PatchError::NotAnArray(path.clone())),
            },
            Patch::Unset { .. } => Vec::new(),
            Patch::Insert { path, .. } => return Err(PatchError::InvalidInsertTarget(path.clone())),
            Patch::DiffMatchPatch { path, .. } => return Err(PatchError::NotAString(path.clone())),
        };
        for index in (0..self.nodes.len()).rev() {
            self.apply(Operation::RemoveBlock { index })?;
        }
        for (index, block) in blocks.into_iter().enumerate() {
            self.apply(Operation::InsertBlock { index, block })?;
        }
        Ok(())
    }

    fn apply_remote_block(&mut self, block: usize, patch: &Patch) -> Result<(), PatchError> {
        match patch {
            Patch::Set { value, path } => {
                let updated = into_block(value, path)?;
                let props = diff_props(self.nodes[block].to_block().fields(), updated.fields());
                self.apply(Operation::SetBlock {
                    index: block,
                    props,
                })?;
            }
            Patch::Unset { .. } => {
                self.apply(Operation::RemoveBlock { index: block })?;
            }
            Patch::Insert {
                path,
                position,
                items,
            } => {
                let at = match position {
                    InsertPosition::Before => block,
                    InsertPosition::After => block + 1,
                };
                for (offset, item) in items.iter().enumerate() {
                    self.apply(Operation::InsertBlock {
                        index: at + offset,
                        block: into_block(item, path)?,
                    })?;
                }
            }
            Patch::DiffMatchPatch { path, .. } => return Err(PatchError::NotAString(path.clone())),
        }
        Ok(())
    }

    fn apply_remote_child(&mut self, block: usize, patch: &Patch) -> Result<(), PatchError> {
        let path = patch.path();
        let segments = path.segments();
        let children = self.nodes[block].children();
        let keys = children.iter().map(|child| child.key().map(str::to_string));
        let Some(child) = position_in(keys, children.len(), &segments[2]) else {
            return match patch {
                Patch::Unset { .. } => Ok(()),
                _ => Err(PatchError::PathNotFound(path.clone())),
            };
        };

        match (segments.len(), patch) {
            (3, Patch::Set { value, .. }) => {
                let Json::Object(old) = self.nodes[block].children()[child].to_json() else {
                    return Err(PatchError::NotAnObject(path.clone()));
                };
                let Json::Object(new) = value else {
                    return Err(PatchError::NotAnObject(path.clone()));
                };
                self.apply(Operation::SetChild {
                    block,
                    index: child,
                    props: diff_props(&old, new),
                })?;
            }
            (3, Patch::Unset { .. }) => {
                self.apply(Operation::RemoveChild { block, index: child })?;
            }
            (3, Patch::Insert {
                position, items, ..
            }) => {
                let at = match position {
                    InsertPosition::Before => child,
                    InsertPosition::After => child + 1,
                };
                for (offset, item) in items.iter().enumerate() {
                    self.apply(Operation::InsertChild {
                        block,
                        index: at + offset,
                        child: item.clone(),
                    })?;
                }
            }
            (4, Patch::DiffMatchPatch { value, .. })
                if matches!(&segments[3], PathSegment::Field(field) if field == TEXT) =>
            {
                let old = match self.nodes[block].children()[child].as_span() {
                    Some(span) => span.text.clone(),
                    None => return Err(PatchError::NotAString(path.clone())),
                };
                let text = dmp::apply_patch(&old, value)?;
                self.replace_text(block, child, &text)?;
            }
            _ => {
                let mut record = self.nodes[block].children()[child].to_json();
                let relative = patch.with_path(Path(segments[3..].to_vec()));
                apply_patch(&mut record, &relative)?;
                let (Json::Object(old), Json::Object(new)) =
                    (self.nodes[block].children()[child].to_json(), record)
                else {
                    return Err(PatchError::NotAnObject(path.clone()));
                };
                self.apply(Operation::SetChild {
                    block,
                    index: child,
                    props: diff_props(&old, &new),
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Value, span};
    use crate::patch::apply_patches;
    use crate::schema::Schema;
    use crate::selection::{Range, RangePoint};
    use serde_json::json;
    use std::rc::Rc;

    fn value() -> Value {
        vec![
            Block::text("a", vec![span("a1", "Hello world", &[])]),
            Block::object("img", "image"),
        ]
    }

    fn editor() -> Editor {
        let mut editor = Editor::new(Rc::new(Schema::default()));
        for (index, block) in value().into_iter().enumerate() {
            editor
                .apply(Operation::InsertBlock { index, block })
                .unwrap();
        }
        editor
    }

    /// Applies `patches` remotely and checks the tree matches the plain
    /// patch applier's result.
    fn check(patches: &[Patch]) -> Editor {
        let mut editor = editor();
        for patch in patches {
            editor.apply_remote(patch).unwrap();
        }
        assert_eq!(*editor.snapshot(), apply_patches(&value(), patches).unwrap());
        editor
    }

    #[test]
    fn test_block_level_patches() {
        check(&[
            Patch::insert(
                Path::block("img"),
                InsertPosition::After,
                vec![json!({"_key": "c", "_type": "image"})],
            ),
            Patch::set(Path::block("img"), json!({"_key": "img", "_type": "image", "alt": "x"})),
            Patch::unset(Path::block("c")),
            Patch::unset(Path::block("missing")),
        ]);
    }

    #[test]
    fn test_child_level_patches() {
        let editor = check(&[
            Patch::insert(
                Path::child("a", "a1"),
                InsertPosition::After,
                vec![span("a2", "!", &["strong"])],
            ),
            Patch::set(Path::child("a", "a2").join_field("marks"), json!([])),
            Patch::diff_match_patch(
                Path::child("a", "a1").join_field("text"),
                "Hello world",
                "Hello brave world",
            ),
        ]);
        assert_eq!(editor.node(0).unwrap().children().len(), 2);
    }

    #[test]
    fn test_field_patches_fall_back_to_block_diff() {
        check(&[
            Patch::set(Path::block("a").join_field("style"), json!("h2")),
            Patch::set(Path::block("a").join_field("markDefs"), json!([{"_key": "l", "_type": "link"}])),
            Patch::unset(Path::block("a").join_field("markDefs")),
        ]);
    }

    #[test]
    fn test_root_patches() {
        let editor = check(&[Patch::set(Path::root(), json!([{"_key": "x", "_type": "image"}]))]);
        assert_eq!(editor.len(), 1);
        let editor = check(&[Patch::unset(Path::root())]);
        assert!(editor.is_empty());
    }

    #[test]
    fn test_remote_text_change_keeps_caret() {
        let mut editor = editor();
        editor
            .apply(Operation::SetSelection {
                selection: Some(Range::collapsed(RangePoint::new(vec![0, 0], 8))),
            })
            .unwrap();
        editor
            .apply_remote(&Patch::diff_match_patch(
                Path::child("a", "a1").join_field("text"),
                "Hello world",
                "Hi, Hello world",
            ))
            .unwrap();
        assert_eq!(editor.selection().unwrap().anchor.offset, 12);
    }

    #[test]
    fn test_missing_targets_fail() {
        let mut editor = editor();
        assert!(matches!(
            editor.apply_remote(&Patch::set(Path::block("nope").join_field("style"), json!("h1"))),
            Err(PatchError::PathNotFound(_))
        ));
        assert!(matches!(
            editor.apply_remote(&Patch::diff_match_patch(
                Path::child("a", "a1").join_field("text"),
                "unrelated text",
                "changed text",
            )),
            Err(PatchError::DiffMismatch)
        ));
    }
}
