//! Operations on the internal tree and the patches they produce.
//!
//! Patches are computed against the tree as it was before the operation,
//! so applying them in order to the previous snapshot with
//! [`crate::patch::apply_patches`] yields the next snapshot.

use super::{Editor, Inline, Node};
use crate::model::{Block, CHILDREN, KEY, TEXT};
use crate::patch::{InsertPosition, Patch, PatchError, Path};
use crate::selection::Range;
use dissimilar::Chunk;
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    InsertBlock {
        index: usize,
        block: Block,
    },
    RemoveBlock {
        index: usize,
    },
    /// Sets block fields; a `Null` value removes the field.
    SetBlock {
        index: usize,
        props: Map<String, Json>,
    },
    InsertChild {
        block: usize,
        index: usize,
        child: Json,
    },
    RemoveChild {
        block: usize,
        index: usize,
    },
    /// Sets child fields; a `Null` value removes the field.
    SetChild {
        block: usize,
        index: usize,
        props: Map<String, Json>,
    },
    InsertText {
        block: usize,
        child: usize,
        offset: usize,
        text: String,
    },
    RemoveText {
        block: usize,
        child: usize,
        offset: usize,
        length: usize,
    },
    /// Splits a span at `offset`; the second half becomes a new span with
    /// the same marks under `key`.
    SplitChild {
        block: usize,
        child: usize,
        offset: usize,
        key: String,
    },
    /// Appends the text of span `child` to the span before it and removes it.
    MergeChild {
        block: usize,
        child: usize,
    },
    SetSelection {
        selection: Option<Range>,
    },
}

impl Operation {
    pub fn is_structural(&self) -> bool {
        !matches!(self, Operation::SetSelection { .. })
    }
}

/// Field changes turning `old` into `new`. Removed fields map to `Null`.
pub fn diff_props(old: &Map<String, Json>, new: &Map<String, Json>) -> Map<String, Json> {
    let mut props = Map::new();
    for (field, value) in new {
        if old.get(field) != Some(value) {
            props.insert(field.clone(), value.clone());
        }
    }
    for field in old.keys() {
        if !new.contains_key(field) {
            props.insert(field.clone(), Json::Null);
        }
    }
    props
}

/// Applies `props` to `record`, returning the patches relative to `path`.
/// The `_key` field goes last so earlier patches still address the record by
/// its old key.
fn set_fields(record: &mut Map<String, Json>, props: &Map<String, Json>, path: &Path) -> Vec<Patch> {
    let mut patches = Vec::new();
    let ordered = props
        .iter()
        .filter(|(field, _)| field.as_str() != KEY)
        .chain(props.get_key_value(KEY));
    for (field, value) in ordered {
        if value.is_null() {
            if record.remove(field).is_some() {
                patches.push(Patch::unset(path.clone().join_field(field)));
            }
        } else if record.get(field) != Some(value) {
            record.insert(field.clone(), value.clone());
            patches.push(Patch::set(path.clone().join_field(field), value.clone()));
        }
    }
    patches
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

impl Editor {
    /// Applies one operation and returns the patches describing it.
    pub fn apply(&mut self, op: Operation) -> Result<Vec<Patch>, PatchError> {
        let patches = match &op {
            Operation::InsertBlock { index, block } => self.insert_block(*index, block)?,
            Operation::RemoveBlock { index } => self.remove_block(*index)?,
            Operation::SetBlock { index, props } => self.set_block(*index, props)?,
            Operation::InsertChild {
                block,
                index,
                child,
            } => self.insert_child(*block, *index, child)?,
            Operation::RemoveChild { block, index } => self.remove_child(*block, *index)?,
            Operation::SetChild {
                block,
                index,
                props,
            } => self.set_child(*block, *index, props)?,
            Operation::InsertText {
                block,
                child,
                offset,
                text,
            } => self.insert_text(*block, *child, *offset, text)?,
            Operation::RemoveText {
                block,
                child,
                offset,
                length,
            } => self.remove_text(*block, *child, *offset, *length)?,
            Operation::SplitChild {
                block,
                child,
                offset,
                key,
            } => self.split_child(*block, *child, *offset, key)?,
            Operation::MergeChild { block, child } => self.merge_child(*block, *child)?,
            Operation::SetSelection { selection } => {
                self.selection = selection.clone();
                Vec::new()
            }
        };
        if op.is_structural() {
            self.version += 1;
        }
        self.log.push(op);
        Ok(patches)
    }

    /// Rewrites the text of a span through the smallest insert and remove
    /// operations, so that carets around unchanged text stay put.
    pub fn replace_text(&mut self, block: usize, child: usize, text: &str) -> Result<Vec<Patch>, PatchError> {
        let old = self.span_mut(block, child)?.text.clone();
        let mut patches = Vec::new();
        let mut offset = 0;
        for chunk in dissimilar::diff(&old, text) {
            match chunk {
                Chunk::Equal(equal) => offset += equal.chars().count(),
                Chunk::Delete(deleted) => {
                    patches.extend(self.apply(Operation::RemoveText {
                        block,
                        child,
                        offset,
                        length: deleted.chars().count(),
                    })?);
                }
                Chunk::Insert(inserted) => {
                    patches.extend(self.apply(Operation::InsertText {
                        block,
                        child,
                        offset,
                        text: inserted.to_string(),
                    })?);
                    offset += inserted.chars().count();
                }
            }
        }
        Ok(patches)
    }

    fn insert_block(&mut self, index: usize, block: &Block) -> Result<Vec<Patch>, PatchError> {
        if index > self.nodes.len() {
            return Err(PatchError::PathNotFound(Path::block_at(index)));
        }
        let item = block.clone().into_json();
        let patch = if index > 0 {
            Patch::insert(self.block_path(index - 1), InsertPosition::After, vec![item])
        } else if !self.nodes.is_empty() {
            Patch::insert(self.block_path(0), InsertPosition::Before, vec![item])
        } else {
            Patch::set(Path::root(), Json::Array(vec![item]))
        };

        let node = Node::from_block(block, &self.schema);
        self.nodes.insert(index, node);
        self.transform_points(|point| {
            let mut point = point.clone();
            if point.block() >= index {
                point.path[0] += 1;
            }
            Some(point)
        });
        self.refresh_known(index);
        Ok(vec![patch])
    }

    fn remove_block(&mut self, index: usize) -> Result<Vec<Patch>, PatchError> {
        let path = self.block_path_checked(index)?;
        let node = self.nodes.remove(index);
        if let Some(key) = node.key() {
            self.forget(key);
        }
        self.transform_points(|point| match point.block().cmp(&index) {
            Ordering::Less => Some(point.clone()),
            Ordering::Equal => None,
            Ordering::Greater => {
                let mut point = point.clone();
                point.path[0] -= 1;
                Some(point)
            }
        });
        Ok(vec![Patch::unset(path)])
    }

    fn set_block(&mut self, index: usize, props: &Map<String, Json>) -> Result<Vec<Patch>, PatchError> {
        let path = self.block_path_checked(index)?;
        let mut block = self.nodes[index].to_block();
        let patches = set_fields(&mut block.0, props, &path);
        if patches.is_empty() {
            return Ok(patches);
        }

        let old_key = self.nodes[index].key().map(str::to_string);
        self.nodes[index] = Node::from_block(&block, &self.schema);
        if let Some(old_key) = old_key {
            self.forget(&old_key);
        }
        self.refresh_known(index);
        self.clamp_selection();
        Ok(patches)
    }

    fn insert_child(&mut self, block: usize, index: usize, child: &Json) -> Result<Vec<Patch>, PatchError> {
        let children_path = self.block_path_checked(block)?.join_field(CHILDREN);
        let len = self.text_node_mut(block)?.children.len();
        if index > len {
            return Err(PatchError::PathNotFound(children_path.join_index(index)));
        }
        let patch = if index > 0 {
            Patch::insert(
                self.child_path(block, index - 1),
                InsertPosition::After,
                vec![child.clone()],
            )
        } else if len > 0 {
            Patch::insert(
                self.child_path(block, 0),
                InsertPosition::Before,
                vec![child.clone()],
            )
        } else {
            Patch::set(children_path, Json::Array(vec![child.clone()]))
        };

        let schema = Rc::clone(&self.schema);
        self.text_node_mut(block)?
            .children
            .insert(index, Inline::from_json(child, &schema));
        self.transform_points(|point| {
            let mut point = point.clone();
            match point.child() {
                Some(at) if point.block() == block && at >= index => point.path[1] += 1,
                None if point.block() == block => point.path.push(0),
                _ => {}
            }
            Some(point)
        });
        self.refresh_known(block);
        Ok(vec![patch])
    }

    fn remove_child(&mut self, block: usize, index: usize) -> Result<Vec<Patch>, PatchError> {
        let path = self.child_path_checked(block, index)?;
        self.text_node_mut(block)?.children.remove(index);
        self.transform_points(|point| match point.child() {
            Some(at) if point.block() == block => match at.cmp(&index) {
                Ordering::Less => Some(point.clone()),
                Ordering::Equal => None,
                Ordering::Greater => {
                    let mut point = point.clone();
                    point.path[1] -= 1;
                    Some(point)
                }
            },
            _ => Some(point.clone()),
        });
        self.clamp_selection();
        self.refresh_known(block);
        Ok(vec![Patch::unset(path)])
    }

    fn set_child(&mut self, block: usize, index: usize, props: &Map<String, Json>) -> Result<Vec<Patch>, PatchError> {
        let path = self.child_path_checked(block, index)?;
        let Json::Object(mut record) = self.nodes[block].children()[index].to_json() else {
            return Err(PatchError::NotAnObject(path));
        };
        let patches = set_fields(&mut record, props, &path);
        if patches.is_empty() {
            return Ok(patches);
        }

        let schema = Rc::clone(&self.schema);
        self.text_node_mut(block)?.children[index] = Inline::from_json(&Json::Object(record), &schema);
        self.clamp_selection();
        self.refresh_known(block);
        Ok(patches)
    }

    fn insert_text(&mut self, block: usize, child: usize, offset: usize, text: &str) -> Result<Vec<Patch>, PatchError> {
        let path = self.child_path_checked(block, child)?.join_field(TEXT);
        let span = self.span_mut(block, child)?;
        let old = span.text.clone();
        let offset = offset.min(old.chars().count());
        span.text.insert_str(byte_offset(&old, offset), text);
        let patch = Patch::diff_match_patch(path, &old, &span.text);

        let inserted = text.chars().count();
        self.transform_points(|point| {
            let mut point = point.clone();
            if point.block() == block && point.child() == Some(child) && point.offset >= offset {
                point.offset += inserted;
            }
            Some(point)
        });
        self.refresh_known(block);
        Ok(vec![patch])
    }

    fn remove_text(&mut self, block: usize, child: usize, offset: usize, length: usize) -> Result<Vec<Patch>, PatchError> {
        let path = self.child_path_checked(block, child)?.join_field(TEXT);
        let span = self.span_mut(block, child)?;
        let old = span.text.clone();
        let len = old.chars().count();
        let start = offset.min(len);
        let end = offset.saturating_add(length).min(len);
        if start == end {
            return Ok(Vec::new());
        }
        span.text
            .replace_range(byte_offset(&old, start)..byte_offset(&old, end), "");
        let patch = Patch::diff_match_patch(path, &old, &span.text);

        self.transform_points(|point| {
            let mut point = point.clone();
            if point.block() == block && point.child() == Some(child) && point.offset > start {
                point.offset = if point.offset <= end {
                    start
                } else {
                    point.offset - (end - start)
                };
            }
            Some(point)
        });
        self.refresh_known(block);
        Ok(vec![patch])
    }

    fn split_child(&mut self, block: usize, child: usize, offset: usize, key: &str) -> Result<Vec<Patch>, PatchError> {
        let path = self.child_path_checked(block, child)?;
        let span = self.span_mut(block, child)?;
        let old = span.text.clone();
        let at = offset.min(old.chars().count());
        let (left, right) = old.split_at(byte_offset(&old, at));

        let mut second = span.clone();
        second.key = key.to_string();
        second.text = right.to_string();
        span.text = left.to_string();
        let second = Inline::Span(second);
        let patches = vec![
            Patch::diff_match_patch(path.clone().join_field(TEXT), &old, left),
            Patch::insert(path, InsertPosition::After, vec![second.to_json()]),
        ];
        self.text_node_mut(block)?.children.insert(child + 1, second);

        self.transform_points(|point| {
            let mut point = point.clone();
            match point.child() {
                Some(index) if point.block() == block && index == child && point.offset > at => {
                    point.path[1] += 1;
                    point.offset -= at;
                }
                Some(index) if point.block() == block && index > child => point.path[1] += 1,
                _ => {}
            }
            Some(point)
        });
        self.refresh_known(block);
        Ok(patches)
    }

    fn merge_child(&mut self, block: usize, child: usize) -> Result<Vec<Patch>, PatchError> {
        let path = self.child_path_checked(block, child)?;
        if child == 0 {
            return Err(PatchError::NotAString(path));
        }
        let left_path = self.child_path(block, child - 1).join_field(TEXT);
        let right = self.span_mut(block, child)?.text.clone();
        let left = self.span_mut(block, child - 1)?;
        let old = left.text.clone();
        left.text.push_str(&right);
        let patches = vec![
            Patch::diff_match_patch(left_path, &old, &left.text),
            Patch::unset(path),
        ];
        self.text_node_mut(block)?.children.remove(child);

        let shift = old.chars().count();
        self.transform_points(|point| {
            let mut point = point.clone();
            match point.child() {
                Some(index) if point.block() == block && index == child => {
                    point.path[1] -= 1;
                    point.offset += shift;
                }
                Some(index) if point.block() == block && index > child => point.path[1] -= 1,
                _ => {}
            }
            Some(point)
        });
        self.refresh_known(block);
        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{inline_object, span};
    use crate::patch::apply_patches;
    use crate::schema::Schema;
    use crate::selection::RangePoint;
    use serde_json::json;

    fn editor() -> Editor {
        let mut editor = Editor::new(Rc::new(Schema::default()));
        editor
            .apply(Operation::InsertBlock {
                index: 0,
                block: Block::text("a", vec![span("a1", "Hello", &[]), span("a2", " world", &["em"])]),
            })
            .unwrap();
        editor
            .apply(Operation::InsertBlock {
                index: 1,
                block: Block::object("img", "image"),
            })
            .unwrap();
        editor
    }

    fn props(value: Json) -> Map<String, Json> {
        value.as_object().cloned().unwrap()
    }

    /// Applies `op` and checks the produced patches reproduce the new
    /// snapshot from the old one.
    fn check(editor: &mut Editor, op: Operation) -> Vec<Patch> {
        let before = editor.snapshot();
        let patches = editor.apply(op).unwrap();
        let replayed = apply_patches(&before, &patches).unwrap();
        assert_eq!(replayed, *editor.snapshot());
        patches
    }

    #[test]
    fn test_block_operations_replay() {
        let mut editor = editor();
        check(
            &mut editor,
            Operation::InsertBlock {
                index: 0,
                block: Block::text("z", vec![span("z1", "first", &[])]),
            },
        );
        check(
            &mut editor,
            Operation::SetBlock {
                index: 1,
                props: props(json!({"style": "h1", "listItem": "bullet"})),
            },
        );
        check(
            &mut editor,
            Operation::SetBlock {
                index: 1,
                props: props(json!({"listItem": null, "_key": "renamed"})),
            },
        );
        check(&mut editor, Operation::RemoveBlock { index: 2 });
        assert_eq!(editor.position("renamed"), Some(1));
        assert_eq!(editor.known_block("a"), None);
        assert!(editor.known_block("renamed").is_some());
    }

    #[test]
    fn test_first_block_into_empty_tree_sets_root() {
        let mut editor = Editor::new(Rc::new(Schema::default()));
        let patches = check(
            &mut editor,
            Operation::InsertBlock {
                index: 0,
                block: Block::object("img", "image"),
            },
        );
        assert_eq!(patches[0].path(), &Path::root());
    }

    #[test]
    fn test_child_operations_replay() {
        let mut editor = editor();
        check(
            &mut editor,
            Operation::InsertChild {
                block: 0,
                index: 0,
                child: inline_object("t", "stock-ticker"),
            },
        );
        check(
            &mut editor,
            Operation::SetChild {
                block: 0,
                index: 2,
                props: props(json!({"marks": ["strong"]})),
            },
        );
        check(&mut editor, Operation::RemoveChild { block: 0, index: 0 });
        check(
            &mut editor,
            Operation::InsertText {
                block: 0,
                child: 0,
                offset: 5,
                text: ", dear".to_string(),
            },
        );
        check(
            &mut editor,
            Operation::RemoveText {
                block: 0,
                child: 0,
                offset: 0,
                length: 7,
            },
        );
        let text = editor.node(0).unwrap().children()[0].as_span().unwrap().text.clone();
        assert_eq!(text, "dear");
    }

    #[test]
    fn test_split_and_merge_replay() {
        let mut editor = editor();
        check(
            &mut editor,
            Operation::SplitChild {
                block: 0,
                child: 1,
                offset: 3,
                key: "a3".to_string(),
            },
        );
        let children = editor.node(0).unwrap().children().to_vec();
        assert_eq!(children[1].as_span().unwrap().text, " wo");
        assert_eq!(children[2].as_span().unwrap().text, "rld");
        assert_eq!(children[2].as_span().unwrap().marks, Some(vec!["em".to_string()]));

        check(&mut editor, Operation::MergeChild { block: 0, child: 2 });
        assert_eq!(editor.node(0).unwrap().children().len(), 2);
    }

    #[test]
    fn test_text_edits_move_the_caret() {
        let mut editor = editor();
        let caret = Range::collapsed(RangePoint::new(vec![0, 0], 3));
        editor
            .apply(Operation::SetSelection {
                selection: Some(caret),
            })
            .unwrap();
        editor
            .apply(Operation::InsertText {
                block: 0,
                child: 0,
                offset: 1,
                text: "ee".to_string(),
            })
            .unwrap();
        assert_eq!(editor.selection().unwrap().anchor.offset, 5);
        editor
            .apply(Operation::RemoveText {
                block: 0,
                child: 0,
                offset: 0,
                length: 6,
            })
            .unwrap();
        assert_eq!(editor.selection().unwrap().anchor.offset, 0);
    }

    #[test]
    fn test_split_moves_caret_into_second_half() {
        let mut editor = editor();
        editor
            .apply(Operation::SetSelection {
                selection: Some(Range::collapsed(RangePoint::new(vec![0, 1], 5))),
            })
            .unwrap();
        editor
            .apply(Operation::SplitChild {
                block: 0,
                child: 1,
                offset: 2,
                key: "a3".to_string(),
            })
            .unwrap();
        assert_eq!(
            editor.selection().unwrap().anchor,
            RangePoint::new(vec![0, 2], 3)
        );
        editor
            .apply(Operation::MergeChild { block: 0, child: 2 })
            .unwrap();
        assert_eq!(
            editor.selection().unwrap().anchor,
            RangePoint::new(vec![0, 1], 5)
        );
    }

    #[test]
    fn test_block_edits_shift_and_clear_selection() {
        let mut editor = editor();
        editor
            .apply(Operation::SetSelection {
                selection: Some(Range::collapsed(RangePoint::new(vec![1], 0))),
            })
            .unwrap();
        editor
            .apply(Operation::InsertBlock {
                index: 0,
                block: Block::object("first", "image"),
            })
            .unwrap();
        assert_eq!(editor.selection().unwrap().anchor.path, vec![2]);
        editor
            .apply(Operation::RemoveBlock { index: 2 })
            .unwrap();
        assert!(editor.selection().is_none());
    }

    #[test]
    fn test_replace_text_uses_minimal_edits() {
        let mut editor = editor();
        editor
            .apply(Operation::SetSelection {
                selection: Some(Range::collapsed(RangePoint::new(vec![0, 0], 5))),
            })
            .unwrap();
        editor.take_log();
        let before = editor.snapshot();
        let patches = editor.replace_text(0, 0, "Hi Hello").unwrap();
        assert_eq!(
            apply_patches(&before, &patches).unwrap(),
            *editor.snapshot()
        );
        assert_eq!(editor.selection().unwrap().anchor.offset, 8);
        assert!(
            editor
                .take_log()
                .iter()
                .all(|op| matches!(op, Operation::InsertText { .. }))
        );
    }

    #[test]
    fn test_out_of_range_operations_fail() {
        let mut editor = editor();
        assert!(matches!(
            editor.apply(Operation::RemoveBlock { index: 9 }),
            Err(PatchError::PathNotFound(_))
        ));
        assert!(matches!(
            editor.apply(Operation::InsertChild {
                block: 1,
                index: 0,
                child: span("x", "", &[]),
            }),
            Err(PatchError::NotAnArray(_))
        ));
        assert!(matches!(
            editor.apply(Operation::MergeChild { block: 0, child: 0 }),
            Err(PatchError::NotAString(_))
        ));
    }
}
