//! Local edit commands. Each one produces local patches that are emitted
//! right away and buffered for the next mutation.

use super::{Engine, EngineError};
use crate::editor::{Node, Operation, SpanNode};
use crate::model::{Block, MARKS};
use crate::selection::{EditorSelection, Range, RangePoint, start_of_document, to_range};
use crate::validation::repair_block;
use serde_json::{Map, Value as Json, json};
use std::collections::HashSet;

impl Engine {
    /// Sets the selection. A selection that does not resolve clears it.
    pub fn select(&mut self, selection: Option<EditorSelection>) -> Result<(), EngineError> {
        let range = selection
            .as_ref()
            .and_then(|selection| to_range(selection, self.editor.nodes()));
        self.set_range(range)?;
        self.emit_selection();
        Ok(())
    }

    /// Types `text` at the caret, replacing the selected text first.
    pub fn insert_text(&mut self, text: &str) -> Result<(), EngineError> {
        self.writable()?;
        let range = self.range()?;
        if !range.is_collapsed() {
            self.delete_range(&range)?;
        }
        let point = self.range()?.focus;
        let (block, child) = self.text_position(&point)?;
        self.apply_local(Operation::InsertText {
            block,
            child,
            offset: point.offset,
            text: text.to_string(),
        })?;
        self.emit_selection();
        Ok(())
    }

    /// Deletes the selected text, or the character before a collapsed caret
    /// within its span.
    pub fn delete_text(&mut self) -> Result<(), EngineError> {
        self.writable()?;
        let range = self.range()?;
        if range.is_collapsed() {
            let point = range.focus;
            let (block, child) = self.text_position(&point)?;
            if point.offset > 0 {
                self.remove_span_text(block, child, point.offset - 1, 1)?;
            }
        } else {
            self.delete_range(&range)?;
        }
        self.emit_selection();
        Ok(())
    }

    /// Inserts `block` at `index` (clamped to the end), repairing it first.
    pub fn insert_block(&mut self, index: usize, block: Block) -> Result<(), EngineError> {
        self.writable()?;
        let taken: HashSet<String> = self
            .editor
            .nodes()
            .iter()
            .filter_map(Node::key)
            .map(str::to_string)
            .collect();
        let index = index.min(self.editor.len());
        let repair = repair_block(&block, index, &self.schema, self.keys.as_mut(), &taken)
            .map_err(|resolution| EngineError::InvalidBlock(resolution.description))?;
        self.apply_local(Operation::InsertBlock {
            index,
            block: repair.block,
        })?;
        self.emit_selection();
        Ok(())
    }

    pub fn remove_block(&mut self, key: &str) -> Result<(), EngineError> {
        self.writable()?;
        let index = self.block_index(key)?;
        let had_selection = self.editor.selection().is_some();
        self.apply_local(Operation::RemoveBlock { index })?;
        if had_selection && self.editor.selection().is_none() {
            let start = start_of_document(self.editor.nodes()).map(Range::collapsed);
            self.set_range(start)?;
        }
        self.emit_selection();
        Ok(())
    }

    /// Sets fields of a block; a `null` value removes the field.
    pub fn set_block_fields(&mut self, key: &str, props: Map<String, Json>) -> Result<(), EngineError> {
        self.writable()?;
        let index = self.block_index(key)?;
        self.apply_local(Operation::SetBlock { index, props })?;
        self.emit_selection();
        Ok(())
    }

    /// Adds the decorator to the selected text, or removes it when all of
    /// the selected text already has it. Spans are split at the selection
    /// edges and equal neighbours merged afterwards.
    pub fn toggle_mark(&mut self, mark: &str) -> Result<(), EngineError> {
        self.writable()?;
        if !self.schema.is_decorator(mark) {
            return Err(EngineError::UnknownDecorator(mark.to_string()));
        }
        let range = self.range()?;
        if range.is_collapsed() {
            return Ok(());
        }
        let (start, end) = (range.start().clone(), range.end().clone());
        if start.block() != end.block() {
            return Err(EngineError::SelectionSpansBlocks);
        }

        self.editor.begin_normalizing();
        let result = self.toggle_mark_within(&start, &end, mark, range.is_backward());
        self.editor.end_normalizing();
        result?;
        self.emit_selection();
        Ok(())
    }

    fn toggle_mark_within(&mut self, start: &RangePoint, end: &RangePoint, mark: &str, backward: bool) -> Result<(), EngineError> {
        let (block, start_child) = self.text_position(start)?;
        let (_, end_child) = self.text_position(end)?;
        let mut first = start_child;
        let mut last = end_child;

        // The end goes first so the start child keeps its index.
        if let Some(len) = self.span_at(block, end_child).map(span_len) {
            if end.offset == 0 && end_child > start_child {
                last -= 1;
            } else if end.offset > 0 && end.offset < len {
                self.split(block, end_child, end.offset)?;
            }
        }
        if let Some(len) = self.span_at(block, start_child).map(span_len) {
            if start.offset >= len {
                first += 1;
            } else if start.offset > 0 {
                self.split(block, start_child, start.offset)?;
                first += 1;
                last += 1;
            }
        }
        if first > last {
            return Ok(());
        }

        let spans: Vec<usize> = (first..=last)
            .filter(|&child| self.span_at(block, child).is_some())
            .collect();
        let active = spans
            .iter()
            .all(|&child| self.span_at(block, child).is_some_and(|span| has_mark(span, mark)));
        for &child in &spans {
            let Some(span) = self.span_at(block, child) else {
                continue;
            };
            let mut marks = span.marks.clone().unwrap_or_default();
            if active {
                marks.retain(|existing| existing != mark);
            } else if has_mark(span, mark) {
                continue;
            } else {
                marks.push(mark.to_string());
            }
            let mut props = Map::new();
            props.insert(MARKS.to_string(), json!(marks));
            self.apply_local(Operation::SetChild {
                block,
                index: child,
                props,
            })?;
        }

        let last_len = self.span_at(block, last).map_or(0, span_len);
        let from = RangePoint::new(vec![block, first], 0);
        let to = RangePoint::new(vec![block, last], last_len);
        let range = if backward {
            Range::new(to, from)
        } else {
            Range::new(from, to)
        };
        self.set_range(Some(range))?;
        self.merge_equal_spans(block)
    }

    fn split(&mut self, block: usize, child: usize, offset: usize) -> Result<(), EngineError> {
        let key = self.keys.next_key();
        self.apply_local(Operation::SplitChild {
            block,
            child,
            offset,
            key,
        })
    }

    fn merge_equal_spans(&mut self, block: usize) -> Result<(), EngineError> {
        let len = self.editor.node(block).map_or(0, |node| node.children().len());
        for child in (1..len).rev() {
            let mergeable = match (self.span_at(block, child - 1), self.span_at(block, child)) {
                (Some(left), Some(right)) => {
                    left.type_name == right.type_name && left.marks == right.marks && left.props == right.props
                }
                _ => false,
            };
            if mergeable {
                self.apply_local(Operation::MergeChild { block, child })?;
            }
        }
        Ok(())
    }

    fn delete_range(&mut self, range: &Range) -> Result<(), EngineError> {
        let (start, end) = (range.start(), range.end());
        if start.block() != end.block() {
            return Err(EngineError::SelectionSpansBlocks);
        }
        let (block, first) = self.text_position(start)?;
        let (_, last) = self.text_position(end)?;
        if first == last {
            self.remove_span_text(block, first, start.offset, end.offset - start.offset)?;
        } else {
            self.remove_span_text(block, last, 0, end.offset)?;
            for child in (first + 1..last).rev() {
                self.apply_local(Operation::RemoveChild { block, index: child })?;
            }
            self.remove_span_text(block, first, start.offset, usize::MAX)?;
        }
        let caret = RangePoint::new(vec![block, first], start.offset);
        self.set_range(Some(Range::collapsed(caret)))
    }

    /// Removes text from a span; inline objects are left alone.
    fn remove_span_text(&mut self, block: usize, child: usize, offset: usize, length: usize) -> Result<(), EngineError> {
        if self.span_at(block, child).is_none() || length == 0 {
            return Ok(());
        }
        self.apply_local(Operation::RemoveText {
            block,
            child,
            offset,
            length,
        })
    }

    fn apply_local(&mut self, op: Operation) -> Result<(), EngineError> {
        let patches = self.editor.apply(op)?;
        self.editor.take_log();
        self.emit_local(patches);
        Ok(())
    }

    fn set_range(&mut self, range: Option<Range>) -> Result<(), EngineError> {
        self.editor.apply(Operation::SetSelection { selection: range })?;
        self.editor.take_log();
        Ok(())
    }

    fn range(&self) -> Result<Range, EngineError> {
        self.editor.selection().cloned().ok_or(EngineError::NoSelection)
    }

    fn block_index(&self, key: &str) -> Result<usize, EngineError> {
        self.editor
            .position(key)
            .ok_or_else(|| EngineError::BlockNotFound(key.to_string()))
    }

    /// The text block and child a point sits in.
    fn text_position(&self, point: &RangePoint) -> Result<(usize, usize), EngineError> {
        let block = point.block();
        let node = self
            .editor
            .node(block)
            .ok_or_else(|| EngineError::BlockNotFound(block.to_string()))?;
        let text = node.as_text().ok_or(EngineError::NotATextBlock)?;
        let child = point.child().unwrap_or(0);
        if child >= text.children.len() {
            return Err(EngineError::ChildNotFound);
        }
        Ok((block, child))
    }

    fn span_at(&self, block: usize, child: usize) -> Option<&SpanNode> {
        self.editor.node(block)?.children().get(child)?.as_span()
    }
}

fn span_len(span: &SpanNode) -> usize {
    span.text.chars().count()
}

fn has_mark(span: &SpanNode, mark: &str) -> bool {
    span.marks.iter().flatten().any(|existing| existing == mark)
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::engine::{Engine, EngineError};
    use crate::events::EditorEvent;
    use crate::keys::SequentialKeys;
    use crate::model::{Block, Value, span};
    use crate::patch::{Origin, Path, apply_patches};
    use crate::schema::Schema;
    use crate::selection::{EditorPoint, EditorSelection};
    use serde_json::json;

    fn engine(value: Value) -> Engine {
        let mut engine =
            Engine::new(Schema::default(), EngineConfig::testing()).with_key_generator(SequentialKeys::new());
        engine.update_value(Some(value));
        engine.drain_events();
        engine
    }

    fn point(block: &str, child: &str, offset: usize) -> EditorPoint {
        EditorPoint::new(Path::child(block, child), offset)
    }

    fn select(engine: &mut Engine, anchor: EditorPoint, focus: EditorPoint) {
        engine.select(Some(EditorSelection::new(anchor, focus))).unwrap();
    }

    /// Local patches emitted since the last drain.
    fn local_patches(engine: &mut Engine) -> Vec<crate::patch::Patch> {
        engine
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                EditorEvent::Patch {
                    patch,
                    origin: Origin::Local,
                } => Some(patch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_typing_replaces_selected_text() {
        let before = vec![Block::text("a", vec![span("a1", "Hello world", &[])])];
        let mut engine = engine(before.clone());
        select(&mut engine, point("a", "a1", 6), point("a", "a1", 11));
        engine.insert_text("there").unwrap();

        let patches = local_patches(&mut engine);
        let expected = vec![Block::text("a", vec![span("a1", "Hello there", &[])])];
        assert_eq!(*engine.value(), expected);
        assert_eq!(apply_patches(&before, &patches).unwrap(), expected);
        assert_eq!(engine.selection().unwrap().focus, point("a", "a1", 11));
    }

    #[test]
    fn test_backspace_at_caret() {
        let mut engine = engine(vec![Block::text("a", vec![span("a1", "abc", &[])])]);
        select(&mut engine, point("a", "a1", 2), point("a", "a1", 2));
        engine.delete_text().unwrap();
        assert_eq!(engine.value()[0], Block::text("a", vec![span("a1", "ac", &[])]));
        assert_eq!(engine.selection().unwrap().focus.offset, 1);
    }

    #[test]
    fn test_toggle_mark_splits_and_merges() {
        let before = vec![Block::text("a", vec![span("a1", "Hello world", &[])])];
        let mut engine = engine(before.clone());
        select(&mut engine, point("a", "a1", 6), point("a", "a1", 11));

        engine.toggle_mark("strong").unwrap();
        let value = engine.value();
        let children = value[0].children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["text"], "Hello ");
        assert_eq!(children[1]["text"], "world");
        assert_eq!(children[1]["marks"], json!(["strong"]));
        let patches = local_patches(&mut engine);
        assert_eq!(apply_patches(&before, &patches).unwrap(), *engine.value());

        engine.toggle_mark("strong").unwrap();
        let value = engine.value();
        let children = value[0].children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["text"], "Hello world");
        assert_eq!(children[0]["marks"], json!([]));
    }

    #[test]
    fn test_toggle_mark_rejects_unknown_decorator() {
        let mut engine = engine(vec![Block::text("a", vec![span("a1", "x", &[])])]);
        select(&mut engine, point("a", "a1", 0), point("a", "a1", 1));
        assert_eq!(
            engine.toggle_mark("blink"),
            Err(EngineError::UnknownDecorator("blink".to_string()))
        );
    }

    #[test]
    fn test_block_commands() {
        let mut engine = engine(vec![Block::text("a", vec![span("a1", "x", &[])])]);
        engine
            .insert_block(5, Block::text("a", vec![span("b1", "dup", &[])]))
            .unwrap();
        let value = engine.value();
        assert_eq!(value.len(), 2);
        // The duplicate key was replaced.
        assert_ne!(value[1].key(), Some("a"));

        let mut props = serde_json::Map::new();
        props.insert("style".to_string(), json!("h1"));
        engine.set_block_fields("a", props).unwrap();
        assert_eq!(engine.value()[0].style(), Some("h1"));

        select(&mut engine, point("a", "a1", 1), point("a", "a1", 1));
        engine.remove_block("a").unwrap();
        assert_eq!(engine.value().len(), 1);
        assert!(engine.selection().is_some());
        assert_eq!(
            engine.remove_block("a"),
            Err(EngineError::BlockNotFound("a".to_string()))
        );
    }

    #[test]
    fn test_edits_without_selection_fail() {
        let mut engine = engine(vec![Block::object("img", "image")]);
        assert_eq!(engine.insert_text("x"), Err(EngineError::NoSelection));
        engine
            .select(Some(EditorSelection::collapsed(EditorPoint::new(Path::block("img"), 0))))
            .unwrap();
        assert_eq!(engine.insert_text("x"), Err(EngineError::NotATextBlock));
    }
}
