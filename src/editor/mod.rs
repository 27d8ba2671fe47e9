//! The internal, mutable representation of the document.
//!
//! [`Editor`] owns a typed node tree, the current index-based selection and
//! a few derived caches. Every change goes through [`Editor::apply`], which
//! performs one [`Operation`], keeps the selection anchored and returns the
//! patches describing the change in key-based terms.

use crate::model::{Block, CHILDREN, MARK_DEFS, STYLE, Value};
use crate::patch::{Path, PatchError};
use crate::schema::Schema;
use crate::selection::{Range, RangePoint, clamp_range};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub mod node;
pub mod ops;
mod remote;

pub use node::{Inline, Node, SpanNode, TextNode};
pub use ops::{Operation, diff_props};

#[derive(Debug)]
pub struct Editor {
    schema: Rc<Schema>,
    nodes: Vec<Node>,
    selection: Option<Range>,
    /// Bumped on every structural change.
    version: u64,
    snapshot: RefCell<Option<(u64, Rc<Value>)>>,
    /// Last known plain value of every block, by key.
    known: HashMap<String, Block>,
    normalizing: usize,
    log: Vec<Operation>,
}

impl Editor {
    pub fn new(schema: Rc<Schema>) -> Self {
        Self {
            schema,
            nodes: Vec::new(),
            selection: None,
            version: 0,
            snapshot: RefCell::new(None),
            known: HashMap::new(),
            normalizing: 0,
            log: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.key() == Some(key))
    }

    pub fn selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The cached plain value of the block with this key.
    pub fn known_block(&self, key: &str) -> Option<&Block> {
        self.known.get(key)
    }

    /// The whole tree as a plain value, recomputed only after a structural
    /// change.
    pub fn snapshot(&self) -> Rc<Value> {
        let mut cache = self.snapshot.borrow_mut();
        if let Some((version, value)) = cache.as_ref() {
            if *version == self.version {
                return Rc::clone(value);
            }
        }
        let value: Rc<Value> = Rc::new(self.nodes.iter().map(Node::to_block).collect());
        *cache = Some((self.version, Rc::clone(&value)));
        value
    }

    pub fn is_normalizing(&self) -> bool {
        self.normalizing > 0
    }

    /// Marks the start of a normalization pass. Passes nest.
    pub fn begin_normalizing(&mut self) {
        self.normalizing += 1;
    }

    pub fn end_normalizing(&mut self) {
        self.normalizing = self.normalizing.saturating_sub(1);
    }

    /// Drains the operations applied since the last call.
    pub fn take_log(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.log)
    }

    /// Whether the tree is exactly one empty default text block: default
    /// style, no list fields or mark definitions, and one unmarked empty span.
    pub fn is_placeholder(&self) -> bool {
        let [Node::Text(text)] = self.nodes.as_slice() else {
            return false;
        };
        let [Inline::Span(span)] = text.children.as_slice() else {
            return false;
        };
        let default_props = text.props.iter().all(|(name, value)| match name.as_str() {
            STYLE => value.as_str() == Some(self.schema.default_style()),
            MARK_DEFS => value.as_array().is_some_and(Vec::is_empty),
            _ => false,
        });
        default_props
            && text.props.contains_key(STYLE)
            && span.text.is_empty()
            && span.marks.as_ref().is_none_or(Vec::is_empty)
            && span.props.is_empty()
    }

    pub fn block_path(&self, index: usize) -> Path {
        match self.nodes.get(index).and_then(Node::key) {
            Some(key) => Path::block(key),
            None => Path::block_at(index),
        }
    }

    pub fn child_path(&self, block: usize, child: usize) -> Path {
        let path = self.block_path(block).join_field(CHILDREN);
        let key = self
            .nodes
            .get(block)
            .and_then(|node| node.children().get(child))
            .and_then(Inline::key);
        match key {
            Some(key) => path.join_key(key),
            None => path.join_index(child),
        }
    }

    fn block_path_checked(&self, index: usize) -> Result<Path, PatchError> {
        if index < self.nodes.len() {
            Ok(self.block_path(index))
        } else {
            Err(PatchError::PathNotFound(Path::block_at(index)))
        }
    }

    fn child_path_checked(&self, block: usize, child: usize) -> Result<Path, PatchError> {
        let block_path = self.block_path_checked(block)?;
        if child < self.nodes[block].children().len() {
            Ok(self.child_path(block, child))
        } else {
            Err(PatchError::PathNotFound(
                block_path.join_field(CHILDREN).join_index(child),
            ))
        }
    }

    fn text_node_mut(&mut self, block: usize) -> Result<&mut TextNode, PatchError> {
        let path = self.block_path_checked(block)?.join_field(CHILDREN);
        self.nodes[block]
            .as_text_mut()
            .ok_or(PatchError::NotAnArray(path))
    }

    fn span_mut(&mut self, block: usize, child: usize) -> Result<&mut SpanNode, PatchError> {
        let path = self.child_path_checked(block, child)?;
        self.text_node_mut(block)?.children[child]
            .as_span_mut()
            .ok_or(PatchError::NotAString(path))
    }

    fn refresh_known(&mut self, index: usize) {
        if let Some(node) = self.nodes.get(index) {
            if let Some(key) = node.key() {
                self.known.insert(key.to_string(), node.to_block());
            }
        }
    }

    /// Drops the side table entry of `key` unless another block still
    /// carries it.
    fn forget(&mut self, key: &str) {
        if !self.nodes.iter().any(|node| node.key() == Some(key)) {
            self.known.remove(key);
        }
    }

    /// Maps both selection points; a point mapped to `None` clears the
    /// selection.
    fn transform_points(&mut self, map: impl Fn(&RangePoint) -> Option<RangePoint>) {
        let range = self.selection.take();
        self.selection = range.and_then(|range| Some(Range::new(map(&range.anchor)?, map(&range.focus)?)));
    }

    fn clamp_selection(&mut self) {
        let range = self.selection.take();
        self.selection = range.and_then(|range| clamp_range(&range, &self.nodes));
    }
}
