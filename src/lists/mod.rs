//! List numbering.
//!
//! One pass over the flat block sequence assigns every list item its 1-based
//! ordinal within the contiguous run at its own nesting level.

use crate::model::Block;
use crate::schema::Schema;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListIndex {
    /// Position of every keyed block in the sequence.
    #[serde(rename = "blockIndexMap")]
    pub block_index: HashMap<String, usize>,
    /// Ordinal of every list item within its run.
    #[serde(rename = "listIndexMap")]
    pub list_index: HashMap<String, usize>,
}

impl ListIndex {
    pub fn block_position(&self, key: &str) -> Option<usize> {
        self.block_index.get(key).copied()
    }

    pub fn list_ordinal(&self, key: &str) -> Option<usize> {
        self.list_index.get(key).copied()
    }
}

#[derive(Debug)]
struct OpenLevel<'a> {
    list_item: &'a str,
    level: u32,
    counter: usize,
}

/// Builds both maps in a single scan.
///
/// Any block that is not a list item (block objects, plain paragraphs, list
/// items with an unrecognized `listItem`) closes every open level. A list
/// item closes deeper levels and a same-level run of another list type
/// before opening or continuing its own run. A missing `level` means 1.
pub fn build_list_index(blocks: &[Block], schema: &Schema) -> ListIndex {
    let mut index = ListIndex::default();
    let mut open: Vec<OpenLevel<'_>> = Vec::new();

    for (position, block) in blocks.iter().enumerate() {
        if let Some(key) = block.key() {
            index.block_index.insert(key.to_string(), position);
        }

        let list_item = block
            .type_name()
            .filter(|type_name| schema.is_text_block(type_name))
            .and_then(|_| schema.resolve_list_item(block.list_item()));
        let Some(list_item) = list_item else {
            open.clear();
            continue;
        };
        let level = block.level().unwrap_or(1);

        while open.last().is_some_and(|top| top.level > level) {
            open.pop();
        }
        if open
            .last()
            .is_some_and(|top| top.level == level && top.list_item != list_item)
        {
            open.pop();
        }

        let counter = match open.last_mut() {
            Some(top) if top.level == level => {
                top.counter += 1;
                top.counter
            }
            _ => {
                open.push(OpenLevel {
                    list_item,
                    level,
                    counter: 1,
                });
                1
            }
        };

        if let Some(key) = block.key() {
            index.list_index.insert(key.to_string(), counter);
        }
    }

    index
}
