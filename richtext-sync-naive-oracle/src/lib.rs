//! A naive, simple oracle implementation for differential testing.
use richtext_sync::model::{Block, TEXT};
use richtext_sync::schema::Schema;
use std::collections::HashMap;

fn list_item<'a>(block: &'a Block, schema: &Schema) -> Option<&'a str> {
    block
        .type_name()
        .filter(|type_name| schema.is_text_block(type_name))
        .and_then(|_| block.list_item())
        .filter(|name| schema.is_list_item(name))
}

/// List ordinals computed by walking back from every list item. Quadratic,
/// but obviously correct.
pub fn list_ordinals(blocks: &[Block], schema: &Schema) -> HashMap<String, usize> {
    let mut ordinals = HashMap::new();
    for (position, block) in blocks.iter().enumerate() {
        let (Some(key), Some(name)) = (block.key(), list_item(block, schema)) else {
            continue;
        };
        let level = block.level().unwrap_or(1);
        let mut ordinal = 1;
        for previous in blocks[..position].iter().rev() {
            let Some(previous_name) = list_item(previous, schema) else {
                break;
            };
            let previous_level = previous.level().unwrap_or(1);
            if previous_level > level {
                continue;
            }
            if previous_level < level || previous_name != name {
                break;
            }
            ordinal += 1;
        }
        ordinals.insert(key.to_string(), ordinal);
    }
    ordinals
}

/// A document that is simply replaced by every value it is given.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NaiveDocument {
    blocks: Vec<Block>,
}

impl NaiveDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync(&mut self, value: Option<&[Block]>) {
        self.blocks = value.map(<[Block]>::to_vec).unwrap_or_default();
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The plain text of every block, children concatenated.
    pub fn texts(&self) -> Vec<String> {
        self.blocks.iter().map(block_text).collect()
    }
}

pub fn block_text(block: &Block) -> String {
    block
        .children()
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.get(TEXT)?.as_str())
                .collect()
        })
        .unwrap_or_default()
}
