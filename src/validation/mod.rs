//! Schema validation and automatic repair.
//!
//! [`validate_block`] reports the first problem of a block together with a
//! [`Resolution`]: the patches that would fix it and whether they may be
//! applied without asking. [`repair_block`] applies auto-resolvable fixes
//! until the block is valid.

use crate::keys::KeyGenerator;
use crate::model::{Block, CHILDREN, KEY, MARK_DEFS, MARKS, STYLE, TEXT, TYPE, json_key, json_type};
use crate::patch::{Patch, PatchError, Path, apply_to_block};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};
use std::collections::HashSet;

/// Upper bound on repair rounds for one block; each round fixes one rule.
const MAX_REPAIR_ROUNDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub action: String,
    pub description: String,
    pub item: Json,
    pub patches: Vec<Patch>,
    pub auto_resolve: bool,
}

impl Resolution {
    fn auto(action: &str, description: String, item: Json, patches: Vec<Patch>) -> Self {
        Self {
            action: action.to_string(),
            description,
            item,
            patches,
            auto_resolve: true,
        }
    }

    fn manual(action: &str, description: String, item: Json, patches: Vec<Patch>) -> Self {
        Self {
            auto_resolve: false,
            ..Self::auto(action, description, item, patches)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid,
    Invalid(Resolution),
}

/// A repaired block and the patches that repaired it.
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub block: Block,
    pub patches: Vec<Patch>,
    pub resolutions: Vec<Resolution>,
}

/// An empty span of the schema's span type.
pub fn empty_span(schema: &Schema, key: String) -> Json {
    json!({
        KEY: key,
        TYPE: schema.span_type(),
        TEXT: "",
        MARKS: [],
    })
}

/// The block an empty document is reset to.
pub fn placeholder_block(schema: &Schema, keys: &mut dyn KeyGenerator) -> Block {
    let key = keys.next_key();
    let span = empty_span(schema, keys.next_key());
    Block::new()
        .with(KEY, json!(key))
        .with(TYPE, json!(schema.block_type()))
        .with(CHILDREN, json!([span]))
        .with(MARK_DEFS, json!([]))
        .with(STYLE, json!(schema.default_style()))
}

/// Checks that `value` is a list of records. Anything else can only be
/// unset.
pub fn validate_value(value: &Json) -> Option<Resolution> {
    let description = match value {
        Json::Null => return None,
        Json::Array(items) => match items.iter().position(|item| !item.is_object()) {
            None => return None,
            Some(index) => format!("Value item at index {index} is not an object"),
        },
        _ => "Value must be an array of blocks".to_string(),
    };
    Some(Resolution::manual(
        "Unset the value",
        description,
        value.clone(),
        vec![Patch::unset(Path::root())],
    ))
}

/// Validates the block at `index` of its value. `taken` holds the keys of
/// the blocks before it.
pub fn validate_block(
    block: &Block,
    index: usize,
    schema: &Schema,
    keys: &mut dyn KeyGenerator,
    taken: &HashSet<String>,
) -> Validation {
    let block_key = block.key().filter(|key| !taken.contains(*key));
    let path = match block_key {
        Some(key) => Path::block(key),
        None => Path::block_at(index),
    };
    let item = block.clone().into_json();

    let type_name = block.type_name().unwrap_or_default();
    if !schema.is_block_type(type_name) {
        return Validation::Invalid(Resolution::manual(
            "Remove the block",
            format!("Block has an unknown type '{type_name}'"),
            item,
            vec![Patch::unset(path)],
        ));
    }

    if schema.is_text_block(type_name) {
        if let Some(resolution) = validate_text_block(block, &path, schema, keys) {
            return Validation::Invalid(resolution);
        }
    }

    if block_key.is_none() {
        let description = match block.key() {
            Some(key) => format!("Block key '{key}' is already in use"),
            None => "Block is missing a key".to_string(),
        };
        return Validation::Invalid(Resolution::auto(
            "Assign a new key",
            description,
            item,
            vec![Patch::set(path.join_field(KEY), json!(keys.next_key()))],
        ));
    }

    Validation::Valid
}

fn child_path(block_path: &Path, index: usize, child: &Json, used: &HashSet<&str>) -> Path {
    let path = block_path.clone().join_field(CHILDREN);
    match json_key(child).filter(|key| !used.contains(key)) {
        Some(key) => path.join_key(key),
        None => path.join_index(index),
    }
}

/// Paths of every child, by key where the key is usable.
fn child_paths(block_path: &Path, children: &[Json]) -> Vec<Path> {
    let mut used = HashSet::new();
    children
        .iter()
        .enumerate()
        .map(|(index, child)| {
            let path = child_path(block_path, index, child, &used);
            if let Some(key) = json_key(child) {
                used.insert(key);
            }
            path
        })
        .collect()
}

fn is_valid_mark_def(def: &Json, schema: &Schema) -> bool {
    json_key(def).is_some() && json_type(def).is_some_and(|type_name| schema.is_annotation(type_name))
}

fn validate_text_block(
    block: &Block,
    path: &Path,
    schema: &Schema,
    keys: &mut dyn KeyGenerator,
) -> Option<Resolution> {
    let children = block.children().map(Vec::as_slice).unwrap_or_default();
    let paths = child_paths(path, children);

    for (child, child_path) in children.iter().zip(&paths) {
        let known = json_type(child)
            .is_some_and(|type_name| schema.is_span(type_name) || schema.is_inline_object(type_name));
        if !child.is_object() || !known {
            return Some(Resolution::manual(
                "Remove the object",
                format!(
                    "Child has an unknown type '{}'",
                    json_type(child).unwrap_or_default()
                ),
                child.clone(),
                vec![Patch::unset(child_path.clone())],
            ));
        }
    }

    let is_span = |child: &Json| json_type(child).is_some_and(|type_name| schema.is_span(type_name));

    let missing_text: Vec<Patch> = children
        .iter()
        .zip(&paths)
        .filter(|(child, _)| is_span(*child) && !child.get(TEXT).is_some_and(Json::is_string))
        .map(|(_, child_path)| Patch::set(child_path.clone().join_field(TEXT), json!("")))
        .collect();
    if !missing_text.is_empty() {
        return Some(Resolution::auto(
            "Write an empty text property to the object",
            "Span is missing a text property".to_string(),
            block.clone().into_json(),
            missing_text,
        ));
    }

    let mark_defs = block.mark_defs().map(Vec::as_slice).unwrap_or_default();
    let def_keys: HashSet<&str> = mark_defs
        .iter()
        .filter(|def| is_valid_mark_def(def, schema))
        .filter_map(json_key)
        .collect();
    let is_valid_mark = |mark: &Json| {
        mark.as_str()
            .is_some_and(|mark| schema.is_decorator(mark) || def_keys.contains(mark))
    };

    let orphan_marks: Vec<Patch> = children
        .iter()
        .zip(&paths)
        .filter(|(child, _)| is_span(*child))
        .filter_map(|(child, child_path)| {
            let marks = child.get(MARKS)?;
            let kept: Vec<Json> = match marks.as_array() {
                Some(marks) if marks.iter().all(is_valid_mark) => return None,
                Some(marks) => marks.iter().filter(|mark| is_valid_mark(*mark)).cloned().collect(),
                None => Vec::new(),
            };
            Some(Patch::set(child_path.clone().join_field(MARKS), Json::Array(kept)))
        })
        .collect();
    if !orphan_marks.is_empty() {
        return Some(Resolution::auto(
            "Remove invalid marks",
            "Span has marks that are neither decorators nor annotations of this block".to_string(),
            block.clone().into_json(),
            orphan_marks,
        ));
    }

    let referenced: HashSet<&str> = children
        .iter()
        .filter_map(|child| child.get(MARKS)?.as_array())
        .flatten()
        .filter_map(Json::as_str)
        .collect();
    let kept_defs: Vec<Json> = mark_defs
        .iter()
        .filter(|def| is_valid_mark_def(def, schema))
        .filter(|def| json_key(def).is_some_and(|key| referenced.contains(key)))
        .cloned()
        .collect();
    if block.mark_defs().is_some() && kept_defs.len() != mark_defs.len() {
        return Some(Resolution::auto(
            "Remove unused mark definitions",
            "Block has mark definitions that no span refers to".to_string(),
            block.clone().into_json(),
            vec![Patch::set(path.clone().join_field(MARK_DEFS), Json::Array(kept_defs))],
        ));
    }

    let mut defaults = Vec::new();
    if children.is_empty() {
        defaults.push(Patch::set(
            path.clone().join_field(CHILDREN),
            json!([empty_span(schema, keys.next_key())]),
        ));
    }
    if block.mark_defs().is_none() {
        defaults.push(Patch::set(path.clone().join_field(MARK_DEFS), json!([])));
    }
    let style_unrecognized = match block.style() {
        Some(style) => !schema.styles.is_empty() && !schema.is_style(style),
        None => true,
    };
    if style_unrecognized {
        defaults.push(Patch::set(
            path.clone().join_field(STYLE),
            json!(schema.default_style()),
        ));
    }
    if !defaults.is_empty() {
        return Some(Resolution::auto(
            "Set default values",
            "Block is missing required properties".to_string(),
            block.clone().into_json(),
            defaults,
        ));
    }

    let mut seen = HashSet::new();
    let child_keys: Vec<Patch> = children
        .iter()
        .zip(&paths)
        .filter(|(child, _)| !json_key(child).is_some_and(|key| seen.insert(key)))
        .map(|(_, child_path)| Patch::set(child_path.clone().join_field(KEY), json!(keys.next_key())))
        .collect();
    if !child_keys.is_empty() {
        return Some(Resolution::auto(
            "Assign new keys",
            "Block has children with missing or duplicate keys".to_string(),
            block.clone().into_json(),
            child_keys,
        ));
    }

    None
}

/// Applies auto-resolvable fixes to `block` until it validates.
///
/// Returns the first resolution that is not auto-resolvable, or the last one
/// seen when the block does not settle.
pub fn repair_block(
    block: &Block,
    index: usize,
    schema: &Schema,
    keys: &mut dyn KeyGenerator,
    taken: &HashSet<String>,
) -> Result<Repair, Resolution> {
    let mut repaired = block.clone();
    let mut patches = Vec::new();
    let mut resolutions = Vec::new();

    for _ in 0..MAX_REPAIR_ROUNDS {
        let resolution = match validate_block(&repaired, index, schema, keys, taken) {
            Validation::Valid => {
                return Ok(Repair {
                    block: repaired,
                    patches,
                    resolutions,
                });
            }
            Validation::Invalid(resolution) if !resolution.auto_resolve => return Err(resolution),
            Validation::Invalid(resolution) => resolution,
        };
        match apply_all(&repaired, &resolution.patches) {
            Ok(next) => repaired = next,
            Err(_) => {
                return Err(Resolution {
                    auto_resolve: false,
                    ..resolution
                });
            }
        }
        patches.extend(resolution.patches.iter().cloned());
        resolutions.push(resolution);
    }

    Err(resolutions
        .pop()
        .map(|resolution| Resolution {
            auto_resolve: false,
            ..resolution
        })
        .unwrap_or_else(|| {
            Resolution::manual(
                "Remove the block",
                "Block could not be repaired".to_string(),
                block.clone().into_json(),
                Vec::new(),
            )
        }))
}

fn apply_all(block: &Block, patches: &[Patch]) -> Result<Block, PatchError> {
    let mut block = block.clone();
    for patch in patches {
        block = apply_to_block(&block, patch)?.ok_or_else(|| PatchError::PathNotFound(patch.path().clone()))?;
    }
    Ok(block)
}
