//! Plain value model.
//!
//! The externally-owned document is an ordered list of [`Block`] records. A
//! block is kept as a loosely-typed JSON object so that malformed input (a
//! missing `_key`, a span without `text`, an unknown `_type`) can be
//! represented, inspected and repaired instead of rejected at the parser.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};

pub const KEY: &str = "_key";
pub const TYPE: &str = "_type";
pub const CHILDREN: &str = "children";
pub const MARK_DEFS: &str = "markDefs";
pub const STYLE: &str = "style";
pub const LIST_ITEM: &str = "listItem";
pub const LEVEL: &str = "level";
pub const TEXT: &str = "text";
pub const MARKS: &str = "marks";

/// The externally-owned document: an ordered list of blocks.
pub type Value = Vec<Block>;

/// One top-level record of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block(pub Map<String, Json>);

impl Block {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Json>) -> Self {
        Self(map)
    }

    /// Builds a text block with the conventional `block` type, `normal`
    /// style and no mark definitions.
    pub fn text(key: &str, children: Vec<Json>) -> Self {
        Self::new()
            .with(KEY, json!(key))
            .with(TYPE, json!("block"))
            .with(CHILDREN, Json::Array(children))
            .with(MARK_DEFS, json!([]))
            .with(STYLE, json!("normal"))
    }

    /// Builds an opaque block of the given type.
    pub fn object(key: &str, type_name: &str) -> Self {
        Self::new()
            .with(KEY, json!(key))
            .with(TYPE, json!(type_name))
    }

    pub fn with(mut self, field: &str, value: Json) -> Self {
        self.0.insert(field.to_string(), value);
        self
    }

    pub fn without(mut self, field: &str) -> Self {
        self.0.remove(field);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Json> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: &str, value: Json) {
        self.0.insert(field.to_string(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Json> {
        self.0.remove(field)
    }

    pub fn fields(&self) -> &Map<String, Json> {
        &self.0
    }

    pub fn into_json(self) -> Json {
        Json::Object(self.0)
    }

    /// The block key, if present and a non-empty string.
    pub fn key(&self) -> Option<&str> {
        self.0
            .get(KEY)
            .and_then(Json::as_str)
            .filter(|key| !key.is_empty())
    }

    pub fn type_name(&self) -> Option<&str> {
        self.0.get(TYPE).and_then(Json::as_str)
    }

    pub fn children(&self) -> Option<&Vec<Json>> {
        self.0.get(CHILDREN).and_then(Json::as_array)
    }

    pub fn mark_defs(&self) -> Option<&Vec<Json>> {
        self.0.get(MARK_DEFS).and_then(Json::as_array)
    }

    pub fn style(&self) -> Option<&str> {
        self.0.get(STYLE).and_then(Json::as_str)
    }

    pub fn list_item(&self) -> Option<&str> {
        self.0.get(LIST_ITEM).and_then(Json::as_str)
    }

    pub fn level(&self) -> Option<u32> {
        self.0
            .get(LEVEL)
            .and_then(Json::as_u64)
            .and_then(|level| u32::try_from(level).ok())
    }
}

impl From<Map<String, Json>> for Block {
    fn from(map: Map<String, Json>) -> Self {
        Self(map)
    }
}

/// Builds a span child record.
pub fn span(key: &str, text: &str, marks: &[&str]) -> Json {
    json!({
        KEY: key,
        TYPE: "span",
        TEXT: text,
        MARKS: marks,
    })
}

/// Builds an inline object child record.
pub fn inline_object(key: &str, type_name: &str) -> Json {
    json!({
        KEY: key,
        TYPE: type_name,
    })
}

/// Key of a JSON record, if present and a non-empty string.
pub fn json_key(value: &Json) -> Option<&str> {
    value
        .get(KEY)
        .and_then(Json::as_str)
        .filter(|key| !key.is_empty())
}

pub fn json_type(value: &Json) -> Option<&str> {
    value.get(TYPE).and_then(Json::as_str)
}

/// Parses a JSON document into a value, returning `None` for `null`.
pub fn value_from_json(json: Json) -> Result<Option<Value>, serde_json::Error> {
    if json.is_null() {
        return Ok(None);
    }
    serde_json::from_value(json).map(Some)
}

pub fn value_to_json(value: &[Block]) -> Json {
    Json::Array(value.iter().map(|block| Json::Object(block.0.clone())).collect())
}
