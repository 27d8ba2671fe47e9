//! Typed nodes of the internal tree.
//!
//! Conversion from and to [`Block`] is lossless: every field a record carries
//! survives a round trip, including fields this crate does not understand.
//! Records that do not have the shape of a text block or span are kept as
//! opaque objects so that nothing is dropped.

use crate::model::{Block, CHILDREN, KEY, MARKS, TEXT, TYPE, json_key};
use crate::schema::Schema;
use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, PartialEq)]
pub struct SpanNode {
    pub key: String,
    pub type_name: String,
    pub text: String,
    /// `None` when the record carried no `marks` field.
    pub marks: Option<Vec<String>>,
    pub props: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Span(SpanNode),
    /// Inline objects and any child that is not a well-formed span. Holds
    /// the complete record.
    Object(Json),
}

impl Inline {
    pub fn from_json(child: &Json, schema: &Schema) -> Self {
        match child {
            Json::Object(map) => Self::from_map(map.clone(), schema),
            other => Inline::Object(other.clone()),
        }
    }

    fn from_map(mut map: Map<String, Json>, schema: &Schema) -> Self {
        let is_span = json_type_of(&map).is_some_and(|type_name| schema.is_span(type_name))
            && key_of(&map).is_some()
            && map.get(TEXT).is_some_and(Json::is_string)
            && map.get(MARKS).is_none_or(|marks| {
                marks
                    .as_array()
                    .is_some_and(|marks| marks.iter().all(Json::is_string))
            });
        if !is_span {
            return Inline::Object(Json::Object(map));
        }

        let key = take_string(&mut map, KEY);
        let type_name = take_string(&mut map, TYPE);
        let text = take_string(&mut map, TEXT);
        let marks = map.remove(MARKS).map(|marks| {
            marks
                .as_array()
                .map(|marks| {
                    marks
                        .iter()
                        .filter_map(Json::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        });
        Inline::Span(SpanNode {
            key,
            type_name,
            text,
            marks,
            props: map,
        })
    }

    pub fn to_json(&self) -> Json {
        match self {
            Inline::Span(span) => {
                let mut map = span.props.clone();
                map.insert(KEY.to_string(), Json::String(span.key.clone()));
                map.insert(TYPE.to_string(), Json::String(span.type_name.clone()));
                map.insert(TEXT.to_string(), Json::String(span.text.clone()));
                if let Some(marks) = &span.marks {
                    map.insert(
                        MARKS.to_string(),
                        Json::Array(marks.iter().cloned().map(Json::String).collect()),
                    );
                }
                Json::Object(map)
            }
            Inline::Object(value) => value.clone(),
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Inline::Span(span) => Some(&span.key),
            Inline::Object(value) => json_key(value),
        }
    }

    /// Text length in characters; inline objects have none.
    pub fn text_len(&self) -> usize {
        match self {
            Inline::Span(span) => span.text.chars().count(),
            Inline::Object(_) => 0,
        }
    }

    pub fn as_span(&self) -> Option<&SpanNode> {
        match self {
            Inline::Span(span) => Some(span),
            Inline::Object(_) => None,
        }
    }

    pub fn as_span_mut(&mut self) -> Option<&mut SpanNode> {
        match self {
            Inline::Span(span) => Some(span),
            Inline::Object(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub key: String,
    pub type_name: String,
    pub children: Vec<Inline>,
    /// Every other field: `style`, `markDefs`, `listItem`, `level`, ...
    pub props: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    /// Block objects and any block that is not a well-formed text block.
    /// Holds the complete record.
    Object(Map<String, Json>),
}

impl Node {
    pub fn from_block(block: &Block, schema: &Schema) -> Self {
        let mut map = block.fields().clone();
        let is_text = json_type_of(&map).is_some_and(|type_name| schema.is_text_block(type_name))
            && key_of(&map).is_some()
            && map.get(CHILDREN).is_some_and(Json::is_array);
        if !is_text {
            return Node::Object(map);
        }

        let key = take_string(&mut map, KEY);
        let type_name = take_string(&mut map, TYPE);
        let children = match map.remove(CHILDREN) {
            Some(Json::Array(children)) => children
                .iter()
                .map(|child| Inline::from_json(child, schema))
                .collect(),
            _ => Vec::new(),
        };
        Node::Text(TextNode {
            key,
            type_name,
            children,
            props: map,
        })
    }

    pub fn to_block(&self) -> Block {
        match self {
            Node::Text(node) => {
                let mut map = node.props.clone();
                map.insert(KEY.to_string(), Json::String(node.key.clone()));
                map.insert(TYPE.to_string(), Json::String(node.type_name.clone()));
                map.insert(
                    CHILDREN.to_string(),
                    Json::Array(node.children.iter().map(Inline::to_json).collect()),
                );
                Block::from_map(map)
            }
            Node::Object(map) => Block::from_map(map.clone()),
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Node::Text(node) => Some(&node.key),
            Node::Object(map) => key_of(map),
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(node) => Some(node),
            Node::Object(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextNode> {
        match self {
            Node::Text(node) => Some(node),
            Node::Object(_) => None,
        }
    }

    pub fn children(&self) -> &[Inline] {
        match self {
            Node::Text(node) => &node.children,
            Node::Object(_) => &[],
        }
    }
}

fn key_of(map: &Map<String, Json>) -> Option<&str> {
    map.get(KEY)
        .and_then(Json::as_str)
        .filter(|key| !key.is_empty())
}

fn json_type_of(map: &Map<String, Json>) -> Option<&str> {
    map.get(TYPE).and_then(Json::as_str)
}

fn take_string(map: &mut Map<String, Json>, field: &str) -> String {
    match map.remove(field) {
        Some(Json::String(value)) => value,
        _ => String::new(),
    }
}
