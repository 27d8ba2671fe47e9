//! Read-only schema view.
//!
//! The schema is compiled elsewhere; this crate only consumes its shape:
//! the text block and span type names plus the permitted styles, list
//! items, decorators, annotations, block objects and inline objects.

use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;

pub const DEFAULT_STYLE: &str = "normal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeName {
    pub name: String,
}

impl TypeName {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// A named option (style, list item or decorator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl NamedType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            title: None,
            default: false,
        }
    }

    pub fn default_option(name: &str) -> Self {
        Self {
            default: true,
            ..Self::new(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// An annotation, block object or inline object type with its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ObjectType {
    pub fn new(name: &str, fields: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(name, type_name)| FieldDef {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub block: TypeName,
    pub span: TypeName,
    #[serde(default)]
    pub styles: Vec<NamedType>,
    #[serde(default)]
    pub lists: Vec<NamedType>,
    #[serde(default)]
    pub decorators: Vec<NamedType>,
    #[serde(default)]
    pub annotations: Vec<ObjectType>,
    #[serde(default)]
    pub block_objects: Vec<ObjectType>,
    #[serde(default)]
    pub inline_objects: Vec<ObjectType>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Schema {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &FsPath) -> Result<Self, SchemaError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn block_type(&self) -> &str {
        &self.block.name
    }

    pub fn span_type(&self) -> &str {
        &self.span.name
    }

    pub fn is_text_block(&self, type_name: &str) -> bool {
        type_name == self.block.name
    }

    pub fn is_span(&self, type_name: &str) -> bool {
        type_name == self.span.name
    }

    pub fn is_block_object(&self, type_name: &str) -> bool {
        self.block_objects.iter().any(|object| object.name == type_name)
    }

    pub fn is_inline_object(&self, type_name: &str) -> bool {
        self.inline_objects.iter().any(|object| object.name == type_name)
    }

    /// Whether blocks of this type may appear at the top level.
    pub fn is_block_type(&self, type_name: &str) -> bool {
        self.is_text_block(type_name) || self.is_block_object(type_name)
    }

    pub fn is_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|decorator| decorator.name == name)
    }

    pub fn is_annotation(&self, type_name: &str) -> bool {
        self.annotations.iter().any(|annotation| annotation.name == type_name)
    }

    pub fn is_list_item(&self, name: &str) -> bool {
        self.lists.iter().any(|list| list.name == name)
    }

    pub fn is_style(&self, name: &str) -> bool {
        self.styles.iter().any(|style| style.name == name)
    }

    /// The style flagged as default, else `normal` when declared, else the
    /// first declared style, else `normal`.
    pub fn default_style(&self) -> &str {
        self.styles
            .iter()
            .find(|style| style.default)
            .or_else(|| self.styles.iter().find(|style| style.name == DEFAULT_STYLE))
            .or_else(|| self.styles.first())
            .map(|style| style.name.as_str())
            .unwrap_or(DEFAULT_STYLE)
    }

    /// The effective style of a block: recognized styles pass through,
    /// anything else falls back to the default.
    pub fn resolve_style<'a>(&'a self, style: Option<&'a str>) -> &'a str {
        match style {
            Some(style) if self.is_style(style) => style,
            _ => self.default_style(),
        }
    }

    /// The effective list item: unrecognized names are treated as absent.
    pub fn resolve_list_item<'a>(&self, list_item: Option<&'a str>) -> Option<&'a str> {
        list_item.filter(|name| self.is_list_item(name))
    }
}

impl Default for Schema {
    /// The conventional rich text schema.
    fn default() -> Self {
        Self {
            block: TypeName::new("block"),
            span: TypeName::new("span"),
            styles: vec![
                NamedType::default_option("normal"),
                NamedType::new("h1"),
                NamedType::new("h2"),
                NamedType::new("h3"),
                NamedType::new("blockquote"),
            ],
            lists: vec![NamedType::new("bullet"), NamedType::new("number")],
            decorators: vec![
                NamedType::new("strong"),
                NamedType::new("em"),
                NamedType::new("code"),
                NamedType::new("underline"),
                NamedType::new("strike-through"),
            ],
            annotations: vec![
                ObjectType::new("link", &[("href", "url")]),
                ObjectType::new("comment", &[("text", "string")]),
            ],
            block_objects: vec![ObjectType::new("image", &[("url", "url"), ("alt", "string")])],
            inline_objects: vec![ObjectType::new("stock-ticker", &[("symbol", "string")])],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_lookups() {
        let schema = Schema::default();
        assert!(schema.is_text_block("block"));
        assert!(schema.is_block_type("image"));
        assert!(!schema.is_block_type("stock-ticker"));
        assert!(schema.is_inline_object("stock-ticker"));
        assert!(schema.is_decorator("strong"));
        assert!(!schema.is_decorator("ghost"));
        assert!(schema.is_annotation("link"));
        assert!(schema.is_list_item("number"));
        assert_eq!(schema.default_style(), "normal");
    }

    #[test]
    fn test_style_and_list_resolution() {
        let schema = Schema::default();
        assert_eq!(schema.resolve_style(Some("h1")), "h1");
        assert_eq!(schema.resolve_style(Some("h9")), "normal");
        assert_eq!(schema.resolve_style(None), "normal");
        assert_eq!(schema.resolve_list_item(Some("bullet")), Some("bullet"));
        assert_eq!(schema.resolve_list_item(Some("roman")), None);
    }

    #[test]
    fn test_schema_from_json_with_defaults() {
        let schema = Schema::from_json(
            r#"{
                "block": {"name": "paragraph"},
                "span": {"name": "run"},
                "styles": [{"name": "body"}, {"name": "title", "default": true}],
                "blockObjects": [{"name": "video", "fields": [{"name": "src", "type": "url"}]}]
            }"#,
        )
        .unwrap();
        assert_eq!(schema.block_type(), "paragraph");
        assert_eq!(schema.span_type(), "run");
        assert_eq!(schema.default_style(), "title");
        assert!(schema.is_block_object("video"));
        assert!(schema.decorators.is_empty());
    }

    #[test]
    fn test_default_style_without_declared_styles() {
        let schema = Schema {
            styles: Vec::new(),
            ..Schema::default()
        };
        assert_eq!(schema.default_style(), DEFAULT_STYLE);
    }

    #[test]
    fn test_invalid_schema_json() {
        assert!(matches!(
            Schema::from_json("{\"block\": 3}"),
            Err(SchemaError::Json(_))
        ));
    }
}
