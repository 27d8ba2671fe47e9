#![allow(dead_code)]

use proptest::collection::vec;
use proptest::prelude::*;
use richtext_sync::events::EditorEvent;
use richtext_sync::keys::SequentialKeys;
use richtext_sync::model::{Block, LEVEL, LIST_ITEM, STYLE, Value, span};
use richtext_sync::{Engine, EngineConfig, Schema};
use serde_json::json;

pub fn engine() -> Engine {
    Engine::new(Schema::default(), EngineConfig::testing()).with_key_generator(SequentialKeys::with_prefix("gen"))
}

pub fn kinds(events: &[EditorEvent]) -> Vec<&'static str> {
    events.iter().map(EditorEvent::kind).collect()
}

pub fn paragraph(key: &str, text: &str) -> Block {
    Block::text(key, vec![span(&format!("{key}-s0"), text, &[])])
}

fn span_strategy() -> impl Strategy<Value = (String, Vec<&'static str>)> {
    (
        "[a-z ]{0,8}",
        proptest::sample::subsequence(vec!["strong", "em", "code"], 0..=2),
    )
}

fn block_strategy() -> impl Strategy<Value = Option<(Vec<(String, Vec<&'static str>)>, &'static str, Option<(&'static str, u32)>)>> {
    prop_oneof![
        1 => Just(None),
        4 => (
            vec(span_strategy(), 1..4),
            prop_oneof![Just("normal"), Just("h1"), Just("blockquote")],
            proptest::option::of((prop_oneof![Just("bullet"), Just("number")], 1..4u32)),
        )
            .prop_map(Some),
    ]
}

/// Valid values with unique keys drawn from a small pool, so that
/// consecutive values share some keys and differ in others.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    vec((0..6usize, block_strategy()), 1..6).prop_map(|blocks| {
        let mut used = std::collections::HashSet::new();
        blocks
            .into_iter()
            .filter(|(key, _)| used.insert(*key))
            .map(|(key, shape)| {
                let key = format!("b{key}");
                match shape {
                    None => Block::object(&key, "image"),
                    Some((spans, style, list)) => {
                        let children = spans
                            .iter()
                            .enumerate()
                            .map(|(index, (text, marks))| span(&format!("{key}-s{index}"), text, marks))
                            .collect();
                        let mut block = Block::text(&key, children).with(STYLE, json!(style));
                        if let Some((list, level)) = list {
                            block = block.with(LIST_ITEM, json!(list)).with(LEVEL, json!(level));
                        }
                        block
                    }
                }
            })
            .collect()
    })
}
