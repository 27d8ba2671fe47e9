mod common;

use common::{engine, paragraph};
use proptest::collection::vec;
use proptest::prelude::*;
use richtext_sync::events::EditorEvent;
use richtext_sync::model::{Block, span};
use richtext_sync::patch::{Origin, Path, apply_patches};
use richtext_sync::selection::{EditorPoint, EditorSelection};

#[derive(Debug, Clone)]
enum Command {
    Select { block: usize, anchor: usize, focus: usize },
    Type(String),
    Delete,
    Toggle(&'static str),
    InsertBlock(usize),
    RemoveBlock(usize),
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        3 => (0..4usize, 0..14usize, 0..14usize)
            .prop_map(|(block, anchor, focus)| Command::Select { block, anchor, focus }),
        3 => "[a-zé ]{1,4}".prop_map(Command::Type),
        1 => Just(Command::Delete),
        2 => prop_oneof![Just("strong"), Just("em")].prop_map(Command::Toggle),
        1 => (0..4usize).prop_map(Command::InsertBlock),
        1 => (0..4usize).prop_map(Command::RemoveBlock),
    ]
}

fn initial() -> Vec<Block> {
    vec![
        Block::text("a", vec![span("a1", "Hello ", &[]), span("a2", "world", &["em"])]),
        Block::object("img", "image"),
        paragraph("b", "second block"),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(proptest_config::cases()))]

    /// Local patches, replayed on the value before the edits, reproduce the
    /// value after them.
    #[test]
    fn prop_local_patches_replay(commands in vec(command_strategy(), 1..25)) {
        let mut engine = engine();
        let before = initial();
        engine.update_value(Some(before.clone()));
        engine.drain_events();

        let mut inserted = 0;
        for command in commands {
            let keys: Vec<String> = engine
                .value()
                .iter()
                .filter_map(|block| block.key().map(str::to_string))
                .collect();
            // Commands may fail, e.g. typing into an image block.
            let _ = match command {
                Command::Select { block, anchor, focus } => match keys.get(block) {
                    Some(key) => engine.select(Some(EditorSelection::new(
                        EditorPoint::new(Path::block(key), anchor),
                        EditorPoint::new(Path::block(key), focus),
                    ))),
                    None => Ok(()),
                },
                Command::Type(text) => engine.insert_text(&text),
                Command::Delete => engine.delete_text(),
                Command::Toggle(mark) => engine.toggle_mark(mark),
                Command::InsertBlock(index) => {
                    inserted += 1;
                    engine.insert_block(index, paragraph(&format!("new{inserted}"), "fresh"))
                }
                Command::RemoveBlock(index) => match keys.get(index) {
                    Some(key) if keys.len() > 1 => engine.remove_block(key),
                    _ => Ok(()),
                },
            };
        }

        let patches: Vec<_> = engine
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                EditorEvent::Patch { patch, origin: Origin::Local } => Some(patch),
                _ => None,
            })
            .collect();
        prop_assert_eq!(apply_patches(&before, &patches).unwrap(), (*engine.value()).clone());
    }
}

#[test]
fn test_toggle_across_spans() {
    let mut engine = engine();
    engine.update_value(Some(initial()));
    engine
        .select(Some(EditorSelection::new(
            EditorPoint::new(Path::child("a", "a1"), 2),
            EditorPoint::new(Path::child("a", "a2"), 3),
        )))
        .unwrap();
    engine.toggle_mark("strong").unwrap();

    let value = engine.value();
    let children = value[0].children().unwrap();
    let texts: Vec<_> = children.iter().map(|child| child["text"].as_str().unwrap()).collect();
    assert_eq!(texts, ["He", "llo ", "wor", "ld"]);
    assert_eq!(children[1]["marks"], serde_json::json!(["strong"]));
    assert_eq!(children[2]["marks"], serde_json::json!(["em", "strong"]));
    assert_eq!(children[3]["marks"], serde_json::json!(["em"]));

    let selection = engine.selection().unwrap();
    assert_eq!(selection.anchor.offset, 0);
    assert_eq!(selection.focus.offset, 3);
}
