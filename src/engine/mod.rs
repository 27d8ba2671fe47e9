//! The editing engine: the single owner of the internal tree.
//!
//! [`Engine`] wires the sync state machine, the reconciler and the mutation
//! batcher around one [`Editor`]. The host drives it with commands and a
//! millisecond clock ([`Engine::tick`]) and reads back [`EditorEvent`]s with
//! [`Engine::drain_events`].
//!
//! # Example
//!
//! ```
//! use richtext_sync::config::EngineConfig;
//! use richtext_sync::engine::Engine;
//! use richtext_sync::model::{Block, span};
//! use richtext_sync::schema::Schema;
//!
//! let mut engine = Engine::new(Schema::default(), EngineConfig::testing());
//! let value = vec![Block::text("b1", vec![span("s1", "Hello", &[])])];
//! engine.update_value(Some(value.clone()));
//!
//! assert_eq!(*engine.value(), value);
//! let kinds: Vec<_> = engine.drain_events().iter().map(|event| event.kind()).collect();
//! assert_eq!(kinds, ["valueChanged", "doneSyncing"]);
//! ```

use crate::config::EngineConfig;
use crate::editor::{Editor, Operation};
use crate::events::EditorEvent;
use crate::keys::{KeyGenerator, RandomKeys};
use crate::lists::{ListIndex, build_list_index};
use crate::model::{Value, value_from_json};
use crate::mutation::MutationBatcher;
use crate::patch::{Origin, Patch, PatchError};
use crate::schema::Schema;
use crate::selection::{EditorSelection, to_selection};
use crate::sync::{Reconciler, SyncJob, SyncMachine, SyncState};
use crate::validation::validate_value;
use serde_json::Value as Json;
use std::rc::Rc;
use tracing::{debug, warn};

mod edits;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("editor is read-only")]
    ReadOnly,
    #[error("no selection")]
    NoSelection,
    #[error("block not found: {0}")]
    BlockNotFound(String),
    #[error("child not found")]
    ChildNotFound,
    #[error("not a text block")]
    NotATextBlock,
    #[error("selection spans more than one block")]
    SelectionSpansBlocks,
    #[error("unknown decorator: {0}")]
    UnknownDecorator(String),
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

pub struct Engine {
    schema: Rc<Schema>,
    editor: Editor,
    keys: Box<dyn KeyGenerator>,
    sync: SyncMachine,
    batcher: MutationBatcher,
    read_only: bool,
    now: u64,
    applying_remote: bool,
    /// Reused while the selection does not change, so hosts can compare by
    /// pointer.
    selection: Option<Rc<EditorSelection>>,
    events: Vec<EditorEvent>,
    sync_operations: Vec<Operation>,
}

impl Engine {
    pub fn new(schema: Schema, config: EngineConfig) -> Self {
        let schema = Rc::new(schema);
        Self {
            editor: Editor::new(Rc::clone(&schema)),
            schema,
            keys: Box::new(RandomKeys),
            sync: SyncMachine::new(config.sync_quiescence),
            batcher: MutationBatcher::new(config.mutation_debounce),
            read_only: config.read_only,
            now: 0,
            applying_remote: false,
            selection: None,
            events: Vec::new(),
            sync_operations: Vec::new(),
        }
    }

    pub fn with_key_generator(mut self, keys: impl KeyGenerator + 'static) -> Self {
        self.keys = Box::new(keys);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    /// The internal tree as a plain value.
    pub fn value(&self) -> Rc<Value> {
        self.editor.snapshot()
    }

    pub fn list_index(&self) -> ListIndex {
        build_list_index(&self.editor.snapshot(), &self.schema)
    }

    pub fn selection(&self) -> Option<Rc<EditorSelection>> {
        self.selection.clone()
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Operations the last sync pass applied to the internal tree.
    pub fn last_sync_operations(&self) -> &[Operation] {
        &self.sync_operations
    }

    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Marks the start of a host-driven normalization pass; mutations are
    /// held back until [`Engine::resume_normalization`].
    pub fn defer_normalization(&mut self) {
        self.editor.begin_normalizing();
    }

    pub fn resume_normalization(&mut self) {
        self.editor.end_normalizing();
    }

    fn edits_in_flight(&self) -> bool {
        self.batcher.has_pending() || self.applying_remote
    }

    /// Offers a new external value. It is reconciled now, or once local
    /// edits have settled.
    pub fn update_value(&mut self, value: Option<Value>) {
        let edits = self.edits_in_flight();
        if let Some(job) = self.sync.update_value(value, self.now, edits) {
            self.run_sync(job);
        }
    }

    /// Like [`Engine::update_value`] for a value that has not been checked
    /// to be a list of records yet.
    pub fn update_value_json(&mut self, json: Json) {
        if let Some(resolution) = validate_value(&json) {
            warn!(action = %resolution.action, "engine: value is not a list of blocks");
            self.events.push(EditorEvent::InvalidValue {
                resolution: Some(resolution),
                value: None,
            });
            return;
        }
        match value_from_json(json) {
            Ok(value) => self.update_value(value),
            Err(err) => {
                warn!(%err, "engine: value could not be read");
                self.events.push(EditorEvent::InvalidValue {
                    resolution: None,
                    value: None,
                });
            }
        }
    }

    /// Advances the clock: flushes a due mutation, then starts a due sync.
    pub fn tick(&mut self, now: u64) {
        self.now = self.now.max(now);
        if let Some(patches) = self.batcher.poll(self.now, self.editor.is_normalizing()) {
            if !patches.is_empty() {
                let snapshot = Value::clone(&self.editor.snapshot());
                self.events.push(EditorEvent::Mutation { patches, snapshot });
            }
        }
        let edits = self.edits_in_flight();
        if let Some(job) = self.sync.poll(self.now, edits) {
            self.run_sync(job);
        }
    }

    fn run_sync(&mut self, mut job: SyncJob) {
        loop {
            self.editor.take_log();
            let events = Reconciler {
                editor: &mut self.editor,
                schema: &self.schema,
                keys: self.keys.as_mut(),
                baseline: self.sync.baseline(),
                read_only: self.read_only,
            }
            .run(job.value.as_ref());
            self.sync_operations = self.editor.take_log();
            self.events.extend(events);
            self.emit_selection();

            let edits = self.edits_in_flight();
            match self.sync.finish(job.value, self.now, edits) {
                Some(next) => job = next,
                None => break,
            }
        }
    }

    pub fn toggle_read_only(&mut self) {
        self.read_only = !self.read_only;
        debug!(read_only = self.read_only, "engine: read-only toggled");
        self.events.push(EditorEvent::ReadOnlyToggled {
            read_only: self.read_only,
        });
    }

    /// Applies patches produced by another session. When one of them does
    /// not fit the internal tree, the tree is reconciled against `snapshot`
    /// instead; without a snapshot the error is returned.
    ///
    /// Patches applied before a failure are kept.
    pub fn apply_remote_patches(&mut self, patches: &[Patch], snapshot: Option<Value>) -> Result<(), EngineError> {
        self.applying_remote = true;
        let mut failure = None;
        for patch in patches {
            if let Err(err) = self.editor.apply_remote(patch) {
                failure = Some(err);
                break;
            }
            self.events.push(EditorEvent::Patch {
                patch: patch.clone(),
                origin: Origin::Remote,
            });
        }
        self.editor.take_log();

        let result = match (failure, snapshot) {
            (None, _) => Ok(()),
            (Some(err), Some(snapshot)) => {
                warn!(%err, "engine: remote patch did not apply, falling back to snapshot");
                let events = Reconciler {
                    editor: &mut self.editor,
                    schema: &self.schema,
                    keys: self.keys.as_mut(),
                    baseline: Some(&snapshot),
                    read_only: true,
                }
                .run(Some(&snapshot));
                self.editor.take_log();
                self.events.extend(events);
                Ok(())
            }
            (Some(err), None) => Err(err.into()),
        };
        self.applying_remote = false;
        self.emit_selection();
        result
    }

    /// Emits a selection event when the key-based selection changed.
    fn emit_selection(&mut self) {
        let current = self
            .editor
            .selection()
            .and_then(|range| to_selection(range, self.editor.nodes()));
        if self.selection.as_deref() == current.as_ref() {
            return;
        }
        self.selection = current.map(Rc::new);
        self.events.push(EditorEvent::Selection {
            selection: self.selection.as_deref().cloned(),
        });
    }

    fn emit_local(&mut self, patches: Vec<Patch>) {
        for patch in patches {
            self.batcher.push(patch.clone(), self.now);
            self.events.push(EditorEvent::Patch {
                patch,
                origin: Origin::Local,
            });
        }
    }

    fn writable(&self) -> Result<(), EngineError> {
        if self.read_only {
            Err(EngineError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SequentialKeys;
    use crate::model::{Block, span};
    use crate::patch::Path;
    use crate::selection::EditorPoint;

    fn engine() -> Engine {
        Engine::new(Schema::default(), EngineConfig::testing()).with_key_generator(SequentialKeys::new())
    }

    fn kinds(events: &[EditorEvent]) -> Vec<&'static str> {
        events.iter().map(EditorEvent::kind).collect()
    }

    fn caret(engine: &mut Engine, block: &str, child: &str, offset: usize) {
        let point = EditorPoint::new(Path::child(block, child), offset);
        engine.select(Some(EditorSelection::collapsed(point))).unwrap();
    }

    #[test]
    fn test_value_waits_for_pending_mutation() {
        let mut engine = engine();
        let value = vec![Block::text("a", vec![span("a1", "Hello", &[])])];
        engine.update_value(Some(value.clone()));
        engine.drain_events();

        caret(&mut engine, "a", "a1", 5);
        engine.insert_text("!").unwrap();
        let next = vec![Block::text("a", vec![span("a1", "Remote", &[])])];
        engine.update_value(Some(next.clone()));
        assert_eq!(engine.sync_state(), SyncState::Busy);
        assert_eq!(engine.value()[0], Block::text("a", vec![span("a1", "Hello!", &[])]));

        engine.tick(10);
        let events = engine.drain_events();
        let kinds = kinds(&events);
        let mutation = kinds.iter().position(|kind| *kind == "mutation").unwrap();
        let changed = kinds.iter().position(|kind| *kind == "valueChanged").unwrap();
        assert!(mutation < changed);
        assert_eq!(engine.sync_state(), SyncState::Idle);
        assert_eq!(*engine.value(), next);
    }

    #[test]
    fn test_read_only_withholds_edits_but_syncs() {
        let mut engine = engine();
        engine.toggle_read_only();
        assert_eq!(kinds(&engine.drain_events()), ["readOnlyToggled"]);
        engine.update_value(Some(vec![Block::text("a", vec![span("a1", "x", &[])])]));
        assert_eq!(engine.value().len(), 1);
        caret(&mut engine, "a", "a1", 1);
        assert_eq!(engine.insert_text("y"), Err(EngineError::ReadOnly));
    }

    #[test]
    fn test_invalid_json_value_is_reported() {
        let mut engine = engine();
        engine.update_value_json(serde_json::json!({"not": "a list"}));
        let events = engine.drain_events();
        assert_eq!(kinds(&events), ["invalidValue"]);
        assert_eq!(engine.sync_state(), SyncState::Idle);
    }
}
