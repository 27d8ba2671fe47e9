//! One reconciliation pass: bring the internal tree in line with an
//! incoming value while touching as little as possible.

use crate::editor::{Editor, Inline, Node, Operation, diff_props};
use crate::events::EditorEvent;
use crate::keys::KeyGenerator;
use crate::model::{Block, Value};
use crate::patch::{Origin, PatchError};
use crate::schema::Schema;
use crate::selection::{Range, clamp_range, start_of_document};
use crate::validation::{Resolution, placeholder_block, repair_block};
use serde_json::Value as Json;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What to do with an incoming block after validation.
enum Admission {
    Admit(Block),
    /// Leave the internal block at this index as it is.
    Keep,
    Abort,
}

#[derive(Debug, Clone, Copy, Default)]
struct Outcome {
    aborted: bool,
}

/// Context of one pass. Build it, then call [`Reconciler::run`].
pub struct Reconciler<'a> {
    pub editor: &'a mut Editor,
    pub schema: &'a Schema,
    pub keys: &'a mut dyn KeyGenerator,
    /// The value processed by the previous pass, if any.
    pub baseline: Option<&'a Value>,
    /// Repairs are applied silently while read-only.
    pub read_only: bool,
}

impl Reconciler<'_> {
    /// Reconciles `value` and returns the events of the pass. The last
    /// event is always [`EditorEvent::DoneSyncing`].
    pub fn run(self, value: Option<&Value>) -> Vec<EditorEvent> {
        let mut pass = Pass {
            reconciler: self,
            events: Vec::new(),
        };
        let version = pass.reconciler.editor.version();
        let had_selection = pass.reconciler.editor.selection().is_some();
        debug!(
            blocks = value.map_or(0, Vec::len),
            "sync: reconciling value"
        );

        let outcome = match value.filter(|blocks| !blocks.is_empty()) {
            None => pass.reset(value),
            Some(blocks) => pass.sync_blocks(blocks, value),
        };

        let changed = pass.reconciler.editor.version() != version;
        if changed {
            if had_selection && pass.reconciler.editor.selection().is_none() {
                pass.select_start();
            }
            if !outcome.aborted {
                pass.events.push(EditorEvent::ValueChanged {
                    value: value.cloned(),
                });
            }
        }
        pass.events.push(EditorEvent::DoneSyncing {
            value: value.cloned(),
        });
        pass.events
    }
}

struct Pass<'a> {
    reconciler: Reconciler<'a>,
    events: Vec<EditorEvent>,
}

impl Pass<'_> {
    fn apply(&mut self, op: Operation) -> Result<(), PatchError> {
        self.reconciler.editor.apply(op).map(drop)
    }

    fn fail(&mut self, err: PatchError, value: Option<&Value>) -> Outcome {
        warn!(%err, "sync: applying value failed");
        self.events.push(EditorEvent::InvalidValue {
            resolution: None,
            value: value.cloned(),
        });
        Outcome { aborted: true }
    }

    fn reset(&mut self, value: Option<&Value>) -> Outcome {
        if self.reconciler.editor.is_placeholder() {
            debug!("sync: already empty");
            return Outcome::default();
        }
        match self.reset_to_placeholder() {
            Ok(()) => Outcome::default(),
            Err(err) => self.fail(err, value),
        }
    }

    fn reset_to_placeholder(&mut self) -> Result<(), PatchError> {
        for index in (0..self.reconciler.editor.len()).rev() {
            self.apply(Operation::RemoveBlock { index })?;
        }
        let block = placeholder_block(self.reconciler.schema, self.reconciler.keys);
        self.apply(Operation::InsertBlock { index: 0, block })
    }

    fn sync_blocks(&mut self, blocks: &[Block], value: Option<&Value>) -> Outcome {
        while self.reconciler.editor.len() > blocks.len() {
            let index = self.reconciler.editor.len() - 1;
            if let Err(err) = self.apply(Operation::RemoveBlock { index }) {
                return self.fail(err, value);
            }
        }

        let mut taken = HashSet::new();
        for (index, incoming) in blocks.iter().enumerate() {
            if self.is_unchanged(index, incoming, &taken) {
                taken.extend(incoming.key().map(str::to_string));
                continue;
            }
            let block = match self.admit(index, incoming, value, &taken) {
                Admission::Admit(block) => block,
                Admission::Keep => {
                    let kept = self.reconciler.editor.node(index).and_then(Node::key);
                    taken.extend(kept.map(str::to_string));
                    continue;
                }
                Admission::Abort => return Outcome { aborted: true },
            };
            taken.extend(block.key().map(str::to_string));

            let same_key = self
                .reconciler
                .editor
                .node(index)
                .map(|node| node.key() == block.key());
            let result = match same_key {
                Some(true) => self.update_in_place(index, &block),
                Some(false) => self.replace(index, block),
                None => self.apply(Operation::InsertBlock { index, block }),
            };
            if let Err(err) = result {
                return self.fail(err, value);
            }
        }
        Outcome::default()
    }

    /// Whether the internal block at `index` already is `incoming`.
    fn is_unchanged(&self, index: usize, incoming: &Block, taken: &HashSet<String>) -> bool {
        let editor = &*self.reconciler.editor;
        match (editor.node(index).and_then(Node::key), incoming.key()) {
            (Some(current), Some(key)) if current == key && !taken.contains(key) => {
                editor.known_block(key) == Some(incoming)
            }
            _ => false,
        }
    }

    fn admit(&mut self, index: usize, incoming: &Block, value: Option<&Value>, taken: &HashSet<String>) -> Admission {
        let schema = self.reconciler.schema;
        let repair = match repair_block(incoming, index, schema, self.reconciler.keys, taken) {
            Ok(repair) => repair,
            Err(resolution) => {
                warn!(index, action = %resolution.action, "sync: block needs manual resolution");
                self.events.push(EditorEvent::InvalidValue {
                    resolution: Some(resolution),
                    value: value.cloned(),
                });
                return Admission::Abort;
            }
        };
        if repair.patches.is_empty() {
            return Admission::Admit(repair.block);
        }
        if self.reconciler.read_only {
            debug!(index, "sync: repairing block silently while read-only");
            return Admission::Admit(repair.block);
        }

        match self.reconciler.baseline {
            None => {
                warn!(index, "sync: first value needs repair");
                self.report_repair(repair.resolutions, value)
            }
            // Seen on the previous pass already; the host has not caught up
            // with the repair patches yet.
            Some(baseline) if value == Some(baseline) => {
                if self.reconciler.editor.node(index).is_some() {
                    debug!(index, "sync: keeping repaired block");
                    Admission::Keep
                } else {
                    warn!(index, "sync: unrepaired value sent again");
                    self.report_repair(repair.resolutions, value)
                }
            }
            Some(_) => {
                warn!(index, patches = repair.patches.len(), "sync: auto-repairing block");
                self.events
                    .extend(repair.patches.into_iter().map(|patch| EditorEvent::Patch {
                        patch,
                        origin: Origin::Local,
                    }));
                Admission::Admit(repair.block)
            }
        }
    }

    fn report_repair(&mut self, resolutions: Vec<Resolution>, value: Option<&Value>) -> Admission {
        self.events.push(EditorEvent::InvalidValue {
            resolution: resolutions.into_iter().next(),
            value: value.cloned(),
        });
        Admission::Abort
    }

    /// Updates the block at `index`, which has the same key as `block`.
    fn update_in_place(&mut self, index: usize, block: &Block) -> Result<(), PatchError> {
        let Some(current) = self.reconciler.editor.node(index).cloned() else {
            return Ok(());
        };
        match (&current, Node::from_block(block, self.reconciler.schema)) {
            (Node::Text(old), Node::Text(new)) => {
                let props = diff_props(&old.props, &new.props);
                if !props.is_empty() {
                    self.apply(Operation::SetBlock { index, props })?;
                }
                self.reconcile_children(index, &old.children, &new.children)
            }
            _ => {
                let props = diff_props(current.to_block().fields(), block.fields());
                if props.is_empty() {
                    return Ok(());
                }
                debug!(index, "sync: rewriting block fields");
                self.apply(Operation::SetBlock { index, props })
            }
        }
    }

    fn reconcile_children(&mut self, block: usize, old: &[Inline], new: &[Inline]) -> Result<(), PatchError> {
        let saved = self.saved_selection(block);

        for index in (new.len()..old.len()).rev() {
            self.apply(Operation::RemoveChild { block, index })?;
        }
        for (index, incoming) in new.iter().enumerate() {
            match old.get(index) {
                Some(existing) if existing == incoming => {}
                Some(existing) if existing.key().is_some() && existing.key() == incoming.key() => {
                    self.update_child(block, index, existing, incoming)?;
                }
                Some(_) => {
                    self.apply(Operation::RemoveChild { block, index })?;
                    self.apply(Operation::InsertChild {
                        block,
                        index,
                        child: incoming.to_json(),
                    })?;
                }
                None => self.apply(Operation::InsertChild {
                    block,
                    index,
                    child: incoming.to_json(),
                })?,
            }
        }

        // Child operations transform the selection themselves; only put it
        // back when they dropped it.
        if self.reconciler.editor.selection().is_some() {
            return Ok(());
        }
        self.restore_selection(saved)
    }

    fn update_child(&mut self, block: usize, index: usize, existing: &Inline, incoming: &Inline) -> Result<(), PatchError> {
        if let (Inline::Span(old), Inline::Span(new)) = (existing, incoming) {
            if old.text != new.text {
                self.reconciler.editor.replace_text(block, index, &new.text)?;
            }
        }
        let current = self
            .reconciler
            .editor
            .node(block)
            .and_then(|node| node.children().get(index))
            .map(Inline::to_json);
        match (current, incoming.to_json()) {
            (Some(Json::Object(old)), Json::Object(new)) => {
                let props = diff_props(&old, &new);
                if props.is_empty() {
                    return Ok(());
                }
                self.apply(Operation::SetChild { block, index, props })
            }
            (_, child) => {
                self.apply(Operation::RemoveChild { block, index })?;
                self.apply(Operation::InsertChild { block, index, child })
            }
        }
    }

    /// Replaces the block at `index` with a block of another key.
    fn replace(&mut self, index: usize, block: Block) -> Result<(), PatchError> {
        debug!(index, key = block.key(), "sync: replacing block");
        let saved = self.saved_selection(index);
        if saved.is_some() {
            self.apply(Operation::SetSelection { selection: None })?;
        }
        self.apply(Operation::RemoveBlock { index })?;
        self.apply(Operation::InsertBlock { index, block })?;
        self.restore_selection(saved)
    }

    fn saved_selection(&self, block: usize) -> Option<Range> {
        self.reconciler
            .editor
            .selection()
            .filter(|range| range.touches_block(block))
            .cloned()
    }

    /// Puts a saved selection back, clamped to what the block holds now.
    fn restore_selection(&mut self, saved: Option<Range>) -> Result<(), PatchError> {
        let Some(range) = saved else {
            return Ok(());
        };
        let selection = clamp_range(&range, self.reconciler.editor.nodes());
        if selection.as_ref() == self.reconciler.editor.selection() {
            return Ok(());
        }
        self.apply(Operation::SetSelection { selection })
    }

    fn select_start(&mut self) {
        let Some(point) = start_of_document(self.reconciler.editor.nodes()) else {
            return;
        };
        debug!("sync: selection lost, moving to start");
        if let Err(err) = self.apply(Operation::SetSelection {
            selection: Some(Range::collapsed(point)),
        }) {
            warn!(%err, "sync: restoring selection failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SequentialKeys;
    use crate::model::span;
    use crate::selection::RangePoint;
    use std::rc::Rc;

    fn run(editor: &mut Editor, baseline: Option<&Value>, value: Option<&Value>) -> Vec<EditorEvent> {
        let schema = Schema::default();
        let mut keys = SequentialKeys::new();
        Reconciler {
            editor,
            schema: &schema,
            keys: &mut keys,
            baseline,
            read_only: false,
        }
        .run(value)
    }

    fn kinds(events: &[EditorEvent]) -> Vec<&'static str> {
        events.iter().map(EditorEvent::kind).collect()
    }

    fn paragraph(key: &str, text: &str) -> Block {
        Block::text(key, vec![span(&format!("{key}1"), text, &[])])
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let mut editor = Editor::new(Rc::new(Schema::default()));
        let value = vec![paragraph("a", "one"), paragraph("b", "two")];
        let events = run(&mut editor, None, Some(&value));
        assert_eq!(kinds(&events), ["valueChanged", "doneSyncing"]);
        assert_eq!(*editor.snapshot(), value);

        let version = editor.version();
        let events = run(&mut editor, Some(&value), Some(&value));
        assert_eq!(kinds(&events), ["doneSyncing"]);
        assert_eq!(editor.version(), version);
    }

    #[test]
    fn test_text_change_keeps_block_in_place() {
        let mut editor = Editor::new(Rc::new(Schema::default()));
        let value = vec![paragraph("a", "Hello")];
        run(&mut editor, None, Some(&value));
        editor
            .apply(Operation::SetSelection {
                selection: Some(Range::collapsed(RangePoint::new(vec![0, 0], 5))),
            })
            .unwrap();
        editor.take_log();

        let next = vec![paragraph("a", "Oh Hello")];
        run(&mut editor, Some(&value), Some(&next));
        assert_eq!(*editor.snapshot(), next);
        assert!(
            !editor
                .take_log()
                .iter()
                .any(|op| matches!(op, Operation::RemoveBlock { .. }))
        );
        assert_eq!(editor.selection().unwrap().anchor.offset, 8);
    }

    #[test]
    fn test_removed_trailing_blocks_and_empty_value() {
        let mut editor = Editor::new(Rc::new(Schema::default()));
        let value = vec![paragraph("a", "one"), paragraph("b", "two")];
        run(&mut editor, None, Some(&value));

        let shorter = vec![paragraph("a", "one")];
        run(&mut editor, Some(&value), Some(&shorter));
        assert_eq!(*editor.snapshot(), shorter);

        let events = run(&mut editor, Some(&shorter), None);
        assert_eq!(kinds(&events), ["valueChanged", "doneSyncing"]);
        assert!(editor.is_placeholder());

        let events = run(&mut editor, Some(&Vec::new()), Some(&Vec::new()));
        assert_eq!(kinds(&events), ["doneSyncing"]);
    }

    #[test]
    fn test_manual_resolution_aborts_pass() {
        let mut editor = Editor::new(Rc::new(Schema::default()));
        let value = vec![paragraph("a", "one"), Block::object("x", "unknown")];
        let events = run(&mut editor, None, Some(&value));
        assert_eq!(kinds(&events), ["invalidValue", "doneSyncing"]);
        // The valid prefix was applied.
        assert_eq!(editor.len(), 1);
    }
}
