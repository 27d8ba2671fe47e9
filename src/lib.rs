//! richtext-sync: synchronization core for block-structured rich text.
//!
//! The crate keeps an externally owned document value (a list of blocks) in
//! step with an internal, editable tree and describes every change as a
//! key-addressed [`Patch`]. It includes:
//!
//! - **Patch model** - set/unset/insert/diffMatchPatch patches over key paths
//! - **Reconciliation** - minimal updates from a new value into the tree,
//!   keeping the selection anchored
//! - **Validation** - schema checks with patch-producing automatic repair
//! - **Sync and batching** - quiescence-aware sync state machine and
//!   debounced mutation batches, driven by an explicit clock
//! - **Lists and selections** - list numbering and translation between key
//!   paths and index ranges
//!
//! # Quick Start
//!
//! ```rust
//! use richtext_sync::{Block, Engine, EngineConfig, Schema, span};
//!
//! let mut engine = Engine::new(Schema::default(), EngineConfig::default());
//! engine.update_value(Some(vec![Block::text("b1", vec![span("s1", "Hi", &[])])]));
//! assert_eq!(engine.value().len(), 1);
//! ```
//!
//! # Features
//!
//! - `cli` - Builds the `richtext-sync` command-line tool (default)

pub mod config;
pub mod editor;
pub mod engine;
pub mod events;
pub mod keys;
pub mod lists;
pub mod model;
pub mod mutation;
pub mod patch;
pub mod schema;
pub mod selection;
pub mod sync;
pub mod validation;

pub use config::EngineConfig;
pub use editor::{Editor, Inline, Node, Operation};
pub use engine::{Engine, EngineError};
pub use events::EditorEvent;
pub use keys::{KeyGenerator, RandomKeys, SequentialKeys};
pub use lists::{ListIndex, build_list_index};
pub use model::{Block, Value, inline_object, span};
pub use mutation::{BatcherState, MutationBatcher};
pub use patch::{InsertPosition, Origin, Patch, PatchError, Path, PathSegment, apply_patches};
pub use schema::{Schema, SchemaError};
pub use selection::{EditorPoint, EditorSelection, Range, RangePoint, to_range, to_selection};
pub use sync::{Reconciler, SyncJob, SyncMachine, SyncState};
pub use validation::{Repair, Resolution, Validation, repair_block, validate_block, validate_value};
