//! Events produced for hosts and remote collaborators.

use crate::model::Value;
use crate::patch::{Origin, Patch};
use crate::selection::EditorSelection;
use crate::validation::Resolution;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorEvent {
    /// One change, emitted as it happens.
    Patch { patch: Patch, origin: Origin },
    /// Local patches coalesced over the debounce window, with the value they
    /// produce.
    Mutation { patches: Vec<Patch>, snapshot: Value },
    /// The value cannot be reconciled without help. `resolution` is `None`
    /// when applying the value failed outright.
    InvalidValue {
        resolution: Option<Resolution>,
        value: Option<Value>,
    },
    /// A sync pass changed the internal tree.
    ValueChanged { value: Option<Value> },
    /// A sync pass finished, successfully or not.
    DoneSyncing { value: Option<Value> },
    Selection { selection: Option<EditorSelection> },
    ReadOnlyToggled {
        #[serde(rename = "readOnly")]
        read_only: bool,
    },
}

impl EditorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EditorEvent::Patch { .. } => "patch",
            EditorEvent::Mutation { .. } => "mutation",
            EditorEvent::InvalidValue { .. } => "invalidValue",
            EditorEvent::ValueChanged { .. } => "valueChanged",
            EditorEvent::DoneSyncing { .. } => "doneSyncing",
            EditorEvent::Selection { .. } => "selection",
            EditorEvent::ReadOnlyToggled { .. } => "readOnlyToggled",
        }
    }
}
