//! Selections and their translation to and from index ranges.
//!
//! Hosts see key-based [`EditorSelection`]s. The internal tree works with
//! index-based [`Range`]s. Translation tolerates stale keys by clamping to
//! the nearest valid point instead of failing.

use crate::editor::{Inline, Node, TextNode};
use crate::model::CHILDREN;
use crate::patch::{Path, PathSegment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorPoint {
    pub path: Path,
    pub offset: usize,
}

impl EditorPoint {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSelection {
    pub anchor: EditorPoint,
    pub focus: EditorPoint,
    #[serde(default)]
    pub backward: bool,
}

impl EditorSelection {
    pub fn new(anchor: EditorPoint, focus: EditorPoint) -> Self {
        Self {
            anchor,
            focus,
            backward: false,
        }
    }

    pub fn collapsed(point: EditorPoint) -> Self {
        Self::new(point.clone(), point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A point in the internal tree: `[block]` for block objects, `[block,
/// child]` inside text blocks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RangePoint {
    pub path: Vec<usize>,
    pub offset: usize,
}

impl RangePoint {
    pub fn new(path: Vec<usize>, offset: usize) -> Self {
        Self { path, offset }
    }

    pub fn block(&self) -> usize {
        self.path.first().copied().unwrap_or(0)
    }

    pub fn child(&self) -> Option<usize> {
        self.path.get(1).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Range {
    pub anchor: RangePoint,
    pub focus: RangePoint,
}

impl Range {
    pub fn new(anchor: RangePoint, focus: RangePoint) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: RangePoint) -> Self {
        Self::new(point.clone(), point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self) -> bool {
        self.focus < self.anchor
    }

    pub fn start(&self) -> &RangePoint {
        if self.is_backward() {
            &self.focus
        } else {
            &self.anchor
        }
    }

    pub fn end(&self) -> &RangePoint {
        if self.is_backward() {
            &self.anchor
        } else {
            &self.focus
        }
    }

    pub fn touches_block(&self, block: usize) -> bool {
        self.anchor.block() == block || self.focus.block() == block
    }
}

/// Translates a key-based selection into an index range.
///
/// Points that name a stale child clamp to the start of their block, and
/// offsets past the end of a span clamp to its length. When only one point
/// resolves it is used for both ends; when neither does the result is `None`.
pub fn to_range(selection: &EditorSelection, nodes: &[Node]) -> Option<Range> {
    let anchor = resolve_point(&selection.anchor, nodes);
    let focus = resolve_point(&selection.focus, nodes);
    match (anchor, focus) {
        (Some(anchor), Some(focus)) => Some(Range::new(anchor, focus)),
        (Some(point), None) | (None, Some(point)) => Some(Range::collapsed(point)),
        (None, None) => None,
    }
}

fn resolve_point(point: &EditorPoint, nodes: &[Node]) -> Option<RangePoint> {
    let segments = point.path.segments();
    let block = match segments.first()? {
        PathSegment::Key { key } => nodes.iter().position(|node| node.key() == Some(key.as_str()))?,
        PathSegment::Index(index) => (*index < nodes.len()).then_some(*index)?,
        PathSegment::Field(_) => return None,
    };

    let Some(text) = nodes[block].as_text().filter(|text| !text.children.is_empty()) else {
        return Some(RangePoint::new(vec![block], 0));
    };

    match (segments.get(1), segments.get(2)) {
        (None, _) => Some(resolve_block_offset(block, text, point.offset)),
        (Some(PathSegment::Field(field)), Some(child)) if field == CHILDREN => {
            let index = match child {
                PathSegment::Key { key } => text
                    .children
                    .iter()
                    .position(|inline| inline.key() == Some(key.as_str())),
                PathSegment::Index(index) => (*index < text.children.len()).then_some(*index),
                PathSegment::Field(_) => None,
            };
            Some(match index {
                Some(index) => RangePoint::new(
                    vec![block, index],
                    point.offset.min(text.children[index].text_len()),
                ),
                None => RangePoint::new(vec![block, 0], 0),
            })
        }
        _ => Some(RangePoint::new(vec![block, 0], 0)),
    }
}

/// Resolves an offset given on the block itself to the child whose
/// cumulative text range contains it. A span ending right before an inline
/// object does not claim the boundary; the child after the object does.
fn resolve_block_offset(block: usize, text: &TextNode, offset: usize) -> RangePoint {
    let mut start = 0;
    for (index, child) in text.children.iter().enumerate() {
        let Inline::Span(_) = child else {
            continue;
        };
        let end = start + child.text_len();
        let next_is_object = matches!(text.children.get(index + 1), Some(Inline::Object(_)));
        if offset < end || (offset == end && !next_is_object) {
            return RangePoint::new(vec![block, index], offset - start);
        }
        start = end;
    }
    let last = text.children.len() - 1;
    RangePoint::new(vec![block, last], text.children[last].text_len())
}

/// Translates an index range back into a key-based selection. Offsets are
/// kept as they are. Returns `None` when either point is out of range.
pub fn to_selection(range: &Range, nodes: &[Node]) -> Option<EditorSelection> {
    Some(EditorSelection {
        anchor: point_to_editor(&range.anchor, nodes)?,
        focus: point_to_editor(&range.focus, nodes)?,
        backward: range.is_backward(),
    })
}

fn point_to_editor(point: &RangePoint, nodes: &[Node]) -> Option<EditorPoint> {
    let block_index = *point.path.first()?;
    let node = nodes.get(block_index)?;
    let block = match node.key() {
        Some(key) => PathSegment::key(key),
        None => PathSegment::Index(block_index),
    };
    let mut path = vec![block];
    if let Some(child_index) = point.child() {
        let child = node.children().get(child_index)?;
        path.push(PathSegment::field(CHILDREN));
        path.push(match child.key() {
            Some(key) => PathSegment::key(key),
            None => PathSegment::Index(child_index),
        });
    }
    Some(EditorPoint::new(Path(path), point.offset))
}

/// Moves each point of `range` to the nearest valid point of `nodes`.
pub fn clamp_range(range: &Range, nodes: &[Node]) -> Option<Range> {
    let anchor = clamp_point(&range.anchor, nodes);
    let focus = clamp_point(&range.focus, nodes);
    match (anchor, focus) {
        (Some(anchor), Some(focus)) => Some(Range::new(anchor, focus)),
        (Some(point), None) | (None, Some(point)) => Some(Range::collapsed(point)),
        (None, None) => None,
    }
}

fn clamp_point(point: &RangePoint, nodes: &[Node]) -> Option<RangePoint> {
    let block = *point.path.first()?;
    let node = nodes.get(block)?;
    if node.children().is_empty() {
        return Some(RangePoint::new(vec![block], 0));
    }
    Some(match point.child() {
        Some(child) if child < node.children().len() => RangePoint::new(
            vec![block, child],
            point.offset.min(node.children()[child].text_len()),
        ),
        _ => RangePoint::new(vec![block, 0], 0),
    })
}

/// The first point of the document, if it has any blocks.
pub fn start_of_document(nodes: &[Node]) -> Option<RangePoint> {
    let node = nodes.first()?;
    Some(if node.children().is_empty() {
        RangePoint::new(vec![0], 0)
    } else {
        RangePoint::new(vec![0, 0], 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, inline_object, span};
    use crate::schema::Schema;

    fn nodes() -> Vec<Node> {
        let schema = Schema::default();
        [
            Block::text("a", vec![span("a1", "Hello", &[]), span("a2", " world", &["em"])]),
            Block::object("img", "image"),
            Block::text(
                "b",
                vec![
                    span("b1", "abc", &[]),
                    inline_object("b2", "stock-ticker"),
                    span("b3", "de", &[]),
                ],
            ),
        ]
        .iter()
        .map(|block| Node::from_block(block, &schema))
        .collect()
    }

    fn child_point(block: &str, child: &str, offset: usize) -> EditorPoint {
        EditorPoint::new(Path::child(block, child), offset)
    }

    #[test]
    fn test_resolves_keys_to_indices() {
        let selection = EditorSelection::new(child_point("a", "a2", 2), child_point("b", "b3", 1));
        let range = to_range(&selection, &nodes()).unwrap();
        assert_eq!(range.anchor, RangePoint::new(vec![0, 1], 2));
        assert_eq!(range.focus, RangePoint::new(vec![2, 2], 1));
        assert!(!range.is_backward());
    }

    #[test]
    fn test_block_object_point() {
        let point = EditorPoint::new(Path::block("img"), 0);
        let range = to_range(&EditorSelection::collapsed(point), &nodes()).unwrap();
        assert_eq!(range.anchor, RangePoint::new(vec![1], 0));
    }

    #[test]
    fn test_stale_child_and_offset_clamp() {
        let selection =
            EditorSelection::new(child_point("a", "gone", 4), child_point("a", "a1", 99));
        let range = to_range(&selection, &nodes()).unwrap();
        assert_eq!(range.anchor, RangePoint::new(vec![0, 0], 0));
        assert_eq!(range.focus, RangePoint::new(vec![0, 0], 5));
    }

    #[test]
    fn test_one_unresolved_point_collapses() {
        let selection = EditorSelection::new(child_point("zz", "z", 1), child_point("b", "b1", 2));
        let range = to_range(&selection, &nodes()).unwrap();
        assert!(range.is_collapsed());
        assert_eq!(range.anchor, RangePoint::new(vec![2, 0], 2));
    }

    #[test]
    fn test_nothing_resolves() {
        let selection = EditorSelection::new(child_point("x", "y", 0), child_point("z", "w", 0));
        assert_eq!(to_range(&selection, &nodes()), None);
    }

    #[test]
    fn test_legacy_block_offsets() {
        let nodes = nodes();
        let at = |offset| {
            to_range(
                &EditorSelection::collapsed(EditorPoint::new(Path::block("b"), offset)),
                &nodes,
            )
            .unwrap()
            .anchor
        };
        assert_eq!(at(1), RangePoint::new(vec![2, 0], 1));
        // The boundary before the inline object belongs to the span after it.
        assert_eq!(at(3), RangePoint::new(vec![2, 2], 0));
        assert_eq!(at(5), RangePoint::new(vec![2, 2], 2));
        assert_eq!(at(40), RangePoint::new(vec![2, 2], 2));

        let plain = to_range(
            &EditorSelection::collapsed(EditorPoint::new(Path::block("a"), 5)),
            &nodes,
        )
        .unwrap();
        assert_eq!(plain.anchor, RangePoint::new(vec![0, 0], 5));
    }

    #[test]
    fn test_range_back_to_selection() {
        let range = Range::new(RangePoint::new(vec![2, 2], 1), RangePoint::new(vec![0, 0], 3));
        let selection = to_selection(&range, &nodes()).unwrap();
        assert_eq!(selection.anchor, child_point("b", "b3", 1));
        assert_eq!(selection.focus, child_point("a", "a1", 3));
        assert!(selection.backward);
        assert_eq!(
            to_selection(&Range::collapsed(RangePoint::new(vec![7, 0], 0)), &nodes()),
            None
        );
    }

    #[test]
    fn test_clamp_range() {
        let range = Range::new(RangePoint::new(vec![0, 1], 50), RangePoint::new(vec![9], 0));
        let clamped = clamp_range(&range, &nodes()).unwrap();
        assert_eq!(clamped, Range::collapsed(RangePoint::new(vec![0, 1], 6)));
        assert_eq!(
            start_of_document(&nodes()),
            Some(RangePoint::new(vec![0, 0], 0))
        );
    }
}
