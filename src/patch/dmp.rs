//! diff-match-patch patch text.
//!
//! Text changes travel as the patch text format of the diff-match-patch
//! family: one or more `@@ -a,b +c,d @@` hunks with context, `-` and `+`
//! lines, each line percent-encoded like `encodeURI`. Offsets count Unicode
//! scalar values.

use super::PatchError;
use dissimilar::Chunk;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Context characters kept around each change.
const MARGIN: usize = 4;

/// Characters escaped in hunk lines; everything `encodeURI` escapes except
/// the space, which the format keeps literal.
const LINE_ESCAPE: &AsciiSet = &CONTROLS
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Hunk {
    start1: usize,
    start2: usize,
    length1: usize,
    length2: usize,
    diffs: Vec<(Op, String)>,
}

impl Hunk {
    fn push(&mut self, op: Op, text: String) {
        let len = text.chars().count();
        if op != Op::Insert {
            self.length1 += len;
        }
        if op != Op::Delete {
            self.length2 += len;
        }
        self.diffs.push((op, text));
    }

    fn header_coords(start: usize, length: usize) -> String {
        match length {
            0 => format!("{start},0"),
            1 => format!("{}", start + 1),
            _ => format!("{},{}", start + 1, length),
        }
    }

    fn to_text(&self) -> String {
        let mut out = format!(
            "@@ -{} +{} @@\n",
            Self::header_coords(self.start1, self.length1),
            Self::header_coords(self.start2, self.length2)
        );
        for (op, text) in &self.diffs {
            out.push(match op {
                Op::Equal => ' ',
                Op::Delete => '-',
                Op::Insert => '+',
            });
            out.extend(utf8_percent_encode(text, LINE_ESCAPE));
            out.push('\n');
        }
        out
    }

    fn source_text(&self) -> Vec<char> {
        self.diffs
            .iter()
            .filter(|(op, _)| *op != Op::Insert)
            .flat_map(|(_, text)| text.chars())
            .collect()
    }

    fn target_text(&self) -> Vec<char> {
        self.diffs
            .iter()
            .filter(|(op, _)| *op != Op::Delete)
            .flat_map(|(_, text)| text.chars())
            .collect()
    }
}

/// Produces the patch text turning `old` into `new`. Identical inputs give
/// an empty string.
pub fn make_patch(old: &str, new: &str) -> String {
    let diffs: Vec<(Op, String)> = dissimilar::diff(old, new)
        .into_iter()
        .map(|chunk| match chunk {
            Chunk::Equal(text) => (Op::Equal, text.to_string()),
            Chunk::Delete(text) => (Op::Delete, text.to_string()),
            Chunk::Insert(text) => (Op::Insert, text.to_string()),
        })
        .collect();

    build_hunks(&diffs).iter().map(Hunk::to_text).collect()
}

fn build_hunks(diffs: &[(Op, String)]) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut hunk = Hunk::default();
    let mut char1 = 0;
    let mut char2 = 0;

    for (index, (op, text)) in diffs.iter().enumerate() {
        let len = text.chars().count();

        if hunk.diffs.is_empty() && *op != Op::Equal {
            let context = match index.checked_sub(1).map(|prev| &diffs[prev]) {
                Some((Op::Equal, prev)) => tail_chars(prev, MARGIN),
                _ => String::new(),
            };
            let context_len = context.chars().count();
            hunk.start1 = char1 - context_len;
            hunk.start2 = char2 - context_len;
            if context_len > 0 {
                hunk.push(Op::Equal, context);
            }
        }

        match op {
            Op::Insert | Op::Delete => hunk.push(*op, text.clone()),
            Op::Equal if !hunk.diffs.is_empty() => {
                let is_last = index + 1 == diffs.len();
                if len <= 2 * MARGIN && !is_last {
                    hunk.push(Op::Equal, text.clone());
                } else {
                    hunk.push(Op::Equal, head_chars(text, MARGIN));
                    hunks.push(std::mem::take(&mut hunk));
                }
            }
            Op::Equal => {}
        }

        if *op != Op::Insert {
            char1 += len;
        }
        if *op != Op::Delete {
            char2 += len;
        }
    }

    if !hunk.diffs.is_empty() {
        hunks.push(hunk);
    }
    hunks
}

fn head_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}

fn tail_chars(text: &str, count: usize) -> String {
    let len = text.chars().count();
    text.chars().skip(len.saturating_sub(count)).collect()
}

fn parse_coords(coords: &str) -> Result<(usize, usize), PatchError> {
    let malformed = || PatchError::MalformedDiff(coords.to_string());
    let (start, length) = match coords.split_once(',') {
        Some((start, length)) => (
            start.parse::<usize>().map_err(|_| malformed())?,
            Some(length.parse::<usize>().map_err(|_| malformed())?),
        ),
        None => (coords.parse::<usize>().map_err(|_| malformed())?, None),
    };
    match length {
        None => Ok((start.checked_sub(1).ok_or_else(malformed)?, 1)),
        Some(0) => Ok((start, 0)),
        Some(length) => Ok((start.checked_sub(1).ok_or_else(malformed)?, length)),
    }
}

fn parse_header(line: &str) -> Result<Hunk, PatchError> {
    let malformed = || PatchError::MalformedDiff(line.to_string());
    let inner = line
        .strip_prefix("@@ -")
        .and_then(|rest| rest.strip_suffix(" @@"))
        .ok_or_else(malformed)?;
    let (left, right) = inner.split_once(" +").ok_or_else(malformed)?;
    let (start1, length1) = parse_coords(left)?;
    let (start2, length2) = parse_coords(right)?;
    Ok(Hunk {
        start1,
        start2,
        length1,
        length2,
        diffs: Vec::new(),
    })
}

fn parse_patch(text: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        if line.starts_with("@@") {
            hunks.push(parse_header(line)?);
            continue;
        }
        let Some(hunk) = hunks.last_mut() else {
            return Err(PatchError::MalformedDiff(line.to_string()));
        };
        let mut chars = line.chars();
        let op = match chars.next() {
            Some(' ') => Op::Equal,
            Some('-') => Op::Delete,
            Some('+') => Op::Insert,
            _ => return Err(PatchError::MalformedDiff(line.to_string())),
        };
        let decoded = percent_decode_str(chars.as_str())
            .decode_utf8()
            .map_err(|_| PatchError::MalformedDiff(line.to_string()))?;
        hunk.diffs.push((op, decoded.into_owned()));
    }
    Ok(hunks)
}

fn matches_at(text: &[char], expected: &[char], at: usize) -> bool {
    at + expected.len() <= text.len() && text[at..at + expected.len()] == *expected
}

fn find_nearest(text: &[char], expected: &[char], near: usize) -> Option<usize> {
    if expected.len() > text.len() {
        return None;
    }
    (0..=text.len() - expected.len())
        .filter(|&at| matches_at(text, expected, at))
        .min_by_key(|&at| at.abs_diff(near))
}

/// Applies patch text to `text`. Hunks are located at their recorded
/// position first, then at the nearest exact occurrence of their context.
pub fn apply_patch(text: &str, patch: &str) -> Result<String, PatchError> {
    let hunks = parse_patch(patch)?;
    let mut chars: Vec<char> = text.chars().collect();
    let mut delta: isize = 0;

    for hunk in hunks {
        let expected = hunk.source_text();
        let replacement = hunk.target_text();
        let location = (hunk.start1 as isize + delta).max(0) as usize;
        let at = if matches_at(&chars, &expected, location) {
            location
        } else {
            find_nearest(&chars, &expected, location).ok_or(PatchError::DiffMismatch)?
        };
        delta += replacement.len() as isize - expected.len() as isize;
        chars.splice(at..at + expected.len(), replacement);
    }

    Ok(chars.into_iter().collect())
}
