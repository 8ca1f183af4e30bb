//! Structured block extraction: recover the record list from free text.
//!
//! Model replies wrap the JSON array in prose, code fences, or both, and
//! sometimes restate the example array from the instruction before giving
//! the real answer. This module:
//!
//! 1. scans the text for every bracketed list-of-objects block (`[` followed
//!    by `{` or `]`, balanced, string-aware),
//! 2. keeps the **longest** closed block by character count, the earliest
//!    one on a tie; a block that never closes is only used when nothing
//!    else closed,
//! 3. parses it as a JSON array whose elements must each be an object.
//!
//! The longest-block rule is what skips an echoed example: the real table is
//! almost always longer. It also means that if a reply genuinely splits rows
//! across two arrays, only the longer one is kept. There is no attempt to
//! guess structure from prose; anything that does not parse is an error the
//! caller records along with the raw text.

use crate::error::BlockError;
use crate::output::Record;
use serde_json::Value;

/// One candidate block found in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    /// Byte offset of the opening `[`.
    pub start: usize,
    pub text: &'a str,
    /// False when the text ended before the block closed.
    pub terminated: bool,
}

impl Block<'_> {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Extract records from a raw model response.
///
/// # Errors
/// * [`BlockError::NoStructuredData`]: no candidate block at all.
/// * [`BlockError::MalformedData`]: the chosen block is not a JSON array of
///   objects.
pub fn extract_records(raw: &str) -> Result<Vec<Record>, BlockError> {
    let blocks = candidate_blocks(raw);
    let (closed, open): (Vec<Block<'_>>, Vec<Block<'_>>) =
        blocks.into_iter().partition(|b| b.terminated);
    let block = select_longest(&closed)
        .or_else(|| select_longest(&open))
        .ok_or(BlockError::NoStructuredData)?;
    parse_block(block)
}

/// Every top-level list-of-objects block, in order of appearance.
///
/// Closed blocks never overlap: arrays nested inside a block belong to it.
/// An unclosed block runs to the end of the text, and scanning resumes just
/// after its opening `[` so later blocks are still found.
pub fn candidate_blocks(raw: &str) -> Vec<Block<'_>> {
    let bytes = raw.as_bytes();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'[' || !opens_object_list(&bytes[i + 1..]) {
            i += 1;
            continue;
        }
        match closing_index(&bytes[i..]) {
            Some(len) => {
                blocks.push(Block {
                    start: i,
                    text: &raw[i..i + len],
                    terminated: true,
                });
                i += len;
            }
            None => {
                blocks.push(Block {
                    start: i,
                    text: &raw[i..],
                    terminated: false,
                });
                i += 1;
            }
        }
    }

    blocks
}

/// The longest block by character count; the first one wins a tie.
pub fn select_longest<'a, 'b>(blocks: &'b [Block<'a>]) -> Option<&'b Block<'a>> {
    let mut best: Option<&Block<'a>> = None;
    for b in blocks {
        if best.map_or(true, |cur| b.char_len() > cur.char_len()) {
            best = Some(b);
        }
    }
    best
}

/// After `[`, skipping whitespace, the next byte is `{` or `]`.
fn opens_object_list(rest: &[u8]) -> bool {
    rest.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{' || *b == b']')
}

/// Length in bytes of the balanced block starting at `bytes[0] == b'['`,
/// ignoring brackets inside JSON strings. `None` if it never closes.
fn closing_index(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (j, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(j + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_block(block: &Block<'_>) -> Result<Vec<Record>, BlockError> {
    let value: Value = serde_json::from_str(block.text).map_err(|e| BlockError::MalformedData {
        detail: if block.terminated {
            e.to_string()
        } else {
            format!("block is never closed ({e})")
        },
    })?;

    let Value::Array(items) = value else {
        return Err(BlockError::MalformedData {
            detail: "block is not an array".into(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(Record::from(map)),
            other => Err(BlockError::MalformedData {
                detail: format!("element {} is {}, expected an object", i, kind_of(&other)),
            }),
        })
        .collect()
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
