//! Include/exclude pattern matching
//!
//! Patterns are split on the recursive wildcard `**/` into chunks. The first
//! chunk is anchored to the start of the path, the last to its end, and
//! every chunk after the first must begin on a segment boundary. Inside a
//! chunk, `*` matches any run of characters except `/`.
//!
//! Matching is a single left-to-right scan: each chunk is located at the
//! first boundary at or after the end of the previous chunk's match, and a
//! chunk that has been placed is never moved again. Pieces inside a chunk
//! are placed the same way, so matching time stays linear in the number of
//! pieces for every candidate position. This is not a general
//! glob engine. Some degenerate patterns that a backtracking matcher would
//! accept are rejected here.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    /// `*`: any characters within one segment
    Star,
}

/// A compiled include/exclude pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    chunks: Vec<Vec<Piece>>,
}

impl Pattern {
    /// Compile a user-facing pattern
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::GlobCompile {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut body = pattern;
        while let Some(rest) = body.strip_prefix("./") {
            body = rest;
        }
        if body.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if body.starts_with('/') {
            return Err(invalid("pattern must be relative"));
        }
        if body.split('/').any(|segment| segment == "..") {
            return Err(invalid("pattern cannot leave the project root"));
        }

        // A trailing `**` means "everything below".
        let mut body = body.to_string();
        if body == "**" || body.ends_with("/**") {
            body.push_str("/*");
        }

        let chunks = split_recursive(&body)
            .into_iter()
            .map(parse_chunk)
            .collect();

        Ok(Self {
            source: pattern.to_string(),
            chunks,
        })
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether a slash-separated relative path matches
    pub fn matches(&self, path: &str) -> bool {
        let last = self.chunks.len() - 1;
        let mut cursor = 0;

        for (i, chunk) in self.chunks.iter().enumerate() {
            let to_end = i == last;
            let found = if i == 0 {
                match_here(chunk, path, 0, to_end)
            } else {
                boundaries(path, cursor).find_map(|start| match_here(chunk, path, start, to_end))
            };
            match found {
                Some(end) => cursor = end,
                None => return false,
            }
        }

        true
    }
}

/// Split on `**/` tokens that start a segment
fn split_recursive(pattern: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut search = 0;

    while let Some(offset) = pattern[search..].find("**/") {
        let at = search + offset;
        if at == 0 || pattern.as_bytes()[at - 1] == b'/' {
            chunks.push(&pattern[chunk_start..at]);
            chunk_start = at + 3;
        }
        search = at + 3;
    }
    chunks.push(&pattern[chunk_start..]);
    chunks
}

fn parse_chunk(chunk: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut literal = String::new();

    for ch in chunk.chars() {
        if ch == '*' {
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            if pieces.last() != Some(&Piece::Star) {
                pieces.push(Piece::Star);
            }
        } else {
            literal.push(ch);
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    pieces
}

/// Positions at or after `from` where a path segment begins
fn boundaries(path: &str, from: usize) -> impl Iterator<Item = usize> + '_ {
    (from..=path.len()).filter(move |&pos| {
        pos == 0 || (path.is_char_boundary(pos) && path.as_bytes()[pos - 1] == b'/')
    })
}

/// Match `pieces` starting exactly at `pos` and return where the match ends.
/// With `to_end`, the match must consume the rest of `text`.
///
/// Each piece is placed once, left to right. A `*` followed by a literal
/// stretches to the first occurrence of that literal, or to the suffix when
/// the literal closes a chunk anchored at the end. A trailing `*` runs to
/// the end of its segment.
fn match_here(pieces: &[Piece], text: &str, mut pos: usize, to_end: bool) -> Option<usize> {
    let mut after_star = false;
    for (i, piece) in pieces.iter().enumerate() {
        let lit = match piece {
            Piece::Star => {
                after_star = true;
                continue;
            }
            Piece::Literal(lit) => lit.as_str(),
        };

        let start = if !after_star {
            text[pos..].starts_with(lit).then_some(pos)?
        } else if to_end && i + 1 == pieces.len() {
            let start = text.len().checked_sub(lit.len())?;
            (start >= pos && text.ends_with(lit)).then_some(start)?
        } else {
            pos + text[pos..].find(lit)?
        };
        if after_star && text[pos..start].contains('/') {
            return None;
        }
        pos = start + lit.len();
        after_star = false;
    }

    if after_star {
        pos = text[pos..].find('/').map_or(text.len(), |i| pos + i);
    }
    (!to_end || pos == text.len()).then_some(pos)
}

/// Compiled include and exclude lists. Exclusion always wins.
#[derive(Debug, Clone, Default)]
pub struct SelectionRules {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl SelectionRules {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include.iter().map(|p| Pattern::compile(p)).collect::<Result<_>>()?,
            exclude: exclude.iter().map(|p| Pattern::compile(p)).collect::<Result<_>>()?,
        })
    }

    /// A path is selected when no include pattern is configured or one of
    /// them matches, and no exclude pattern matches.
    pub fn selects(&self, path: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(path));
        included && !self.exclude.iter().any(|p| p.matches(path))
    }
}
