use crate::context::RecoveryContext;
use crate::types::{Message, parse_candidate, validate};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

// ===================================================================
// Filter
// ===================================================================

/// Time window (epoch ms, inclusive) and substring search. Messages without
/// a timestamp are never excluded by the time window.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub search: Option<String>,
}

impl MessageFilter {
    pub fn is_empty(&self) -> bool {
        self.since.is_none() && self.until.is_none() && self.search.is_none()
    }

    pub fn matches(&self, msg: &Message) -> bool {
        if let Some(ts) = msg.timestamp {
            if self.since.is_some_and(|s| ts < s) || self.until.is_some_and(|u| ts > u) {
                return false;
            }
        }
        match &self.search {
            Some(needle) => msg.text().to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

// ===================================================================
// Strategies
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    DirectParse,
    ChunkByChunk,
    BalancedBraces,
    RegexExtraction,
}

/// Order matters: least aggressive first.
pub const STRATEGY_ORDER: [Strategy; 4] = [
    Strategy::DirectParse,
    Strategy::ChunkByChunk,
    Strategy::BalancedBraces,
    Strategy::RegexExtraction,
];

#[derive(Debug)]
pub enum StrategyError {
    Malformed(serde_json::Error),
    NotAnArray,
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyError::Malformed(e) => write!(f, "malformed JSON: {e}"),
            StrategyError::NotAnArray => write!(f, "top-level value is not an array"),
        }
    }
}

/// Output of a single strategy run.
#[derive(Debug, Default)]
pub struct Attempt {
    pub messages: Vec<Message>,
    /// Number of elements the source actually held, when the strategy
    /// could see the whole structure.
    pub known_total: Option<usize>,
    /// Bytes of the source taken up by the recovered messages, as written.
    pub source_bytes: usize,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::DirectParse => "direct_parse",
            Self::ChunkByChunk => "chunk_by_chunk",
            Self::BalancedBraces => "balanced_braces",
            Self::RegexExtraction => "regex_extraction",
        }
    }

    pub fn run(self, raw: &str, filter: &MessageFilter) -> Result<Attempt, StrategyError> {
        match self {
            Self::DirectParse => direct_parse(raw, filter),
            Self::ChunkByChunk => Ok(chunk_by_chunk(raw)),
            Self::BalancedBraces => Ok(balanced_braces(raw)),
            Self::RegexExtraction => Ok(regex_extraction(raw)),
        }
    }
}

impl Attempt {
    fn push_candidate(&mut self, candidate: &str) {
        if let Some(msg) = parse_candidate(candidate) {
            self.source_bytes += candidate.len();
            self.messages.push(msg);
        }
    }

    /// The strategy saw the whole file, so its answer stands even when the
    /// filter left nothing.
    fn is_conclusive(&self) -> bool {
        !self.messages.is_empty() || self.known_total.is_some()
    }
}

/// Strategy 1: the file is intact JSON.
fn direct_parse(raw: &str, filter: &MessageFilter) -> Result<Attempt, StrategyError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(StrategyError::Malformed)?;
    let serde_json::Value::Array(items) = value else {
        return Err(StrategyError::NotAnArray);
    };
    let total = items.len();
    let mut excluded = 0;
    let mut messages = Vec::new();
    for msg in items.into_iter().filter_map(validate) {
        if filter.matches(&msg) {
            messages.push(msg);
        } else {
            excluded += 1;
        }
    }
    Ok(Attempt {
        messages,
        known_total: Some(total - excluded),
        source_bytes: 0,
    })
}

static CHUNK_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\[\],]\r?\n").expect("static regex"));

/// Strategy 2: one element per line, split on the array punctuation.
fn chunk_by_chunk(raw: &str) -> Attempt {
    let mut attempt = Attempt::default();
    for chunk in CHUNK_DELIMITER.split(raw) {
        let chunk = chunk
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim()
            .trim_end_matches(',');
        if chunk.starts_with('{') {
            attempt.push_candidate(chunk);
        }
    }
    attempt
}

/// Strategy 3: accumulate lines until the brace count balances.
fn balanced_braces(raw: &str) -> Attempt {
    let mut attempt = Attempt::default();
    let mut buffer = String::new();
    let mut depth: i64 = 0;

    for line in raw.lines() {
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        buffer.push_str(line);
        buffer.push('\n');

        if depth < 0 {
            // Stray closing brace: nothing before it can be salvaged.
            depth = 0;
            buffer.clear();
            continue;
        }
        if depth == 0 {
            let candidate = buffer
                .trim()
                .trim_start_matches([',', '['])
                .trim_end_matches([',', ']'])
                .trim();
            if candidate.starts_with('{') {
                attempt.push_candidate(candidate);
            }
            buffer.clear();
        }
    }
    attempt
}

static OBJECT_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("static regex")
});

/// Strategy 4: any balanced object literal (one level of nesting) anywhere
/// in the bytes.
fn regex_extraction(raw: &str) -> Attempt {
    let mut attempt = Attempt::default();
    for m in OBJECT_LITERAL.find_iter(raw) {
        attempt.push_candidate(m.as_str());
    }
    attempt
}

// ===================================================================
// Chain
// ===================================================================

/// Messages recovered from one file and how they were obtained.
#[derive(Debug, Default)]
pub struct Recovered {
    pub messages: Vec<Message>,
    /// `None` when every strategy came up empty.
    pub strategy: Option<Strategy>,
    pub known_total: Option<usize>,
    pub source_bytes: usize,
}

/// Run every strategy in order over already-loaded text and return the
/// first non-empty result. An intact array ends the chain even when the
/// filter matched nothing.
pub fn run_chain(ctx: &RecoveryContext, raw: &str, filter: &MessageFilter) -> Recovered {
    STRATEGY_ORDER
        .iter()
        .find_map(|&strategy| match strategy.run(raw, filter) {
            Ok(attempt) if attempt.is_conclusive() => {
                ctx.debug(format_args!(
                    "{} recovered {} messages",
                    strategy.name(),
                    attempt.messages.len()
                ));
                Some(Recovered {
                    messages: attempt.messages,
                    strategy: Some(strategy),
                    known_total: attempt.known_total,
                    source_bytes: attempt.source_bytes,
                })
            }
            Ok(_) => {
                ctx.debug(format_args!("{} found no messages", strategy.name()));
                None
            }
            Err(e) => {
                ctx.debug(format_args!("{} failed: {e}", strategy.name()));
                None
            }
        })
        .unwrap_or_else(|| {
            ctx.warn(format_args!("no strategy recovered any messages"));
            Recovered::default()
        })
}

/// Read `path` and run the strategy chain over it.
///
/// A missing file recovers nothing. Any other read error is returned:
/// without the bytes there is nothing to salvage.
pub fn attempt_recovery(
    ctx: &RecoveryContext,
    path: &Path,
    filter: &MessageFilter,
) -> Result<Recovered> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            ctx.warn(format_args!("{} does not exist", path.display()));
            return Ok(Recovered::default());
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let raw = String::from_utf8_lossy(&bytes);
    if !filter.is_empty() {
        ctx.debug(format_args!(
            "filtering messages: since={:?} until={:?} search={:?}",
            filter.since, filter.until, filter.search
        ));
    }
    Ok(run_chain(ctx, &raw, filter))
}

#[cfg(test)]
mod tests;
