use crate::analysis::{CODE_BLOCK_RE, file_mentions};
use crate::types::Message;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Characters of surrounding prose kept before each code block.
const CONTEXT_CHARS: usize = 100;
/// Characters of code hashed when nothing better identifies a snippet.
const HASH_PREFIX_CHARS: usize = 100;
/// Single snippets shorter than this are dropped unless tied to a path.
const TRIVIAL_SNIPPET_LEN: usize = 50;

static NAMED_DEFINITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(function|class)\s+([A-Za-z_$][\w$]*)").expect("static regex"));

static FUNCTION_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:function|def|fn|func)\s+[A-Za-z_$][\w$]*").expect("static regex")
});

static CLASS_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:class|struct|interface)\s+[A-Za-z_$][\w$]*").expect("static regex")
});

// ===================================================================
// Snippets
// ===================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeSnippet {
    pub language: String,
    pub code: String,
    /// Up to 100 characters of prose immediately before the block.
    pub context: String,
    pub message_index: usize,
}

/// Every fenced block in every message, in conversation order.
pub fn extract_code_snippets(messages: &[Message]) -> Vec<CodeSnippet> {
    let mut out = Vec::new();
    for (index, msg) in messages.iter().enumerate() {
        let text = msg.text();
        for caps in CODE_BLOCK_RE.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            let before = &text[..whole.start()];
            out.push(CodeSnippet {
                language: caps.get(1).map_or("", |m| m.as_str()).to_string(),
                code: caps.get(2).map_or("", |m| m.as_str()).to_string(),
                context: tail_chars(before.trim_end(), CONTEXT_CHARS).trim_start().to_string(),
                message_index: index,
            });
        }
    }
    out
}

fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

// ===================================================================
// Grouping
// ===================================================================

/// What a group of snippets is believed to be versions of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SnippetKey {
    Path(String),
    Function(String),
    Class(String),
    Hash(String),
}

impl SnippetKey {
    /// Path mentioned in the context, then a named function/class, then a
    /// hash of the code's first 100 characters.
    pub fn for_snippet(snippet: &CodeSnippet) -> Self {
        if let Some(path) = file_mentions(&snippet.context).into_iter().next() {
            return Self::Path(path.to_string());
        }
        if let Some(caps) = NAMED_DEFINITION_RE.captures(&snippet.context) {
            let name = caps[2].to_string();
            return match &caps[1] {
                "class" => Self::Class(name),
                _ => Self::Function(name),
            };
        }
        let prefix: String = snippet.code.chars().take(HASH_PREFIX_CHARS).collect();
        let digest = Sha256::digest(prefix.as_bytes());
        Self::Hash(format!("{digest:x}")[..12].to_string())
    }

    pub fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }
}

impl std::fmt::Display for SnippetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{p}"),
            Self::Function(n) => write!(f, "function:{n}"),
            Self::Class(n) => write!(f, "class:{n}"),
            Self::Hash(h) => write!(f, "snippet:{h}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeEvolution {
    pub key: String,
    pub language: String,
    pub iterations: usize,
    pub first_message_index: usize,
    pub last_message_index: usize,
    pub description: String,
    pub latest_code: String,
}

/// Group snippets by identity and narrate how each group changed.
/// Groups appear in order of their first snippet.
pub fn extract_code_evolution(messages: &[Message]) -> Vec<CodeEvolution> {
    group_snippets(extract_code_snippets(messages))
        .into_iter()
        .filter_map(|(key, snippets)| describe_group(&key, snippets))
        .collect()
}

fn group_snippets(snippets: Vec<CodeSnippet>) -> Vec<(SnippetKey, Vec<CodeSnippet>)> {
    let mut groups: Vec<(SnippetKey, Vec<CodeSnippet>)> = Vec::new();
    let mut index: HashMap<SnippetKey, usize> = HashMap::new();
    for snippet in snippets {
        let key = SnippetKey::for_snippet(&snippet);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(snippet),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![snippet]));
            }
        }
    }
    for (_, members) in &mut groups {
        members.sort_by_key(|s| s.message_index);
    }
    groups
}

fn describe_group(key: &SnippetKey, snippets: Vec<CodeSnippet>) -> Option<CodeEvolution> {
    let first = snippets.first()?;
    let last = snippets.last()?;

    let description = if snippets.len() >= 2 {
        evolution_narrative(key, snippets.len(), first, last)
    } else if last.code.len() > TRIVIAL_SNIPPET_LEN || key.is_path() {
        format!(
            "Single version of {key} ({} lines).",
            line_count(&last.code)
        )
    } else {
        return None;
    };

    Some(CodeEvolution {
        key: key.to_string(),
        language: last.language.clone(),
        iterations: snippets.len(),
        first_message_index: first.message_index,
        last_message_index: last.message_index,
        description,
        latest_code: last.code.clone(),
    })
}

fn evolution_narrative(
    key: &SnippetKey,
    iterations: usize,
    first: &CodeSnippet,
    last: &CodeSnippet,
) -> String {
    let mut parts = vec![format!("{key} evolved over {iterations} iterations.")];

    let delta = line_count(&last.code) as i64 - line_count(&first.code) as i64;
    parts.push(match delta {
        d if d > 0 => format!("The code grew by {d} lines."),
        d if d < 0 => format!("The code was refactored and reduced by {} lines.", -d),
        _ => "The line count stayed the same.".to_string(),
    });

    let fn_delta = definition_count(&FUNCTION_DEF_RE, &last.code) as i64
        - definition_count(&FUNCTION_DEF_RE, &first.code) as i64;
    if let Some(s) = count_change(fn_delta, "function", "functions") {
        parts.push(s);
    }
    let class_delta = definition_count(&CLASS_DEF_RE, &last.code) as i64
        - definition_count(&CLASS_DEF_RE, &first.code) as i64;
    if let Some(s) = count_change(class_delta, "class", "classes") {
        parts.push(s);
    }

    parts.join(" ")
}

fn count_change(delta: i64, singular: &str, plural: &str) -> Option<String> {
    let noun = |n: i64| if n == 1 { singular } else { plural };
    match delta {
        0 => None,
        d if d > 0 => Some(format!(
            "{d} new {} {} added.",
            noun(d),
            if d == 1 { "was" } else { "were" }
        )),
        d => Some(format!(
            "{} {} {} removed.",
            -d,
            noun(-d),
            if d == -1 { "was" } else { "were" }
        )),
    }
}

fn line_count(code: &str) -> usize {
    code.lines().count()
}

fn definition_count(re: &Regex, code: &str) -> usize {
    re.find_iter(code).count()
}
