use crate::types::{Message, Role};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

// ===================================================================
// Shared patterns
// ===================================================================

/// Relative or absolute paths ending in a common source/config extension.
pub static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:[A-Za-z]:)?(?:\.{0,2}/)?(?:[\w.-]+/)*[\w-][\w.-]*\.(?:jsx?|tsx?|mjs|cjs|py|rb|rs|go|java|kt|swift|cpp|cc|c|hpp|h|cs|php|html|css|scss|json|ya?ml|toml|md|sh|sql|vue|svelte)\b",
    )
    .expect("static regex")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`\)\]]+"#).expect("static regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}")
        .expect("static regex")
});

/// A fenced code block: optional language tag, body, closing fence.
pub static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```([\w+#-]*)[ \t]*\n?((?s:.*?))```").expect("static regex"));

static KEY_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^I(?:'ve| have)?\s+(?:created|fixed|implemented|added|updated|modified|refactored|removed|wrote|built|changed|moved|renamed|deleted|installed|configured|resolved|replaced)\b",
    )
    .expect("static regex")
});

/// Tool markers that indicate a file was written or patched.
const FILE_OPERATION_MARKERS: &[&str] =
    &["write_to_file", "replace_in_file", "apply_diff", "insert_content"];

const COMMAND_MARKERS: &[&str] = &["execute_command"];

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "because", "been", "before", "being",
    "below", "between", "both", "cannot", "could", "didnt", "does", "doesnt", "doing", "dont",
    "down", "during", "each", "else", "even", "every", "from", "further", "have", "having",
    "here", "heres", "hers", "herself", "himself", "into", "itself", "just", "lets", "like",
    "make", "many", "more", "most", "much", "must", "myself", "need", "okay", "only", "other",
    "ours", "ourselves", "over", "please", "same", "should", "some", "still", "such", "sure",
    "than", "thank", "thanks", "that", "thats", "their", "theirs", "them", "themselves", "then",
    "there", "theres", "these", "they", "this", "those", "through", "under", "until", "upon",
    "used", "using", "very", "want", "well", "were", "what", "when", "where", "which", "while",
    "whom", "will", "with", "would", "your", "yours", "yourself", "yourselves",
];

const MAX_KEYWORDS: usize = 20;
const MAX_TOPICS: usize = 10;
const MAX_KEY_ACTIONS: usize = 5;
const KEY_ACTION_CHARS: usize = 150;

// ===================================================================
// Analysis
// ===================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub term: String,
    pub frequency: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub message_count: usize,
    pub human_count: usize,
    pub assistant_count: usize,
    /// Top 20 keywords.
    pub keywords: Vec<Topic>,
    /// Top 10 keywords, the conversation-level topic list.
    pub topics: Vec<Topic>,
    pub code_blocks: usize,
    pub file_operations: usize,
    pub commands_executed: usize,
    pub files: Vec<String>,
    pub key_actions: Vec<String>,
}

/// File paths, URLs and emails mentioned anywhere, first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Entities {
    pub files: Vec<String>,
    pub urls: Vec<String>,
    pub emails: Vec<String>,
}

pub fn analyze_messages(messages: &[Message]) -> Analysis {
    let texts: Vec<String> = messages.iter().map(Message::text).collect();
    let all_text = texts.join("\n");
    let keywords = extract_keywords(&all_text, MAX_KEYWORDS);
    let topics = keywords.iter().take(MAX_TOPICS).cloned().collect();

    let mut files = OrderedSet::default();
    let mut key_actions = OrderedSet::default();
    for text in &texts {
        for path in file_mentions(text) {
            files.insert(path);
        }
        for action in extract_key_actions(text) {
            if key_actions.len() < MAX_KEY_ACTIONS {
                key_actions.insert(&action);
            }
        }
    }

    Analysis {
        message_count: messages.len(),
        human_count: count_role(messages, Role::Human),
        assistant_count: count_role(messages, Role::Assistant),
        keywords,
        topics,
        code_blocks: texts.iter().map(|t| count_code_blocks(t)).sum(),
        file_operations: count_markers(&texts, FILE_OPERATION_MARKERS),
        commands_executed: count_markers(&texts, COMMAND_MARKERS),
        files: files.into_vec(),
        key_actions: key_actions.into_vec(),
    }
}

/// Conversation-level topics: top 10 keywords over every message.
pub fn extract_topics(messages: &[Message]) -> Vec<Topic> {
    let all_text = messages.iter().map(Message::text).collect::<Vec<_>>().join("\n");
    extract_keywords(&all_text, MAX_TOPICS)
}

pub fn extract_entities(messages: &[Message]) -> Entities {
    let mut files = OrderedSet::default();
    let mut urls = OrderedSet::default();
    let mut emails = OrderedSet::default();
    for msg in messages {
        let text = msg.text();
        for m in URL_RE.find_iter(&text) {
            urls.insert(m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']));
        }
        for path in file_mentions(&text) {
            files.insert(path);
        }
        for m in EMAIL_RE.find_iter(&text) {
            emails.insert(m.as_str());
        }
    }
    Entities {
        files: files.into_vec(),
        urls: urls.into_vec(),
        emails: emails.into_vec(),
    }
}

/// File paths in `text`, skipping ones that are part of a URL.
pub fn file_mentions(text: &str) -> Vec<&str> {
    let urls: Vec<(usize, usize)> = URL_RE.find_iter(text).map(|u| (u.start(), u.end())).collect();
    FILE_PATH_RE
        .find_iter(text)
        .filter(|m| !urls.iter().any(|&(s, e)| s <= m.start() && m.start() < e))
        .map(|m| m.as_str())
        .collect()
}

// ===================================================================
// Keyword extraction
// ===================================================================

/// Lowercase, strip punctuation, drop short and stop words, then rank by
/// frequency. Ties keep first-occurrence order so output is deterministic.
pub fn extract_keywords(text: &str, limit: usize) -> Vec<Topic> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    let mut order: Vec<Topic> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for word in cleaned.split_whitespace() {
        if word.chars().count() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        match index.get(word) {
            Some(&i) => order[i].frequency += 1,
            None => {
                index.insert(word.to_string(), order.len());
                order.push(Topic { term: word.to_string(), frequency: 1 });
            }
        }
    }
    order.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    order.truncate(limit);
    order
}

// ===================================================================
// Small counters
// ===================================================================

fn count_role(messages: &[Message], role: Role) -> usize {
    messages.iter().filter(|m| m.role == role).count()
}

pub fn count_code_blocks(text: &str) -> usize {
    CODE_BLOCK_RE.find_iter(text).count()
}

fn count_markers(texts: &[String], markers: &[&str]) -> usize {
    texts
        .iter()
        .map(|t| markers.iter().map(|m| t.matches(m).count()).sum::<usize>())
        .sum()
}

/// Sentences describing completed work ("I fixed the parser.").
pub fn extract_key_actions(text: &str) -> Vec<String> {
    split_sentences(text)
        .into_iter()
        .filter(|s| KEY_ACTION_RE.is_match(s))
        .map(|s| truncate_chars(s, KEY_ACTION_CHARS))
        .collect()
}

/// Split on `.`, `!` or `?` followed by whitespace, and on newlines. The
/// terminator stays with its sentence; empty pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut start = 0;
        let mut chars = line.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if matches!(c, '.' | '!' | '?')
                && chars.peek().is_some_and(|&(_, next)| next.is_whitespace())
            {
                let end = i + c.len_utf8();
                push_trimmed(&mut out, &line[start..end]);
                start = end;
            }
        }
        push_trimmed(&mut out, &line[start..]);
    }
    out
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s);
    }
}

/// Truncate to `max` chars, appending "..." if truncated.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
    }
}

/// Insertion-ordered string set.
#[derive(Default)]
struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    fn insert(&mut self, s: &str) {
        if self.seen.insert(s.to_string()) {
            self.items.push(s.to_string());
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}

#[cfg(test)]
mod tests;
