use crate::analysis::Topic;
use crate::types::Message;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedTopics {
    pub main_topic: Option<String>,
    pub subtopics: Vec<String>,
}

/// How often and how late a term shows up in the conversation.
struct Occurrence {
    count: usize,
    last_index: Option<usize>,
}

/// Whole-word pattern for `term`. Word boundaries are only asserted on
/// sides where the term itself starts/ends with a word character, so
/// paths like `./src/a.rs` still match.
fn whole_word(term: &str, case_insensitive: bool) -> Option<Regex> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let first = term.chars().next()?;
    let last = term.chars().last()?;
    let mut pattern = String::new();
    if case_insensitive {
        pattern.push_str("(?i)");
    }
    if is_word(first) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(term));
    if is_word(last) {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern).ok()
}

fn scan(re: &Regex, texts: &[String]) -> Occurrence {
    let mut count = 0;
    let mut last_index = None;
    for (i, text) in texts.iter().enumerate() {
        let n = re.find_iter(text).count();
        if n > 0 {
            count += n;
            last_index = Some(i);
        }
    }
    Occurrence { count, last_index }
}

fn recency(last_index: Option<usize>, message_count: usize) -> f64 {
    let denom = message_count.saturating_sub(1).max(1) as f64;
    last_index.map_or(0.0, |i| i as f64 / denom)
}

/// `base + base * recency * weight`, sorted descending. Ties keep input
/// order.
fn rank_by_score<T>(mut scored: Vec<(T, f64)>) -> Vec<T> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().map(|(item, _)| item).collect()
}

/// Pick a main topic and order the rest. The frequency used is the
/// whole-word occurrence count across messages, falling back to the
/// keyword frequency when the term cannot be found verbatim.
pub fn rank_topics(topics: &[Topic], messages: &[Message], recency_weight: f64) -> RankedTopics {
    let texts: Vec<String> = messages.iter().map(Message::text).collect();
    let scored = topics
        .iter()
        .map(|topic| {
            let occ = whole_word(&topic.term, true)
                .map(|re| scan(&re, &texts))
                .unwrap_or(Occurrence { count: 0, last_index: None });
            let count = if occ.count > 0 { occ.count } else { topic.frequency };
            let freq = count as f64;
            let score = freq + freq * recency(occ.last_index, texts.len()) * recency_weight;
            (topic.term.clone(), score)
        })
        .collect();

    let mut ranked = rank_by_score(scored).into_iter();
    RankedTopics {
        main_topic: ranked.next(),
        subtopics: ranked.collect(),
    }
}

/// Order file paths by mention count weighted toward recent mentions.
pub fn rank_files(
    files: &[String],
    messages: &[Message],
    recency_weight: f64,
    limit: usize,
) -> Vec<String> {
    let texts: Vec<String> = messages.iter().map(Message::text).collect();
    let scored = files
        .iter()
        .map(|file| {
            let occ = whole_word(file, false)
                .map(|re| scan(&re, &texts))
                .unwrap_or(Occurrence { count: 0, last_index: None });
            let mentions = occ.count as f64;
            let score =
                mentions + mentions * recency(occ.last_index, texts.len()) * recency_weight;
            (file.clone(), score)
        })
        .collect();

    let mut ranked = rank_by_score(scored);
    ranked.truncate(limit);
    ranked
}
