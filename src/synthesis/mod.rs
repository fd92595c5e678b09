use crate::analysis::{analyze_messages, split_sentences, truncate_chars};
use crate::config::RecoveryConfig;
use crate::types::{Message, Role};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

// ===================================================================
// Open questions
// ===================================================================

/// Lowercased words of `text` longer than `min_len` characters,
/// punctuation stripped.
fn significant_words(text: &str, min_len: usize) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > min_len)
        .collect()
}

fn word_set(text: &str) -> HashSet<String> {
    significant_words(text, 0).into_iter().collect()
}

/// Questions the human asked near the end of the conversation that no
/// later assistant message appears to address.
pub fn find_open_questions(messages: &[Message], config: &RecoveryConfig) -> Vec<String> {
    let window_start = messages.len().saturating_sub(config.open_question_window);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (i, msg) in messages.iter().enumerate().skip(window_start) {
        if !msg.is_human() {
            continue;
        }
        let text = msg.text();
        if !text.contains('?') {
            continue;
        }
        let later_answers: Vec<HashSet<String>> = messages[i + 1..]
            .iter()
            .filter(|m| m.is_assistant())
            .map(|m| word_set(&m.text()))
            .collect();

        for sentence in split_sentences(&text) {
            if !sentence.contains('?') {
                continue;
            }
            let words = significant_words(sentence, config.significant_word_min_len);
            if words.is_empty() {
                continue;
            }
            let answered = later_answers.iter().any(|answer| {
                let shared = words.iter().filter(|w| answer.contains(*w)).count();
                shared as f64 / words.len() as f64 > config.answered_overlap_threshold
            });
            if answered {
                continue;
            }
            let question = sentence.trim_end_matches(['?', '!', '.', ' ']).to_string();
            if seen.insert(question.clone()) {
                out.push(question);
            }
        }
    }

    out.truncate(config.max_open_questions);
    out
}

// ===================================================================
// Decision points
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Decision,
    Preference,
    Option,
    Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionPoint {
    pub kind: DecisionKind,
    pub role: Role,
    pub message_index: usize,
    pub text: String,
}

const DECISION_TEXT_CHARS: usize = 200;

/// Phrase → category. First matching row wins.
static DECISION_PATTERNS: LazyLock<Vec<(Regex, DecisionKind)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(?:i|we)(?: have|'ve)? decided\b", DecisionKind::Decision),
        (r"(?i)\blet'?s go with\b", DecisionKind::Decision),
        (r"(?i)\b(?:we|i)(?:'ll| will) (?:go with|use|stick with)\b", DecisionKind::Decision),
        (r"(?i)\bi(?:'d)? prefer\b", DecisionKind::Preference),
        (r"(?i)\bi(?:'d| would) rather\b", DecisionKind::Preference),
        (r"(?i)\boption\s+(?:\d+|[a-c])\b", DecisionKind::Option),
        (r"(?i)\bapproach\s+\d+\b", DecisionKind::Option),
        (r"(?i)\bi (?:would )?(?:recommend|suggest)\b", DecisionKind::Recommendation),
        (r"(?i)\bi'd (?:recommend|suggest)\b", DecisionKind::Recommendation),
        (r"(?i)\bthe best (?:option|approach|choice|way)\b", DecisionKind::Recommendation),
    ]
    .into_iter()
    .map(|(p, kind)| (Regex::new(p).expect("static regex"), kind))
    .collect()
});

fn classify_decision(sentence: &str) -> Option<DecisionKind> {
    DECISION_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(sentence))
        .map(|(_, kind)| *kind)
}

pub fn find_decision_points(messages: &[Message], config: &RecoveryConfig) -> Vec<DecisionPoint> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (i, msg) in messages.iter().enumerate() {
        let text = msg.text();
        for sentence in split_sentences(&text) {
            let Some(kind) = classify_decision(sentence) else {
                continue;
            };
            let text = truncate_chars(sentence, DECISION_TEXT_CHARS);
            if !seen.insert(text.clone()) {
                continue;
            }
            out.push(DecisionPoint {
                kind,
                role: msg.role,
                message_index: i,
                text,
            });
            if out.len() >= config.max_decision_points {
                return out;
            }
        }
    }
    out
}

// ===================================================================
// Timeline
// ===================================================================

/// One line per index range: topics, key actions, code blocks.
pub fn generate_timeline(messages: &[Message], config: &RecoveryConfig) -> String {
    if messages.is_empty() {
        return "No messages recovered.".to_string();
    }
    let segments = config.timeline_segments.clamp(1, messages.len());
    let size = messages.len().div_ceil(segments);

    messages
        .chunks(size)
        .enumerate()
        .map(|(n, chunk)| {
            let start = n * size + 1;
            let end = start + chunk.len() - 1;
            let analysis = analyze_messages(chunk);

            let topics: Vec<&str> = analysis
                .topics
                .iter()
                .take(3)
                .map(|t| t.term.as_str())
                .collect();
            let mut line = if topics.is_empty() {
                format!("Messages {start}-{end}: General discussion.")
            } else {
                format!("Messages {start}-{end}: Discussed {}.", topics.join(", "))
            };

            let actions: Vec<&str> = analysis
                .key_actions
                .iter()
                .take(2)
                .map(|a| a.trim_end_matches(['.', '!', '?']))
                .collect();
            if !actions.is_empty() {
                line.push(' ');
                line.push_str(&actions.join("; "));
                line.push('.');
            }

            line.push_str(&format!(
                " Shared {} code {}.",
                analysis.code_blocks,
                if analysis.code_blocks == 1 { "block" } else { "blocks" }
            ));
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ===================================================================
// Current status
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    AnsweringQuestion,
    WritingCode,
    ExplainingConcept,
    Discussing,
}

/// Which message of the final exchange a status pattern looks at.
#[derive(Debug, Clone, Copy)]
enum Speaker {
    Human,
    Assistant,
}

const STATUS_TAIL: usize = 5;

/// Checked top to bottom; the first match classifies the exchange.
static STATUS_PATTERNS: LazyLock<Vec<(Speaker, Regex, Activity)>> = LazyLock::new(|| {
    [
        (Speaker::Human, r"\?", Activity::AnsweringQuestion),
        (Speaker::Assistant, r"```", Activity::WritingCode),
        (Speaker::Assistant, r"<(?:write_to_file|replace_in_file)>", Activity::WritingCode),
        (
            Speaker::Assistant,
            r"(?i)\b(?:because|this means|in other words|the reason|works by|is used to|refers to)\b",
            Activity::ExplainingConcept,
        ),
    ]
    .into_iter()
    .map(|(who, p, activity)| (who, Regex::new(p).expect("static regex"), activity))
    .collect()
});

static NEXT_STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:next|then),?\s+([^.!?\n]{3,})").expect("static regex")
});

fn classify_activity(human: Option<&str>, assistant: Option<&str>) -> Activity {
    STATUS_PATTERNS
        .iter()
        .find(|(who, re, _)| match who {
            Speaker::Human => human.is_some_and(|t| re.is_match(t)),
            Speaker::Assistant => assistant.is_some_and(|t| re.is_match(t)),
        })
        .map_or(Activity::Discussing, |(_, _, activity)| *activity)
}

/// One-paragraph guess at where the conversation stopped and what was
/// about to happen next.
pub fn current_status(
    messages: &[Message],
    main_topic: Option<&str>,
    active_files: &[String],
) -> String {
    if messages.is_empty() {
        return "No recoverable conversation state.".to_string();
    }
    let tail = &messages[messages.len().saturating_sub(STATUS_TAIL)..];
    let last_human = tail.iter().rev().find(|m| m.is_human()).map(Message::text);
    let last_assistant = tail.iter().rev().find(|m| m.is_assistant()).map(Message::text);

    let subject = main_topic.unwrap_or("the current task");
    let activity = classify_activity(last_human.as_deref(), last_assistant.as_deref());
    let mut status = match activity {
        Activity::AnsweringQuestion => {
            format!("The assistant was answering a question about {subject}.")
        }
        Activity::WritingCode => match active_files.first() {
            Some(file) => format!("The assistant was writing code for {subject}, most recently in {file}."),
            None => format!("The assistant was writing code for {subject}."),
        },
        Activity::ExplainingConcept => {
            format!("The assistant was explaining a concept related to {subject}.")
        }
        Activity::Discussing => format!("The conversation was discussing {subject}."),
    };

    let next = last_assistant
        .as_deref()
        .and_then(|t| NEXT_STEP_RE.captures(t))
        .map(|caps| caps[1].trim().to_string());
    status.push_str(&match next {
        Some(step) => format!(" Next step: {step}."),
        None => " Next step: continue from where the conversation left off.".to_string(),
    });

    if messages.last().is_some_and(Message::is_human) {
        status.push_str(" The last message was from the human and had not been answered.");
    }
    status
}

// ===================================================================
// Latest state
// ===================================================================

/// The last `count` messages as a readable transcript fragment.
pub fn latest_state(messages: &[Message], count: usize, truncate: usize) -> String {
    if messages.is_empty() {
        return "No messages recovered.".to_string();
    }
    let tail = &messages[messages.len().saturating_sub(count)..];
    let body = tail
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), truncate_chars(m.text().trim(), truncate)))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Last {} messages before the crash:\n\n{body}\n\n[This was the state of the conversation at the time of the crash.]",
        tail.len()
    )
}
