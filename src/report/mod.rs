use crate::analysis::{Analysis, Entities, analyze_messages, extract_entities, extract_topics};
use crate::config::ContextTemplate;
use crate::context::RecoveryContext;
use crate::evolution::{CodeEvolution, CodeSnippet, extract_code_evolution, extract_code_snippets};
use crate::ranking::{RankedTopics, rank_files, rank_topics};
use crate::recovery::{MessageFilter, Recovered, attempt_recovery};
use crate::synthesis::{
    DecisionPoint, current_status, find_decision_points, find_open_questions, generate_timeline,
    latest_state,
};
use crate::types::{Message, Role};
use anyhow::Result;
use minijinja::Environment;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

pub const DEFAULT_MAX_LENGTH: usize = 2000;

/// Crash reports carry at most this many subtopics and active files.
const CRASH_REPORT_LIST_CAP: usize = 5;

// ===================================================================
// Input
// ===================================================================

#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    /// Upper bound on the summary, in characters.
    pub max_length: usize,
    pub include_code_snippets: bool,
    pub filter: MessageFilter,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            include_code_snippets: true,
            filter: MessageFilter::default(),
        }
    }
}

// ===================================================================
// Output
// ===================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageCount {
    /// Estimated number of messages the source originally held.
    pub total: usize,
    pub recovered: usize,
    pub human: usize,
    pub assistant: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryResult {
    pub original_task: String,
    pub summary: String,
    pub main_topic: Option<String>,
    pub subtopics: Vec<String>,
    pub active_files: Vec<String>,
    pub entities: Entities,
    pub code_snippets: Vec<CodeSnippet>,
    pub code_evolution: Vec<CodeEvolution>,
    pub timeline: String,
    pub decision_points: Vec<DecisionPoint>,
    pub open_questions: Vec<String>,
    pub recent_messages: Vec<RecentMessage>,
    pub current_status: String,
    pub latest_state: String,
    pub message_count: MessageCount,
    pub recovery_confidence: f64,
    /// Name of the parsing strategy that produced the messages.
    pub strategy: Option<&'static str>,
}

// ===================================================================
// Pipeline
// ===================================================================

/// Recover what can be recovered from `path` and analyze it.
///
/// Errors only when the file exists but cannot be read.
pub fn recover_crashed_conversation(
    ctx: &RecoveryContext,
    path: &Path,
    options: &RecoveryOptions,
) -> Result<RecoveryResult> {
    let recovered = attempt_recovery(ctx, path, &options.filter)?;
    let total = estimate_total(ctx, path, &recovered);
    Ok(assemble(ctx, &recovered, total, options))
}

/// Build the result from already-recovered messages. Pure apart from
/// logging.
pub fn assemble(
    ctx: &RecoveryContext,
    recovered: &Recovered,
    total: usize,
    options: &RecoveryOptions,
) -> RecoveryResult {
    let config = ctx.config;
    let messages = &recovered.messages;
    let analysis = analyze_messages(messages);

    let message_count = MessageCount {
        total,
        recovered: messages.len(),
        human: analysis.human_count,
        assistant: analysis.assistant_count,
    };
    let recovery_confidence = (messages.len() as f64 / total.max(1) as f64).clamp(0.0, 1.0);

    let original_task: String = messages
        .iter()
        .find(|m| m.is_human())
        .map(|m| m.text().trim().chars().take(config.original_task_chars).collect())
        .unwrap_or_default();

    let entities = extract_entities(messages);
    let ranked = rank_topics(&extract_topics(messages), messages, config.topic_recency_weight);
    let active_files = rank_files(
        &entities.files,
        messages,
        config.file_recency_weight,
        config.max_active_files,
    );

    let (code_snippets, code_evolution) = if options.include_code_snippets {
        let mut snippets = extract_code_snippets(messages);
        let skip = snippets.len().saturating_sub(config.max_code_snippets);
        snippets.drain(..skip);
        (snippets, extract_code_evolution(messages))
    } else {
        (Vec::new(), Vec::new())
    };

    let summary = build_summary(&analysis, &ranked, &active_files, options.max_length);
    let status = current_status(messages, ranked.main_topic.as_deref(), &active_files);

    ctx.debug(format_args!(
        "assembled report: {} of ~{} messages, {} evolution groups",
        messages.len(),
        total,
        code_evolution.len()
    ));

    RecoveryResult {
        original_task,
        summary,
        main_topic: ranked.main_topic,
        subtopics: ranked.subtopics,
        active_files,
        entities,
        code_snippets,
        code_evolution,
        timeline: generate_timeline(messages, config),
        decision_points: find_decision_points(messages, config),
        open_questions: find_open_questions(messages, config),
        recent_messages: recent_messages(messages, config.recent_messages),
        current_status: status,
        latest_state: latest_state(
            messages,
            config.latest_state_messages,
            config.latest_state_truncate,
        ),
        message_count,
        recovery_confidence,
        strategy: recovered.strategy.map(|s| s.name()),
    }
}

/// How many messages the file most likely held. Exact when the whole
/// array parsed; otherwise file size divided by the average size of the
/// recovered messages, rounded up and never below what was recovered.
///
/// The average uses the bytes the messages occupied in the file when the
/// strategy measured them, so pretty-printed files are not overcounted.
pub fn estimate_total(ctx: &RecoveryContext, path: &Path, recovered: &Recovered) -> usize {
    let n = recovered.messages.len();
    if let Some(total) = recovered.known_total {
        return total.max(n);
    }
    if n == 0 {
        return 0;
    }
    let bytes = match recovered.source_bytes {
        0 => recovered.messages.iter().map(Message::serialized_len).sum(),
        measured => measured,
    };
    let average = bytes as f64 / n as f64;
    if average <= 0.0 {
        return n;
    }
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => ((meta.len() as f64 / average).ceil() as usize).max(n),
        Ok(_) => n,
        Err(e) => {
            ctx.debug(format_args!("stat {} failed: {e}", path.display()));
            n
        }
    }
}

fn recent_messages(messages: &[Message], count: usize) -> Vec<RecentMessage> {
    messages[messages.len().saturating_sub(count)..]
        .iter()
        .map(|m| RecentMessage {
            role: m.role,
            content: m.text(),
            timestamp: m.timestamp,
        })
        .collect()
}

// ===================================================================
// Summary
// ===================================================================

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

/// Prose overview of the analysis, cut to `max_length` characters with a
/// trailing "..." when it does not fit.
pub fn build_summary(
    analysis: &Analysis,
    ranked: &RankedTopics,
    active_files: &[String],
    max_length: usize,
) -> String {
    if analysis.message_count == 0 {
        return fit_to_length("No messages could be recovered.".to_string(), max_length);
    }

    let mut parts = vec![format!(
        "Recovered conversation with {} ({} from the human, {} from the assistant).",
        plural(analysis.message_count, "message", "messages"),
        analysis.human_count,
        analysis.assistant_count
    )];
    if let Some(topic) = &ranked.main_topic {
        parts.push(format!("Main topic: {topic}."));
    }
    if !ranked.subtopics.is_empty() {
        let shown: Vec<&str> = ranked.subtopics.iter().take(5).map(String::as_str).collect();
        parts.push(format!("Related topics: {}.", shown.join(", ")));
    }
    parts.push(format!(
        "Shared {}, performed {} and executed {}.",
        plural(analysis.code_blocks, "code block", "code blocks"),
        plural(analysis.file_operations, "file operation", "file operations"),
        plural(analysis.commands_executed, "command", "commands")
    ));
    if !active_files.is_empty() {
        let shown: Vec<&str> = active_files.iter().take(5).map(String::as_str).collect();
        parts.push(format!("Active files: {}.", shown.join(", ")));
    }
    if !analysis.key_actions.is_empty() {
        parts.push(format!("Key actions: {}", analysis.key_actions.join(" ")));
    }

    fit_to_length(parts.join(" "), max_length)
}

fn fit_to_length(text: String, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text;
    }
    let keep = max_length.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out.chars().take(max_length).collect()
}

// ===================================================================
// Narrative formatting
// ===================================================================

#[derive(Debug)]
pub enum FormatError {
    TemplateRender(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::TemplateRender(msg) => write!(f, "template render error: {msg}"),
        }
    }
}

impl std::error::Error for FormatError {}

const BUILTIN_TEMPLATE: &str = r#"# Recovered Conversation Context

Recovered {{ message_count.recovered }} of ~{{ message_count.total }} messages (confidence {{ (recovery_confidence * 100) | round | int }}%).

## Topics
Main topic: {{ main_topic or "unknown" }}
Subtopics: {% if subtopics %}{{ subtopics[:5] | join(", ") }}{% else %}N/A{% endif %}


## Project Context
Original task: {{ original_task or "N/A" }}

{{ summary }}

## Recent Conversation
{{ latest_state }}

## Current Status
{{ current_status }}

## Active Code & Files
{% if active_files %}
{% for file in active_files[:5] %}
- {{ file }}
{% endfor %}
{% else %}
No active files identified.
{% endif %}
{% for evo in code_evolution[:3] %}
- {{ evo.key }}: {{ evo.description }}
{% endfor %}

## Open Questions
{% if open_questions %}
{% for q in open_questions %}
- {{ q }}?
{% endfor %}
{% else %}
No open questions.
{% endif %}

## Decisions
{% if decision_points %}
{% for d in decision_points[:5] %}
- {{ d.text }}
{% endfor %}
{% else %}
No explicit decisions recorded.
{% endif %}

## Memory Bank
Check the project's memory bank (memory-bank/) for persistent context that predates this conversation.

## Continue
Please continue the work above from where it left off{% if main_topic %}, focusing on {{ main_topic }}{% endif %}.
"#;

/// Render the result as a human-readable briefing for resuming work.
pub fn format_recovered_context(
    result: &RecoveryResult,
    template: &ContextTemplate,
) -> Result<String, FormatError> {
    let source = match template {
        ContextTemplate::Builtin => BUILTIN_TEMPLATE,
        ContextTemplate::Inline(s) => s.as_str(),
        // RecoveryConfig::load inlines file templates; an unresolved one
        // here is a caller bug.
        ContextTemplate::File(path) => {
            return Err(FormatError::TemplateRender(format!(
                "template file {path} was not loaded"
            )));
        }
    };
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    let tmpl = env
        .template_from_str(source)
        .map_err(|e| FormatError::TemplateRender(format!("parsing template: {e}")))?;
    tmpl.render(result)
        .map_err(|e| FormatError::TemplateRender(format!("rendering template: {e}")))
}

// ===================================================================
// Crash report projection
// ===================================================================

/// What the persistence layer writes to disk for a recovered conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrashReport {
    pub id: String,
    pub task_id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub summary: String,
    pub main_topic: Option<String>,
    pub subtopics: Vec<String>,
    pub active_files: Vec<String>,
    pub open_questions: Vec<String>,
    pub current_status: String,
    pub formatted_message: String,
    pub read: bool,
}

impl CrashReport {
    pub fn from_result(task_id: &str, result: &RecoveryResult, formatted_message: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: result.summary.clone(),
            main_topic: result.main_topic.clone(),
            subtopics: result.subtopics.iter().take(CRASH_REPORT_LIST_CAP).cloned().collect(),
            active_files: result
                .active_files
                .iter()
                .take(CRASH_REPORT_LIST_CAP)
                .cloned()
                .collect(),
            open_questions: result.open_questions.clone(),
            current_status: result.current_status.clone(),
            formatted_message,
            read: false,
        }
    }
}
