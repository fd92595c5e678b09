use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Template for the recovered-context narrative: the built-in one, an
/// inline Jinja2 string, or a path to a template file.
///
/// In TOML this looks like one of:
///
/// ```toml
/// context_template = "builtin"
///
/// # or
///
/// [context_template]
/// inline = "Main topic: {{ main_topic }}"
///
/// # or
///
/// [context_template]
/// file = "context.tmpl"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ContextTemplate {
    #[default]
    Builtin,
    Inline(String),
    /// Path to a template file, relative to the config file's directory.
    File(String),
}

/// Tunables for the analysis heuristics. Every key is optional in the TOML
/// file; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryConfig {
    /// Fraction of a question's significant words a later assistant
    /// message must contain for the question to count as answered.
    #[serde(default = "default_answered_overlap_threshold")]
    pub answered_overlap_threshold: f64,

    /// Words longer than this many characters are "significant".
    #[serde(default = "default_significant_word_min_len")]
    pub significant_word_min_len: usize,

    #[serde(default = "default_topic_recency_weight")]
    pub topic_recency_weight: f64,

    #[serde(default = "default_file_recency_weight")]
    pub file_recency_weight: f64,

    #[serde(default = "default_max_active_files")]
    pub max_active_files: usize,

    /// How many trailing messages are scanned for open questions.
    #[serde(default = "default_open_question_window")]
    pub open_question_window: usize,

    #[serde(default = "default_max_open_questions")]
    pub max_open_questions: usize,

    #[serde(default = "default_max_decision_points")]
    pub max_decision_points: usize,

    #[serde(default = "default_timeline_segments")]
    pub timeline_segments: usize,

    #[serde(default = "default_recent_messages")]
    pub recent_messages: usize,

    #[serde(default = "default_latest_state_messages")]
    pub latest_state_messages: usize,

    /// Per-message character cap in the latest-state transcript fragment.
    #[serde(default = "default_latest_state_truncate")]
    pub latest_state_truncate: usize,

    #[serde(default = "default_original_task_chars")]
    pub original_task_chars: usize,

    #[serde(default = "default_max_code_snippets")]
    pub max_code_snippets: usize,

    #[serde(default)]
    pub context_template: ContextTemplate,
}

fn default_answered_overlap_threshold() -> f64 {
    0.5
}

fn default_significant_word_min_len() -> usize {
    4
}

fn default_topic_recency_weight() -> f64 {
    0.5
}

fn default_file_recency_weight() -> f64 {
    2.0
}

fn default_max_active_files() -> usize {
    10
}

fn default_open_question_window() -> usize {
    20
}

fn default_max_open_questions() -> usize {
    5
}

fn default_max_decision_points() -> usize {
    10
}

fn default_timeline_segments() -> usize {
    5
}

fn default_recent_messages() -> usize {
    15
}

fn default_latest_state_messages() -> usize {
    10
}

fn default_latest_state_truncate() -> usize {
    500
}

fn default_original_task_chars() -> usize {
    500
}

fn default_max_code_snippets() -> usize {
    10
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            answered_overlap_threshold: default_answered_overlap_threshold(),
            significant_word_min_len: default_significant_word_min_len(),
            topic_recency_weight: default_topic_recency_weight(),
            file_recency_weight: default_file_recency_weight(),
            max_active_files: default_max_active_files(),
            open_question_window: default_open_question_window(),
            max_open_questions: default_max_open_questions(),
            max_decision_points: default_max_decision_points(),
            timeline_segments: default_timeline_segments(),
            recent_messages: default_recent_messages(),
            latest_state_messages: default_latest_state_messages(),
            latest_state_truncate: default_latest_state_truncate(),
            original_task_chars: default_original_task_chars(),
            max_code_snippets: default_max_code_snippets(),
            context_template: ContextTemplate::default(),
        }
    }
}

impl RecoveryConfig {
    /// Load a config file. A missing file yields the defaults; a file
    /// template reference is resolved to its contents immediately so the
    /// rest of the pipeline never touches the filesystem for it.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: RecoveryConfig = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        if let ContextTemplate::File(rel) = &config.context_template {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let tmpl_path = base.join(rel);
            let body = fs::read_to_string(&tmpl_path)
                .with_context(|| format!("reading template {}", tmpl_path.display()))?;
            config.context_template = ContextTemplate::Inline(body);
        }
        Ok(config)
    }
}
