use super::*;
use crate::config::RecoveryConfig;
use crate::context::tests::CaptureLogger;
use crate::types::Role;
use serde_json::json;

// ===================================================================
// Test helpers
// ===================================================================

fn compact_lines(values: &[serde_json::Value]) -> String {
    let body = values
        .iter()
        .map(|v| serde_json::to_string(v).unwrap())
        .collect::<Vec<_>>()
        .join(",\n");
    format!("[\n{body}\n]\n")
}

fn msg(role: &str, content: &str) -> serde_json::Value {
    json!({ "role": role, "content": content })
}

fn run(raw: &str) -> Recovered {
    let config = RecoveryConfig::default();
    let ctx = RecoveryContext::with_global_logger(&config);
    run_chain(&ctx, raw, &MessageFilter::default())
}

fn texts(messages: &[Message]) -> Vec<String> {
    messages.iter().map(Message::text).collect()
}

// ===================================================================
// Strategy 1: direct parse
// ===================================================================

#[test]
fn direct_parse_valid_array() {
    let raw = compact_lines(&[msg("human", "hi"), msg("assistant", "hello"), msg("system", "s")]);
    let r = run(&raw);
    assert_eq!(r.strategy, Some(Strategy::DirectParse));
    assert_eq!(r.known_total, Some(3));
    assert_eq!(texts(&r.messages), vec!["hi", "hello", "s"]);
}

#[test]
fn direct_parse_drops_invalid_elements_but_counts_them() {
    let raw = compact_lines(&[msg("human", "hi"), json!({ "role": "robot", "content": "x" })]);
    let attempt = Strategy::DirectParse.run(&raw, &MessageFilter::default()).unwrap();
    assert_eq!(attempt.messages.len(), 1);
    assert_eq!(attempt.known_total, Some(2));
}

#[test]
fn direct_parse_rejects_non_array() {
    let err = Strategy::DirectParse
        .run(r#"{"role":"human","content":"x"}"#, &MessageFilter::default())
        .unwrap_err();
    assert!(matches!(err, StrategyError::NotAnArray));
}

#[test]
fn direct_parse_rejects_malformed() {
    let err = Strategy::DirectParse
        .run("[{\"role\":", &MessageFilter::default())
        .unwrap_err();
    assert!(matches!(err, StrategyError::Malformed(_)));
    assert!(err.to_string().starts_with("malformed JSON"));
}

#[test]
fn direct_parse_applies_time_filter() {
    let raw = compact_lines(&[
        json!({ "role": "human", "content": "old", "timestamp": 100 }),
        json!({ "role": "human", "content": "new", "timestamp": 300 }),
        json!({ "role": "assistant", "content": "undated" }),
    ]);
    let filter = MessageFilter { since: Some(200), ..Default::default() };
    let attempt = Strategy::DirectParse.run(&raw, &filter).unwrap();
    assert_eq!(texts(&attempt.messages), vec!["new", "undated"]);
    assert_eq!(attempt.known_total, Some(2));
}

#[test]
fn direct_parse_applies_search_filter() {
    let raw = compact_lines(&[msg("human", "Fix the Parser"), msg("assistant", "done")]);
    let filter = MessageFilter { search: Some("parser".into()), ..Default::default() };
    let attempt = Strategy::DirectParse.run(&raw, &filter).unwrap();
    assert_eq!(texts(&attempt.messages), vec!["Fix the Parser"]);
}

#[test]
fn filter_until_is_inclusive() {
    let filter = MessageFilter { until: Some(10), ..Default::default() };
    let mut m = Message::new(Role::Human, "x");
    m.timestamp = Some(10);
    assert!(filter.matches(&m));
    m.timestamp = Some(11);
    assert!(!filter.matches(&m));
    assert!(!filter.is_empty());
    assert!(MessageFilter::default().is_empty());
}

// ===================================================================
// Strategy 2: chunk by chunk
// ===================================================================

#[test]
fn chunk_strategy_skips_one_broken_element() {
    let raw = "[\n{\"role\":\"human\",\"content\":\"a\"},\n{\"role\":\"assistant\",\"content\":\"b\"o\"},\n{\"role\":\"human\",\"content\":\"c\"}\n]\n";
    let r = run(raw);
    assert_eq!(r.strategy, Some(Strategy::ChunkByChunk));
    assert_eq!(r.known_total, None);
    assert_eq!(texts(&r.messages), vec!["a", "c"]);
}

#[test]
fn chunk_strategy_handles_truncated_tail() {
    let raw = "[\n{\"role\":\"human\",\"content\":\"a\"},\n{\"role\":\"assistant\",\"content\":\"b\"},\n{\"role\":\"human\",\"con";
    let r = run(raw);
    assert_eq!(r.strategy, Some(Strategy::ChunkByChunk));
    assert_eq!(texts(&r.messages), vec!["a", "b"]);
}

// ===================================================================
// Strategy 3: balanced braces
// ===================================================================

#[test]
fn brace_strategy_recovers_pretty_printed_objects() {
    let raw = r#"[
  {
    "role": "human",
    "content": "first"
  },
  {
    "role": "assistant",
    "content": [
      { "type": "text", "text": "second" }
    ]
  },
  {
    "role": "human",
    "content": "thi"#;
    let r = run(raw);
    assert_eq!(r.strategy, Some(Strategy::BalancedBraces));
    assert_eq!(texts(&r.messages), vec!["first", "second"]);
}

#[test]
fn brace_strategy_resets_after_stray_closing_brace() {
    let raw = "}}\n{\n\"role\": \"human\",\n\"content\": \"kept\"\n}\n";
    assert_eq!(texts(&balanced_braces(raw).messages), vec!["kept"]);
}

// ===================================================================
// Strategy 4: regex extraction
// ===================================================================

#[test]
fn regex_strategy_finds_objects_in_binary_noise() {
    let raw = "\u{0}\u{7}GARBAGE{\"role\":\"human\",\"content\":\"alive\"}\u{1}\u{2}xx{\"role\":\"assistant\",\"content\":[{\"type\":\"text\",\"text\":\"still\"}]}junk";
    let r = run(raw);
    assert_eq!(r.strategy, Some(Strategy::RegexExtraction));
    assert_eq!(texts(&r.messages), vec!["alive", "still"]);
}

#[test]
fn regex_strategy_ignores_non_messages() {
    let raw = "{\"foo\":1} {\"role\":\"user\",\"content\":\"x\"} {\"role\":\"system\",\"content\":\"ok\"}";
    let msgs = regex_extraction(raw).messages;
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].role, Role::System);
}

// ===================================================================
// Chain behaviour
// ===================================================================

#[test]
fn empty_input_recovers_nothing() {
    let r = run("");
    assert!(r.messages.is_empty());
    assert!(r.strategy.is_none());
}

#[test]
fn empty_array_is_an_intact_empty_conversation() {
    let r = run("[]");
    assert!(r.messages.is_empty());
    assert_eq!(r.strategy, Some(Strategy::DirectParse));
    assert_eq!(r.known_total, Some(0));
}

#[test]
fn filter_matching_nothing_stops_at_direct_parse() {
    let raw = compact_lines(&[
        json!({ "role": "human", "content": "start", "timestamp": 1000 }),
        json!({ "role": "assistant", "content": "ok", "timestamp": 2000 }),
        json!({ "role": "human", "content": "more", "timestamp": 3000 }),
        json!({ "role": "assistant", "content": "done", "timestamp": 4000 }),
    ]);
    let config = RecoveryConfig::default();
    let ctx = RecoveryContext::with_global_logger(&config);

    let late = MessageFilter { since: Some(9_999_999), ..Default::default() };
    let r = run_chain(&ctx, &raw, &late);
    assert!(r.messages.is_empty());
    assert_eq!(r.strategy, Some(Strategy::DirectParse));
    assert_eq!(r.known_total, Some(0));

    let search = MessageFilter { search: Some("zzzz-no-match".into()), ..Default::default() };
    let r = run_chain(&ctx, &raw, &search);
    assert!(r.messages.is_empty());
    assert_eq!(r.strategy, Some(Strategy::DirectParse));
}

#[test]
fn lossy_strategies_measure_bytes_as_written() {
    let first = "{\n  \"role\": \"human\",\n  \"content\": \"first\"\n}";
    let raw = format!("[\n{first}\n,\n{{\n  \"role\": \"assistant\",\n  \"con");
    let r = run(&raw);
    assert_eq!(r.strategy, Some(Strategy::BalancedBraces));
    assert_eq!(r.messages.len(), 1);
    assert_eq!(r.source_bytes, first.len());
}

#[test]
fn chain_logs_each_failed_strategy() {
    let config = RecoveryConfig::default();
    let logger = CaptureLogger::default();
    let ctx = RecoveryContext::new(&config, &logger);
    run_chain(&ctx, "not json at all", &MessageFilter::default());
    let lines = logger.lines.lock().unwrap();
    assert!(lines[0].1.starts_with("direct_parse failed"));
    assert_eq!(lines[1].1, "chunk_by_chunk found no messages");
    assert_eq!(lines.last().unwrap().0, log::Level::Warn);
}

#[test]
fn attempt_recovery_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecoveryConfig::default();
    let ctx = RecoveryContext::with_global_logger(&config);
    let r = attempt_recovery(&ctx, &dir.path().join("gone.json"), &MessageFilter::default())
        .unwrap();
    assert!(r.messages.is_empty());
}

#[test]
fn attempt_recovery_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecoveryConfig::default();
    let ctx = RecoveryContext::with_global_logger(&config);
    assert!(attempt_recovery(&ctx, dir.path(), &MessageFilter::default()).is_err());
}

#[test]
fn attempt_recovery_reads_invalid_utf8() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conv.json");
    let mut bytes = b"[\n{\"role\":\"human\",\"content\":\"ok\"},\n".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe, 0x00]);
    std::fs::write(&path, bytes).unwrap();
    let config = RecoveryConfig::default();
    let ctx = RecoveryContext::with_global_logger(&config);
    let r = attempt_recovery(&ctx, &path, &MessageFilter::default()).unwrap();
    assert_eq!(texts(&r.messages), vec!["ok"]);
}
