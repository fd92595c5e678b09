use super::*;

fn human(text: &str) -> Message {
    Message::new(Role::Human, text)
}

fn assistant(text: &str) -> Message {
    Message::new(Role::Assistant, text)
}

fn terms(topics: &[Topic]) -> Vec<&str> {
    topics.iter().map(|t| t.term.as_str()).collect()
}

// =================================================================
// Keywords
// =================================================================

#[test]
fn keywords_drop_short_and_stop_words() {
    let kw = extract_keywords("The parser and the lexer: parser, PARSER! with that lexer.", 10);
    assert_eq!(
        kw,
        vec![
            Topic { term: "parser".into(), frequency: 3 },
            Topic { term: "lexer".into(), frequency: 2 },
        ]
    );
}

#[test]
fn keywords_ties_keep_first_occurrence_order() {
    let kw = extract_keywords("zebra apple mango apple zebra mango", 10);
    assert_eq!(terms(&kw), vec!["zebra", "apple", "mango"]);
}

#[test]
fn keywords_respect_limit() {
    let kw = extract_keywords("alpha bravo charlie delta echoes foxtrot", 3);
    assert_eq!(terms(&kw), vec!["alpha", "bravo", "charlie"]);
}

#[test]
fn keywords_strip_punctuation_inside_words() {
    let kw = extract_keywords("don't won't can't database's", 10);
    assert_eq!(terms(&kw), vec!["wont", "cant", "databases"]);
}

#[test]
fn topics_cap_at_ten() {
    let text = "aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii jjjj kkkk llll";
    let topics = extract_topics(&[human(text)]);
    assert_eq!(topics.len(), 10);
}

// =================================================================
// Analysis counters
// =================================================================

#[test]
fn analyze_counts_roles_and_blocks() {
    let msgs = vec![
        human("Please add caching to src/cache.rs"),
        assistant("I added caching.\n```rust\nfn get() {}\n```\nand\n```\nplain\n```"),
        Message::new(Role::System, "system note"),
    ];
    let a = analyze_messages(&msgs);
    assert_eq!(a.message_count, 3);
    assert_eq!(a.human_count, 1);
    assert_eq!(a.assistant_count, 1);
    assert_eq!(a.code_blocks, 2);
    assert_eq!(a.files, vec!["src/cache.rs"]);
    assert_eq!(a.key_actions, vec!["I added caching."]);
    assert_eq!(a.topics[0].term, "caching");
}

#[test]
fn analyze_counts_tool_markers() {
    let msgs = vec![
        assistant("<write_to_file><path>a.py</path></write_to_file>"),
        assistant("<replace_in_file>...</replace_in_file> then <execute_command>ls</execute_command>"),
    ];
    let a = analyze_messages(&msgs);
    assert_eq!(a.file_operations, 4);
    assert_eq!(a.commands_executed, 2);
}

#[test]
fn analyze_empty() {
    let a = analyze_messages(&[]);
    assert_eq!(a, Analysis::default());
}

#[test]
fn key_actions_require_first_person_past_tense() {
    let text = "I fixed the bug. You fixed it too. I've implemented retries! I think so. I have refactored the module";
    assert_eq!(
        extract_key_actions(text),
        vec![
            "I fixed the bug.",
            "I've implemented retries!",
            "I have refactored the module",
        ]
    );
}

#[test]
fn key_actions_capped_per_analysis() {
    let text = (0..8)
        .map(|i| format!("I added feature {i}."))
        .collect::<Vec<_>>()
        .join(" ");
    let a = analyze_messages(&[assistant(&text)]);
    assert_eq!(a.key_actions.len(), 5);
}

// =================================================================
// Entities
// =================================================================

#[test]
fn entities_are_deduplicated_in_order() {
    let msgs = vec![
        human("See https://docs.rs/regex/latest/regex/index.html and mail dev@example.com"),
        assistant("Edit ./src/main.rs and lib/util.ts; also src/main.rs again. Contact dev@example.com."),
    ];
    let e = extract_entities(&msgs);
    assert_eq!(e.urls, vec!["https://docs.rs/regex/latest/regex/index.html"]);
    assert_eq!(e.files, vec!["./src/main.rs", "lib/util.ts", "src/main.rs"]);
    assert_eq!(e.emails, vec!["dev@example.com"]);
}

#[test]
fn url_trailing_punctuation_is_trimmed() {
    let e = extract_entities(&[human("Go to https://example.com/page.")]);
    assert_eq!(e.urls, vec!["https://example.com/page"]);
}

#[test]
fn file_mentions_skip_urls() {
    assert_eq!(
        file_mentions("fetch https://cdn.example.com/app.js then edit app.js"),
        vec!["app.js"]
    );
}

// =================================================================
// Sentence helpers
// =================================================================

#[test]
fn split_sentences_keeps_terminators() {
    assert_eq!(
        split_sentences("One. Two? Three!\nFour v1.2 ok"),
        vec!["One.", "Two?", "Three!", "Four v1.2 ok"]
    );
}

#[test]
fn split_sentences_empty() {
    assert!(split_sentences("  \n\n ").is_empty());
}

#[test]
fn truncate_chars_is_char_safe() {
    assert_eq!(truncate_chars("héllo", 2), "hé...");
    assert_eq!(truncate_chars("hi", 2), "hi");
}
