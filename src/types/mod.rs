use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ===================================================================
// Role
// ===================================================================

/// Speaker of a message. Anything else is rejected by `validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
    System,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Self::Human),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Capitalized label used in transcript fragments ("Human: ...").
    pub fn label(self) -> &'static str {
        match self {
            Self::Human => "Human",
            Self::Assistant => "Assistant",
            Self::System => "System",
        }
    }
}

// ===================================================================
// Content: the three shapes a transcript may hold
// ===================================================================

/// `content` can be a plain string, an array of parts, or any other JSON
/// value that some writer decided to put there.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
    Structured(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContentPart {
    Raw(String),
    Block(ContentBlock),
}

/// A tagged part such as `{"type": "text", "text": "..."}`. Fields other
/// than `type` and `text` are carried through untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentBlock {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Content {
    /// Classify an arbitrary JSON value. Arrays count as parts only when
    /// every element is a string or an object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Array(items) if items.iter().all(|i| i.is_string() || i.is_object()) => {
                Self::Parts(items.into_iter().map(ContentPart::from_value).collect())
            }
            other => Self::Structured(other),
        }
    }

    /// Flatten the content to plain text. Parts are joined with newlines,
    /// structured values are rendered as compact JSON.
    pub fn extract_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Structured(Value::Null) => String::new(),
            Self::Structured(v) => v.to_string(),
        }
    }
}

impl ContentPart {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Raw(s),
            Value::Object(mut map) => {
                let kind = take_string(&mut map, "type");
                let text = take_string(&mut map, "text");
                Self::Block(ContentBlock { kind, text, extra: map })
            }
            // from_value on Content only routes strings and objects here.
            other => Self::Raw(other.to_string()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Raw(s) => Some(s),
            Self::Block(b) => b.text.as_deref(),
        }
    }
}

/// Remove `key` from `map` if it holds a string; leave non-string values
/// in place so they survive re-serialization.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !map.get(key).is_some_and(Value::is_string) {
        return None;
    }
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

// ===================================================================
// Message
// ===================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    /// Epoch milliseconds, when the writer recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    #[cfg(test)]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
            timestamp: None,
            extra: Map::new(),
        }
    }

    pub fn text(&self) -> String {
        self.content.extract_text()
    }

    pub fn is_human(&self) -> bool {
        self.role == Role::Human
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Length of the compact JSON rendering; used to estimate how many
    /// messages a damaged file originally held.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

// ===================================================================
// Validator
// ===================================================================

/// Accept a candidate only if it looks like a message: an object with a
/// recognized `role` and a `content` key (any value, `null` included).
///
/// A non-integer `timestamp` is not grounds for rejection; it stays in
/// `extra` as-is.
pub fn validate(value: Value) -> Option<Message> {
    let Value::Object(mut map) = value else {
        return None;
    };
    let role = map.get("role").and_then(Value::as_str).and_then(Role::parse)?;
    let content = map.remove("content")?;
    map.remove("role");
    let timestamp = map.get("timestamp").and_then(Value::as_i64);
    if timestamp.is_some() {
        map.remove("timestamp");
    }
    Some(Message {
        role,
        content: Content::from_value(content),
        timestamp,
        extra: map,
    })
}

/// Parse a text candidate and run it through `validate`.
pub fn parse_candidate(text: &str) -> Option<Message> {
    serde_json::from_str::<Value>(text).ok().and_then(validate)
}
