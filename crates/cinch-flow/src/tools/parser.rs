//! Extract a tool invocation from generated text.
//!
//! Models announce tool calls in several shapes. [`parse_tool_call`] tries,
//! in order, and returns the first hit:
//!
//! 1. A JSON object with a `cleanContent` string: unwrap it and parse the
//!    inner text (double-encoded payloads, bounded depth).
//! 2. A tagged block `<tool_call>{...}</tool_call>`. The closing tag is
//!    optional. Escaped quotes get one round of unescaping if the block does
//!    not parse as-is.
//! 3. A bare `name(arglist)` call. The arglist is read as a JSON object, or
//!    failing that as `key: value` pairs separated by commas.
//! 4. An untagged `{"name": ..., "arguments"|"args": {...}}` object anywhere
//!    in the text.
//!
//! `None` means the text simply contains no invocation; it is not an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// How many `cleanContent` layers are unwrapped before giving up.
const MAX_UNWRAP_DEPTH: usize = 4;

static TAGGED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>(.*?)(?:</tool_call>|\z)").expect("invalid tool_call block regex")
});

static FUNCTION_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\(([^()]*)\)").expect("invalid function call regex")
});

/// A tool invocation found in text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedToolCall {
    pub name: String,
    pub args: Value,
}

/// Parse the first tool invocation out of `text`.
pub fn parse_tool_call(text: &str) -> Option<ParsedToolCall> {
    parse_at_depth(text, 0)
}

fn parse_at_depth(text: &str, depth: usize) -> Option<ParsedToolCall> {
    if depth < MAX_UNWRAP_DEPTH
        && let Some(inner) = clean_content(text)
    {
        return parse_at_depth(&inner, depth + 1);
    }
    tagged_block(text)
        .or_else(|| function_syntax(text))
        .or_else(|| untagged_object(text))
}

fn clean_content(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed).ok()? {
        Value::Object(map) => map.get("cleanContent")?.as_str().map(str::to_string),
        _ => None,
    }
}

fn tagged_block(text: &str) -> Option<ParsedToolCall> {
    let body = TAGGED_BLOCK.captures(text)?.get(1)?.as_str().trim();
    let value = serde_json::from_str::<Value>(body).ok().or_else(|| {
        if body.contains("\\\"") {
            serde_json::from_str::<Value>(&body.replace("\\\"", "\"")).ok()
        } else {
            None
        }
    })?;
    from_object(value.as_object()?)
}

/// `{name, arguments ?? args ?? {}}` from a JSON object with a string `name`.
fn from_object(map: &Map<String, Value>) -> Option<ParsedToolCall> {
    let name = map.get("name")?.as_str()?.to_string();
    let args = match map.get("arguments").or_else(|| map.get("args")) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        // Some models send arguments as a JSON-encoded string.
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::String(s.clone())),
        Some(other) => other.clone(),
    };
    Some(ParsedToolCall { name, args })
}

fn function_syntax(text: &str) -> Option<ParsedToolCall> {
    let caps = FUNCTION_SYNTAX.captures(text)?;
    let name = caps.get(1)?.as_str().to_string();
    let arglist = caps.get(2)?.as_str().trim();

    if arglist.is_empty() {
        return Some(ParsedToolCall {
            name,
            args: Value::Object(Map::new()),
        });
    }
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(arglist) {
        return Some(ParsedToolCall { name, args: value });
    }

    let mut args = Map::new();
    for pair in arglist.split(',') {
        let Some((key, value)) = pair.split_once(':') else {
            continue;
        };
        let key = unquote(key.trim());
        if key.is_empty() {
            continue;
        }
        args.insert(key.to_string(), Value::String(unquote(value.trim()).to_string()));
    }
    Some(ParsedToolCall {
        name,
        args: Value::Object(args),
    })
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn untagged_object(text: &str) -> Option<ParsedToolCall> {
    text.match_indices('{').find_map(|(start, _)| {
        let rest = text.get(start..)?;
        let value = serde_json::Deserializer::from_str(rest)
            .into_iter::<Value>()
            .next()?
            .ok()?;
        let map = value.as_object()?;
        if !(map.contains_key("arguments") || map.contains_key("args")) {
            return None;
        }
        from_object(map)
    })
}
