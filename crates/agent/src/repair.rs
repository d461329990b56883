//! Function-call argument parsing with fuzzy repair.
//!
//! Models usually produce clean JSON for function arguments, but not always:
//! code fences, comments, Python literals, single quotes, unquoted keys,
//! trailing commas and missing closing braces all show up. A single repair
//! pass handles those before the reply is declared malformed.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use steward_core::error::{Error, Result};
use steward_core::function::FunctionArgs;
use tracing::debug;

/// Parse the raw argument payload of a function call into a JSON object.
///
/// Empty payloads mean "no arguments". Anything that is still not a JSON
/// object after one repair pass is [`Error::MalformedReply`].
pub fn parse_arguments(raw: &str) -> Result<FunctionArgs> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return into_object(value, raw);
    }

    let repaired = repair_json(raw);
    debug!(raw, repaired = %repaired, "Repairing function arguments");

    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => into_object(value, raw),
        Err(e) => Err(Error::MalformedReply(format!(
            "Function arguments are not valid JSON ({e}): {raw}"
        ))),
    }
}

fn into_object(value: Value, raw: &str) -> Result<FunctionArgs> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::MalformedReply(format!(
            "Function arguments must be a JSON object: {raw}"
        ))),
    }
}

/// Best-effort cleanup of almost-JSON.
pub fn repair_json(input: &str) -> String {
    let unfenced = strip_code_fences(input);
    let extracted = extract_object(&unfenced).unwrap_or(unfenced.trim());
    let uncommented = strip_comments(extracted);
    let quoted = fix_quotes(&uncommented);
    let keyed = quote_keys(&quoted);
    let normalized = normalize_tokens(&keyed);
    close_brackets(&normalized)
}

// Each pattern matches a whole string literal first, so the rewrite only
// touches text outside of strings.
static COMMENT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')|//[^\n]*|/\*[\s\S]*?\*/"#).ok()
});

static UNQUOTED_KEY_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"("(?:[^"\\]|\\.)*")|([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)"#).ok()
});

/// Drop `//` line comments and `/* */` block comments.
fn strip_comments(input: &str) -> String {
    let Some(re) = COMMENT_RE.as_ref() else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures| {
        caps.get(1).map_or(String::new(), |s| s.as_str().to_string())
    })
    .into_owned()
}

/// Quote bare identifier keys: `{room: "hall"}` becomes `{"room": "hall"}`.
fn quote_keys(input: &str) -> String {
    let Some(re) = UNQUOTED_KEY_RE.as_ref() else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures| match caps.get(1) {
        Some(string) => string.as_str().to_string(),
        None => format!("{}\"{}\"{}", &caps[2], &caps[3], &caps[4]),
    })
    .into_owned()
}

/// Extract the body of the first ``` fence, if any.
fn strip_code_fences(input: &str) -> String {
    let Some(start) = input.find("```") else {
        return input.to_string();
    };
    let after = &input[start + 3..];

    // Skip a language tag such as ```json
    let body = match after.find('\n') {
        Some(newline) if after[..newline].trim().chars().all(char::is_alphanumeric) => {
            &after[newline + 1..]
        }
        _ => after,
    };

    match body.find("```") {
        Some(end) => body[..end].to_string(),
        None => body.to_string(),
    }
}

/// The first `{ ... }` block, matched string-aware. An unterminated block
/// runs to the end of the input.
fn extract_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let substring = &input[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in substring.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&substring[..=i]);
                }
            }
            _ => {}
        }
    }

    Some(substring.trim_end())
}

/// Turn single-quoted strings into double-quoted ones, leaving apostrophes
/// inside double-quoted strings alone.
fn fix_quotes(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut in_double = false;
    let mut in_single = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }
        match c {
            '\\' => {
                result.push(c);
                escape_next = true;
            }
            '"' if in_single => result.push_str("\\\""),
            '"' => {
                in_double = !in_double;
                result.push(c);
            }
            '\'' if !in_double => {
                in_single = !in_single;
                result.push('"');
            }
            _ => result.push(c),
        }
    }

    result
}

/// Outside of strings: map Python literals to JSON ones and drop trailing
/// commas before a closing brace or bracket.
fn normalize_tokens(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut result = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escape_next = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            result.push(c);
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if c == '"' {
            in_string = true;
            result.push(c);
            i += 1;
        } else if c.is_ascii_alphabetic() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            result.push_str(match word.as_str() {
                "True" => "true",
                "False" => "false",
                "None" => "null",
                other => other,
            });
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                result.push(c);
            }
            i += 1;
        } else {
            result.push(c);
            i += 1;
        }
    }

    result
}

/// Append whatever closing brackets and braces are missing, innermost first.
fn close_brackets(input: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut result = input.to_string();
    if in_string {
        result.push('"');
    }
    while let Some(closer) = stack.pop() {
        result.push(closer);
    }
    result
}
