//! JSON repair for model output.
//!
//! Local models often return JSON that is almost right: single quotes,
//! trailing commas, unquoted keys, Python literals, or a valid object
//! wrapped in a markdown fence. [`repair`] runs an ordered chain of parse
//! strategies and returns the first value that parses; if the raw text
//! fails every strategy, the chain is re-run once on the JSON candidate
//! extracted from the surrounding prose.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::RepairError;

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("Invalid regex"));

/// The parse strategy that produced a repaired value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Strict,
    QuoteNormalized,
    TrailingCommas,
    Permissive,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Strict => "strict",
            Strategy::QuoteNormalized => "quote-normalized",
            Strategy::TrailingCommas => "trailing-commas",
            Strategy::Permissive => "permissive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully repaired value.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub value: Value,
    pub strategy: Strategy,
    /// Whether the value came from a candidate extracted out of surrounding
    /// text rather than from the text as a whole.
    pub extracted: bool,
}

/// Parse possibly malformed JSON into a value.
///
/// Valid JSON always comes back exactly as strict parsing would return it.
pub fn repair_json(text: &str) -> Result<Value, RepairError> {
    repair(text).map(|r| r.value)
}

/// Parse possibly malformed JSON, reporting which strategy succeeded.
///
/// Tries, in order:
/// 1. Strict JSON
/// 2. Single quotes normalized to double quotes
/// 3. Trailing commas before `}` / `]` removed
/// 4. JSON5 (unquoted keys, Python `True`/`False`/`None`), re-serialized
///    and re-parsed as strict JSON
///
/// When all four fail on the whole text, the same chain runs on the
/// candidate returned by [`extract_json`].
pub fn repair(text: &str) -> Result<Repaired, RepairError> {
    let strict_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            return Ok(Repaired {
                value,
                strategy: Strategy::Strict,
                extracted: false,
            });
        }
        Err(e) => e,
    };

    if let Some((value, strategy)) = fallback_chain(text) {
        debug!(%strategy, "Repaired model output");
        return Ok(Repaired {
            value,
            strategy,
            extracted: false,
        });
    }

    if let Some(candidate) = extract_json(text)
        && candidate != text.trim()
        && let Some((value, strategy)) = parse_chain(&candidate)
    {
        debug!(%strategy, "Repaired JSON extracted from surrounding text");
        return Ok(Repaired {
            value,
            strategy,
            extracted: true,
        });
    }

    Err(RepairError::MalformedOutput {
        raw: text.to_string(),
        offset: error_offset(text, &strict_error),
    })
}

/// Full chain, strict parse first.
fn parse_chain(text: &str) -> Option<(Value, Strategy)> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some((value, Strategy::Strict));
    }
    fallback_chain(text)
}

/// Strategies 2 through 4.
fn fallback_chain(text: &str) -> Option<(Value, Strategy)> {
    let normalized = text.replace('\'', "\"");
    if let Ok(value) = serde_json::from_str::<Value>(&normalized) {
        return Some((value, Strategy::QuoteNormalized));
    }

    // Quote-normalized text first, then the original in case the
    // normalization broke an apostrophe inside a string.
    for source in [normalized.as_str(), text] {
        let stripped = strip_trailing_commas(source);
        if let Ok(value) = serde_json::from_str::<Value>(&stripped) {
            return Some((value, Strategy::TrailingCommas));
        }
    }

    parse_permissive(text).map(|value| (value, Strategy::Permissive))
}

/// Remove commas that directly precede a closing brace or bracket.
pub fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Parse a literal structure with JSON5 rules, then confirm the result
/// round-trips through strict JSON.
fn parse_permissive(text: &str) -> Option<Value> {
    let literal = normalize_python_literals(text);
    let value: Value = json5::from_str(&literal).ok()?;
    let serialized = serde_json::to_string(&value).ok()?;
    serde_json::from_str(&serialized).ok()
}

/// Map Python `True`, `False` and `None` outside string literals to their
/// JSON spellings.
fn normalize_python_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut escape_next = false;

    let flush = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            other => out.push_str(other),
        }
        word.clear();
    };

    for ch in text.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
            continue;
        }

        flush(&mut word, &mut out);
        if ch == '"' || ch == '\'' {
            quote = Some(ch);
        }
        out.push(ch);
    }
    flush(&mut word, &mut out);

    out
}

/// Zero-based byte offset of a serde_json error within `text`.
fn error_offset(text: &str, error: &serde_json::Error) -> usize {
    let line = error.line();
    if line == 0 {
        return 0;
    }

    let line_start: usize = text
        .split_inclusive('\n')
        .take(line - 1)
        .map(str::len)
        .sum();

    (line_start + error.column().saturating_sub(1)).min(text.len())
}

/// Extract the most likely JSON candidate from a model response.
///
/// Tries, in order:
/// 1. Markdown ` ```json ... ``` ` fenced block
/// 2. Bare ` ``` ... ``` ` fenced block (if the content starts with `{` or `[`)
/// 3. The first balanced `{...}` or `[...]` block that repairs; scanning
///    moves past bracketed prose such as `[ENT-3]`
///
/// When no balanced block repairs, the first one is returned so the caller
/// still sees the candidate. Returns `None` when the text holds no candidate
/// at all.
pub fn extract_json(response: &str) -> Option<String> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json")
        && let Some(end) = trimmed[start + 7..].find("```")
    {
        return Some(trimmed[start + 7..start + 7 + end].trim().to_string());
    }

    if let Some(start) = trimmed.find("```")
        && let Some(end) = trimmed[start + 3..].find("```")
    {
        let inner = trimmed[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') || inner.starts_with('[') {
            return Some(inner.to_string());
        }
    }

    let mut first_balanced = None;
    for (idx, _) in trimmed.match_indices(['{', '[']) {
        let Some(candidate) = extract_balanced(&trimmed[idx..]) else {
            continue;
        };
        if parse_chain(&candidate).is_some() {
            return Some(candidate);
        }
        first_balanced.get_or_insert(candidate);
    }

    first_balanced
}

/// Extract a substring with balanced braces and brackets from the opener at
/// the start of `text`.
///
/// Tracks nesting while respecting double-quoted string literals (including
/// escapes), so `{"msg": "use { and } carefully"}` is handled correctly.
fn extract_balanced(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (idx, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(text[..=idx].to_string());
                }
            }
            _ => {}
        }
    }

    None
}
