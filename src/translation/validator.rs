/*!
 * Response validation.
 *
 * Provider output is free text. The validator extracts the JSON object from
 * it, checks its shape, requires the returned keys to equal the requested
 * keys exactly, and requires every translation to carry the same placeholder
 * signature as its source text. All violations are reported together so a
 * repair prompt can address them in one round.
 */

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ValidationError, ValidationFailure};
use crate::language_utils::same_language;
use crate::translation::batch::BatchItem;
use crate::translation::placeholders::PlaceholderExtractor;

/// One translated key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub key: String,
    pub text: String,
}

/// Shape of a provider answer (and of saved results files)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResponse {
    #[serde(rename = "targetLanguage", default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    pub translations: Vec<Translation>,
}

/// Validated translations of one batch, in request order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    #[serde(rename = "targetLanguage")]
    pub target_language: String,
    pub translations: Vec<Translation>,
}

impl TranslationResult {
    pub fn keys(&self) -> Vec<String> {
        self.translations.iter().map(|t| t.key.clone()).collect()
    }
}

/// Locate the first parseable JSON object in `raw`.
///
/// Tries the whole text, then fenced code blocks, then every balanced
/// `{...}` span (string-aware), each also after escape repair.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, ValidationError> {
    let mut candidates: Vec<&str> = vec![raw.trim()];
    candidates.extend(fenced_blocks(raw));
    for (start, _) in raw.match_indices('{') {
        if let Some(end) = balanced_object_end(raw, start) {
            candidates.push(&raw[start..=end]);
        }
    }

    let mut last_error = None;
    for candidate in candidates {
        if !candidate.starts_with('{') {
            continue;
        }
        match parse_object(candidate) {
            Ok(map) => return Ok(map),
            Err(e) => last_error = Some(e),
        }
    }

    Err(ValidationError::MalformedJson(
        last_error.unwrap_or_else(|| "no JSON object found in response".to_string()),
    ))
}

fn parse_object(candidate: &str) -> Result<Map<String, Value>, String> {
    let parsed = serde_json::from_str::<Value>(candidate).or_else(|first| {
        let fixed = fix_json_escaping(candidate);
        serde_json::from_str::<Value>(&fixed).map_err(|_| first.to_string())
    })?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => Err("top-level JSON value is not an object".to_string()),
    }
}

fn fenced_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string (`json`) up to the end of the line
        let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(body[..close].trim());
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Byte index of the `}` closing the object opened at `start`
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair string literals that models commonly get wrong: unknown escapes
/// such as `\1` become `\\1`, raw newlines and tabs are escaped, and other raw
/// control characters (a `\1` the model already decoded) become `\\<code>`.
pub fn fix_json_escaping(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len() + 8);
    let mut in_string = false;
    let mut chars = candidate.chars().peekable();

    while let Some(c) = chars.next() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        match c {
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\\' => match chars.peek().copied() {
                Some(next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
                _ => out.push_str("\\\\"),
            },
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\\\{}", c as u32)),
            c => out.push(c),
        }
    }

    out
}

/// Parse and shape-check a response without a batch to compare against
pub fn parse_response(raw: &str) -> Result<TranslationResponse, ValidationFailure> {
    let map = extract_json_object(raw).map_err(ValidationFailure::single)?;

    let target_language = match map.get("targetLanguage") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(ValidationFailure::single(ValidationError::MalformedJson(
                "'targetLanguage' must be a string".to_string(),
            )));
        }
    };

    let Some(Value::Array(items)) = map.get("translations") else {
        return Err(ValidationFailure::single(ValidationError::MalformedJson(
            "missing 'translations' array".to_string(),
        )));
    };

    let mut translations = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let key = item.get("key").and_then(Value::as_str);
        let text = item.get("text");
        match (key, text) {
            (Some(key), Some(Value::String(text))) => translations.push(Translation {
                key: key.to_string(),
                text: text.clone(),
            }),
            // Caught as an empty translation once compared with the batch
            (Some(key), None | Some(Value::Null)) => {
                translations.push(Translation {
                    key: key.to_string(),
                    text: String::new(),
                });
            }
            _ => errors.push(ValidationError::MalformedJson(format!(
                "translation #{} must be an object with string 'key' and 'text'",
                index
            ))),
        }
    }

    if !errors.is_empty() {
        return Err(ValidationFailure::new(errors));
    }

    Ok(TranslationResponse {
        target_language,
        translations,
    })
}

/// Validates provider output against a batch
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    extractor: Arc<PlaceholderExtractor>,
}

impl ResponseValidator {
    pub fn new(extractor: Arc<PlaceholderExtractor>) -> Self {
        Self { extractor }
    }

    /// Validate raw provider text for `items` in `target_language`
    pub fn validate(
        &self,
        raw: &str,
        target_language: &str,
        items: &[BatchItem],
    ) -> Result<TranslationResult, ValidationFailure> {
        let response = parse_response(raw)?;
        self.validate_response(response, target_language, items)
    }

    /// Validate an already parsed response
    pub fn validate_response(
        &self,
        response: TranslationResponse,
        target_language: &str,
        items: &[BatchItem],
    ) -> Result<TranslationResult, ValidationFailure> {
        if let Some(returned) = &response.target_language {
            if !same_language(returned, target_language) {
                return Err(ValidationFailure::single(ValidationError::MalformedJson(format!(
                    "targetLanguage '{}' does not match requested '{}'",
                    returned, target_language
                ))));
            }
        }

        let requested: HashSet<&str> = items.iter().map(|i| i.key.as_str()).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut extra = Vec::new();
        let mut accepted = Vec::new();
        for translation in response.translations {
            if !requested.contains(translation.key.as_str()) || seen.contains(&translation.key) {
                extra.push(translation.key);
                continue;
            }
            seen.insert(translation.key.clone());
            accepted.push(translation);
        }
        let missing: Vec<String> = items
            .iter()
            .filter(|i| !seen.contains(&i.key))
            .map(|i| i.key.clone())
            .collect();

        let mut errors = Vec::new();
        if !missing.is_empty() || !extra.is_empty() {
            errors.push(ValidationError::KeySetMismatch { missing, extra });
        }

        for item in items {
            let Some(translation) = accepted.iter().find(|t| t.key == item.key) else {
                continue;
            };
            if translation.text.trim().is_empty() {
                errors.push(ValidationError::EmptyTranslation { key: item.key.clone() });
                continue;
            }
            let actual = self.extractor.extract(&translation.text);
            if actual != item.signature {
                let diff = item.signature.diff(&actual);
                errors.push(ValidationError::PlaceholderMismatch {
                    key: item.key.clone(),
                    expected: item.signature.render(),
                    actual: actual.render(),
                    missing: diff.missing,
                    extra: diff.extra,
                });
            }
        }

        if !errors.is_empty() {
            debug!("Response rejected with {} violation(s)", errors.len());
            return Err(ValidationFailure::new(errors));
        }

        let translations = items
            .iter()
            .filter_map(|item| accepted.iter().find(|t| t.key == item.key).cloned())
            .collect();

        Ok(TranslationResult {
            target_language: target_language.to_string(),
            translations,
        })
    }
}
