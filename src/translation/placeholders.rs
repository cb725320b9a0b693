/*!
 * Placeholder signature extraction.
 *
 * A signature is the ordered multiset of protected tokens found in a text:
 * interpolation variables, ICU heads, printf specifiers, backslash
 * back-references and any project-registered pattern. A translation is only
 * acceptable when its signature equals the signature of its source text.
 */

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Which pattern produced a token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    /// `{{name}}`
    DoubleBrace,
    /// `{count, plural, ...}` canonicalised to `{count, plural}`
    Icu,
    /// `{name}`, `{0}`, `{name:fmt}`
    Brace,
    /// `%s`, `%1$d`, `%.2f`
    Printf,
    /// `\1`
    BackslashRef,
    /// Pattern registered in configuration
    Custom(String),
}

/// One occurrence of a protected token, in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaceholderToken {
    pub kind: PlaceholderKind,
    pub token: String,
}

/// Ordered protected-token occurrences of a text
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderSignature(Vec<PlaceholderToken>);

impl PlaceholderSignature {
    pub fn new(tokens: Vec<PlaceholderToken>) -> Self {
        Self(tokens)
    }

    pub fn tokens(&self) -> &[PlaceholderToken] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Stable rendering used in fingerprints and diagnostics
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|t| t.token.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Multiset difference against `actual`
    pub fn diff(&self, actual: &PlaceholderSignature) -> SignatureDiff {
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for token in &self.0 {
            *counts.entry(token.token.as_str()).or_default() += 1;
        }
        for token in &actual.0 {
            *counts.entry(token.token.as_str()).or_default() -= 1;
        }

        let mut missing = Vec::new();
        let mut extra = Vec::new();
        for (token, count) in counts {
            for _ in 0..count.max(0) {
                missing.push(token.to_string());
            }
            for _ in 0..(-count).max(0) {
                extra.push(token.to_string());
            }
        }

        let order_differs = missing.is_empty() && extra.is_empty() && self != actual;
        SignatureDiff {
            missing,
            extra,
            order_differs,
        }
    }
}

impl fmt::Display for PlaceholderSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Result of comparing an expected signature with an actual one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureDiff {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    /// Same tokens, different order
    pub order_differs: bool,
}

struct Pattern {
    kind: PlaceholderKind,
    regex: Regex,
}

// Anchored forms; matching happens at each scan position.
static DOUBLE_BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{\s*[^{}\s][^{}]*\}\}").expect("static placeholder regex"));
static BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{[A-Za-z0-9_$.\-]+(?::[^{}]*)?\}").expect("static placeholder regex"));
static PRINTF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^%(?:\d+\$)?[-+0#]*(?:\d+|\*)?(?:\.(?:\d+|\*))?(?:hh|h|ll|l|L|z|j|t)?[diouxXeEfFgGaAcsp@]")
        .expect("static placeholder regex")
});
static BACKSLASH_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\\d+").expect("static placeholder regex"));
static ICU_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z0-9_$.\-]+)\s*,\s*([A-Za-z]+)\s*(?:,|$)").expect("static placeholder regex"));

static DEFAULT_EXTRACTOR: Lazy<PlaceholderExtractor> = Lazy::new(PlaceholderExtractor::default);

/// Signature of `text` using the built-in patterns only
pub fn placeholder_signature(text: &str) -> PlaceholderSignature {
    DEFAULT_EXTRACTOR.extract(text)
}

/// Scans texts for protected tokens
pub struct PlaceholderExtractor {
    custom: Vec<Pattern>,
}

impl fmt::Debug for PlaceholderExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self
            .custom
            .iter()
            .map(|p| match &p.kind {
                PlaceholderKind::Custom(name) => name.as_str(),
                _ => "",
            })
            .collect();
        f.debug_struct("PlaceholderExtractor")
            .field("custom", &names)
            .finish()
    }
}

impl Default for PlaceholderExtractor {
    fn default() -> Self {
        Self { custom: Vec::new() }
    }
}

impl PlaceholderExtractor {
    /// Extractor with additional named patterns
    pub fn with_custom_patterns<'a, I>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut custom = Vec::new();
        for (name, pattern) in patterns {
            let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| ConfigError::InvalidPattern {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            custom.push(Pattern {
                kind: PlaceholderKind::Custom(name.to_string()),
                regex,
            });
        }
        Ok(Self { custom })
    }

    /// Ordered signature of `text`
    pub fn extract(&self, text: &str) -> PlaceholderSignature {
        let mut tokens = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];

            if rest.starts_with("%%") {
                pos += 2;
                continue;
            }

            match self.longest_match(rest) {
                Some((len, token)) if len > 0 => {
                    tokens.push(token);
                    pos += len;
                }
                _ => {
                    pos += rest.chars().next().map_or(1, char::len_utf8);
                }
            }
        }

        PlaceholderSignature(tokens)
    }

    /// Longest candidate at the start of `rest`; ties keep the earlier pattern
    fn longest_match(&self, rest: &str) -> Option<(usize, PlaceholderToken)> {
        let first = rest.as_bytes().first().copied()?;
        let mut best: Option<(usize, PlaceholderToken)> = None;
        let mut consider = |len: usize, kind: PlaceholderKind, token: String| {
            if best.as_ref().is_none_or(|(best_len, _)| len > *best_len) {
                best = Some((len, PlaceholderToken { kind, token }));
            }
        };

        match first {
            b'{' => {
                if let Some(m) = DOUBLE_BRACE.find(rest) {
                    consider(m.end(), PlaceholderKind::DoubleBrace, m.as_str().to_string());
                }
                if let Some((len, head)) = icu_head(rest) {
                    consider(len, PlaceholderKind::Icu, head);
                }
                if let Some(m) = BRACE.find(rest) {
                    consider(m.end(), PlaceholderKind::Brace, m.as_str().to_string());
                }
            }
            b'%' => {
                if let Some(m) = PRINTF.find(rest) {
                    consider(m.end(), PlaceholderKind::Printf, m.as_str().to_string());
                }
            }
            b'\\' => {
                if let Some(m) = BACKSLASH_REF.find(rest) {
                    consider(m.end(), PlaceholderKind::BackslashRef, m.as_str().to_string());
                }
            }
            _ => {}
        }

        for pattern in &self.custom {
            if let Some(m) = pattern.regex.find(rest) {
                consider(m.end(), pattern.kind.clone(), m.as_str().to_string());
            }
        }

        best
    }
}

/// Balanced `{var, type, ...}` at the start of `rest`, as (byte length, canonical head)
fn icu_head(rest: &str) -> Option<(usize, String)> {
    let mut depth = 0usize;
    let mut end = None;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    end = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end?;
    let inner = &rest[1..end];
    let caps = ICU_HEAD.captures(inner)?;
    let var = caps.get(1)?.as_str();
    let kind = caps.get(2)?.as_str();
    Some((end + 1, format!("{{{var}, {kind}}}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        placeholder_signature(text)
            .tokens()
            .iter()
            .map(|t| t.token.clone())
            .collect()
    }

    #[test]
    fn test_double_brace_wins_over_single_brace() {
        assert_eq!(tokens("Welcome, {{name}}!"), vec!["{{name}}"]);
        let sig = placeholder_signature("{{name}}");
        assert_eq!(sig.tokens()[0].kind, PlaceholderKind::DoubleBrace);
    }

    #[test]
    fn test_printf_and_literal_percent() {
        assert_eq!(tokens("%s has %d items, 100%% sure"), vec!["%s", "%d"]);
        assert_eq!(tokens("%1$s and %2$s"), vec!["%1$s", "%2$s"]);
        assert_eq!(tokens("%.2f %-5d %.*s"), vec!["%.2f", "%-5d", "%.*s"]);
        assert!(tokens("50% off").is_empty());
    }

    #[test]
    fn test_icu_is_canonicalised_to_head() {
        let source = "{count, plural, one {# item} other {# items}}";
        let translated = "{count, plural, one {# élément} other {# éléments}}";
        assert_eq!(tokens(source), vec!["{count, plural}"]);
        assert_eq!(placeholder_signature(source), placeholder_signature(translated));
    }

    #[test]
    fn test_brace_forms_and_backslash_refs() {
        assert_eq!(tokens("{0} of {total:n}"), vec!["{0}", "{total:n}"]);
        assert_eq!(tokens(r"Match \1 then \12"), vec![r"\1", r"\12"]);
    }

    #[test]
    fn test_repeats_and_order_are_kept() {
        assert_eq!(tokens("{a} {b} {a}"), vec!["{a}", "{b}", "{a}"]);
        assert_ne!(placeholder_signature("{a} {b}"), placeholder_signature("{b} {a}"));
    }

    #[test]
    fn test_custom_pattern_longest_match() {
        let extractor =
            PlaceholderExtractor::with_custom_patterns([("colon", r":[a-z_]+")]).unwrap();
        let sig = extractor.extract("Hi :user_name, see {link}");
        assert_eq!(sig.render(), ":user_name|{link}");
        assert_eq!(sig.tokens()[0].kind, PlaceholderKind::Custom("colon".into()));
    }

    #[test]
    fn test_invalid_custom_pattern_is_config_error() {
        let err = PlaceholderExtractor::with_custom_patterns([("broken", "(")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_diff_reports_missing_and_extra() {
        let expected = placeholder_signature("{{name}} has %d");
        let actual = placeholder_signature("has %d %s");
        let diff = expected.diff(&actual);
        assert_eq!(diff.missing, vec!["{{name}}"]);
        assert_eq!(diff.extra, vec!["%s"]);
        assert!(!diff.order_differs);

        let swapped = placeholder_signature("%d {{name}}");
        assert!(expected.diff(&swapped).order_differs);
    }

    #[test]
    fn test_multibyte_text_is_scanned_safely() {
        assert_eq!(tokens("Välkommen, {{namn}} – öppna %s"), vec!["{{namn}}", "%s"]);
    }
}
