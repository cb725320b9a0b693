use anyhow::{Result, anyhow};
use isolang::Language;

use crate::errors::ConfigError;

/// Language utilities for catalog language codes
///
/// Catalog files are named by BCP 47-style tags (`sv`, `pt-BR`, `zh_Hant`).
/// Only the primary subtag is checked against ISO 639; region and script
/// subtags are checked for shape only.
/// Language code type of the primary subtag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
}

// ISO 639-2/B codes that differ from their 639-2/T form
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Primary subtag of a tag, lowercased (`pt-BR` -> `pt`)
pub fn primary_subtag(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn lookup(primary: &str) -> Option<(Language, LanguageCodeType)> {
    match primary.len() {
        2 => Language::from_639_1(primary).map(|l| (l, LanguageCodeType::Part1)),
        3 => Language::from_639_3(primary)
            .map(|l| (l, LanguageCodeType::Part2T))
            .or_else(|| {
                PART2B_TO_PART2T
                    .iter()
                    .find(|(b, _)| *b == primary)
                    .and_then(|(_, t)| Language::from_639_3(t))
                    .map(|l| (l, LanguageCodeType::Part2B))
            }),
        _ => None,
    }
}

/// Validate a language tag; returns the type of its primary subtag
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let trimmed = code.trim();
    let mut parts = trimmed.split(['-', '_']);
    let primary = parts.next().unwrap_or_default().to_lowercase();

    let (_, code_type) = lookup(&primary).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;

    for subtag in parts {
        let shape_ok = match subtag.len() {
            2 => subtag.chars().all(|c| c.is_ascii_alphabetic()),
            3 => subtag.chars().all(|c| c.is_ascii_digit()),
            4 => subtag.chars().all(|c| c.is_ascii_alphabetic()),
            5..=8 => subtag.chars().all(|c| c.is_ascii_alphanumeric()),
            _ => false,
        };
        if !shape_ok {
            return Err(anyhow!("Invalid subtag '{}' in language code: {}", subtag, code));
        }
    }

    Ok(code_type)
}

/// Normalize the primary subtag to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let primary = primary_subtag(code);
    lookup(&primary)
        .map(|(lang, _)| lang.to_639_3().to_string())
        .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Check if two tags name the same primary language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// English name of a tag, with any region or script subtags appended
/// (`pt-BR` -> `Portuguese (BR)`)
pub fn get_language_name(code: &str) -> Result<String> {
    let (lang, _) = lookup(&primary_subtag(code))
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", code))?;

    let rest: Vec<&str> = code.trim().split(['-', '_']).skip(1).collect();
    if rest.is_empty() {
        Ok(lang.to_name().to_string())
    } else {
        Ok(format!("{} ({})", lang.to_name(), rest.join("-")))
    }
}
/// `fr` matches `fra` and `FR`; regional tags must match exactly
pub fn same_language(code1: &str, code2: &str) -> bool {
    let normalize = |code: &str| code.trim().replace('_', "-").to_ascii_lowercase();
    let (a, b) = (normalize(code1), normalize(code2));
    a == b || (!a.contains('-') && !b.contains('-') && language_codes_match(&a, &b))
}

/// A translation target must be a valid tag other than the source language
pub fn check_target_language(source_language: &str, target_language: &str) -> std::result::Result<(), ConfigError> {
    validate_language_code(target_language)
        .map_err(|_| ConfigError::InvalidLanguage(target_language.to_string()))?;
    if same_language(source_language, target_language) {
        return Err(ConfigError::InvalidLanguage(format!(
            "{} (same as the source language)",
            target_language
        )));
    }
    Ok(())
}

/// Name for prompts; unknown tags are used verbatim
pub fn display_name(code: &str) -> String {
    get_language_name(code).unwrap_or_else(|_| code.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_tags_validate_on_primary_subtag() {
        assert_eq!(validate_language_code("pt-BR").unwrap(), LanguageCodeType::Part1);
        assert_eq!(validate_language_code("zh_Hant").unwrap(), LanguageCodeType::Part1);
        assert_eq!(validate_language_code("es-419").unwrap(), LanguageCodeType::Part1);
        assert_eq!(validate_language_code("ger").unwrap(), LanguageCodeType::Part2B);
        assert!(validate_language_code("pt-B").is_err());
        assert!(validate_language_code("xx").is_err());
        assert!(validate_language_code("").is_err());
    }

    #[test]
    fn test_check_target_language_rejects_unknown_and_source() {
        assert!(check_target_language("en", "fr").is_ok());
        assert!(check_target_language("en", "en-GB").is_ok());
        assert!(matches!(check_target_language("en", "zz-not-a-lang"), Err(ConfigError::InvalidLanguage(_))));
        assert!(matches!(check_target_language("en", "EN"), Err(ConfigError::InvalidLanguage(_))));
        assert!(matches!(check_target_language("en", "eng"), Err(ConfigError::InvalidLanguage(_))));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("sv"), "Swedish");
        assert_eq!(display_name("pt-BR"), "Portuguese (BR)");
        assert_eq!(display_name("zz"), "zz");
    }
}
