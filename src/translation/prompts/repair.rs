/*!
 * Repair prompt for invalid translation responses.
 */

use crate::errors::ValidationFailure;

/// Prompt asking the provider to correct `invalid_response`.
///
/// Lists every violated constraint, then the offending output, then the
/// original request so the provider can answer it again.
pub fn build_repair_prompt(
    original_prompt: &str,
    invalid_response: &str,
    failure: &ValidationFailure,
) -> String {
    let errors = failure
        .errors
        .iter()
        .map(|e| format!("- {}", e.repair_instruction()))
        .collect::<Vec<_>>()
        .join("\n");

    let shown_response = if invalid_response.trim().is_empty() {
        "(empty response)"
    } else {
        invalid_response
    };

    format!(
        r#"The previous translation response was invalid. Please fix it.

ERRORS:
{errors}

INVALID RESPONSE:
{shown_response}

ORIGINAL REQUEST:
{original_prompt}

Please provide a corrected JSON response that:
1. Is valid JSON (parseable)
2. Contains the fields targetLanguage and translations (array)
3. Has exactly one translation for every requested key and no other keys
4. Uses non-empty strings for every "text"
5. Preserves placeholders exactly as in the source, in the same order

Return ONLY the corrected JSON, no markdown, no commentary.
"#
    )
}
