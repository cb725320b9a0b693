/*!
 * Prompt templates for catalog translation.
 *
 * The prompt asks the provider for exactly one JSON object of the form
 * `{"targetLanguage": ..., "translations": [{"key": ..., "text": ...}]}`
 * covering every requested key and nothing else.
 */

use crate::language_utils::display_name;
use crate::translation::batch::BatchItem;
use crate::translation::memory::EntryMeta;

/// Instruction header of the translation prompt.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Default header for JSON-only translation.
    pub const TRANSLATION_API: &'static str = "You are a translation API. Return ONLY valid JSON. No markdown, no commentary, no explanation.\n\nTranslate these {source_language} strings to {target_language}:";

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Template built from [`Self::TRANSLATION_API`], the default for every provider.
    pub fn translation_api() -> Self {
        Self::new(Self::TRANSLATION_API)
    }

    /// Render the template with the given variables.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::translation_api()
    }
}

/// Builder for translation prompts.
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    source_language: String,
    target_language: String,
    template: PromptTemplate,
    global_context: Option<String>,
    items: Vec<BatchItem>,
}

impl TranslationPromptBuilder {
    /// Create a new prompt builder for language codes.
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            template: PromptTemplate::default(),
            global_context: None,
            items: Vec::new(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Project-wide context such as product description or tone.
    pub fn with_global_context(mut self, context: Option<&str>) -> Self {
        self.global_context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self
    }

    /// Set the entries to translate.
    pub fn with_items(mut self, items: &[BatchItem]) -> Self {
        self.items = items.to_vec();
        self
    }

    fn item_line(item: &BatchItem) -> String {
        // JSON string form keeps backslashes and quotes unambiguous
        let text = serde_json::to_string(&item.source_text).unwrap_or_else(|_| format!("\"{}\"", item.source_text));
        let mut line = format!("- {}: {}", item.key, text);

        let mut parts = meta_parts(&item.meta);
        if !item.signature.is_empty() {
            let tokens: Vec<&str> = item.signature.tokens().iter().map(|t| t.token.as_str()).collect();
            parts.push(format!("Placeholders: {}", tokens.join(" ")));
        }
        if !parts.is_empty() {
            line.push_str(&format!(" ({})", parts.join("; ")));
        }
        line
    }

    /// Build the complete prompt.
    pub fn build(&self) -> String {
        let header = self.template.render(
            &display_name(&self.source_language),
            &display_name(&self.target_language),
        );

        let context_section = match &self.global_context {
            Some(context) => format!("\nCONTEXT:\n{}\n", context),
            None => String::new(),
        };

        let items_text = self
            .items
            .iter()
            .map(Self::item_line)
            .collect::<Vec<_>>()
            .join("\n");

        let example_key = self.items.first().map_or("home.title", |i| i.key.as_str());

        format!(
            r#"{header}{context_section}
{items_text}

RULES:
- Return ONLY the JSON object below. Nothing else.
- Include every key listed above exactly once and no other keys.
- Preserve protected tokens EXACTLY and in the same order: {{{{name}}}} stays {{{{name}}}}, {{0}} stays {{0}}, %s stays %s.
- Translate only the text around protected tokens.
- Escape backslashes in JSON: \1 becomes \\1.
- Follow the context and tone guidelines provided above.

Return this exact JSON structure (replace with your translations):
{{
  "targetLanguage": "{target}",
  "translations": [
    {{"key": "{example_key}", "text": "..."}}
  ]
}}
"#,
            target = self.target_language,
        )
    }
}

fn meta_parts(meta: &EntryMeta) -> Vec<String> {
    [
        ("Description", &meta.description),
        ("Tone", &meta.tone),
        ("Screen", &meta.screen),
        ("Domain", &meta.domain),
        ("Notes", &meta.notes),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v)))
    .collect()
}
