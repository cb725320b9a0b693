/*!
 * Prompt construction for catalog translation.
 *
 * This module provides:
 * - The translation prompt asking for a strict JSON object
 * - The repair prompt fed back after an invalid response
 */

pub mod repair;
pub mod templates;

// Re-export main types
pub use repair::build_repair_prompt;
pub use templates::{PromptTemplate, TranslationPromptBuilder};
