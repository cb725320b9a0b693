/*!
 * Translation engine for i18n catalogs.
 *
 * Submodules:
 *
 * - `memory`: translation memory artifact built from the catalogs
 * - `placeholders`: placeholder extraction and signatures
 * - `batch`: selection of missing entries into batch jobs
 * - `prompts`: translation and repair prompt construction
 * - `validator`: response parsing and validation
 * - `retry`: retry policy for transient provider failures
 * - `jobs`: async job lifecycle and polling
 * - `core`: per-batch translation with repair loop
 * - `merge`: merging validated results into catalogs
 * - `orchestrator`: one run over one target language
 */

pub use self::batch::{BatchItem, BatchJob, BatchState, select_batches};
pub use self::core::{BatchOutcome, TranslationService};
pub use self::memory::{EntryMeta, EntryStatus, MemoryArtifact, TranslationEntry};
pub use self::merge::{MergeOutcome, MergeStats, merge};
pub use self::orchestrator::{Orchestrator, RunContext, RunOptions};
pub use self::placeholders::{PlaceholderExtractor, PlaceholderSignature};
pub use self::prompts::{PromptTemplate, TranslationPromptBuilder};
pub use self::validator::{ResponseValidator, Translation, TranslationResult};

pub mod batch;
pub mod core;
pub mod jobs;
pub mod memory;
pub mod merge;
pub mod orchestrator;
pub mod placeholders;
pub mod prompts;
pub mod retry;
pub mod validator;
