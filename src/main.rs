#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use i18n_translator::app_config::{self, Config, TranslationProvider};
use i18n_translator::app_controller::{Controller, RunRequest};
use i18n_translator::file_utils::FileManager;
use i18n_translator::ledger::RunSummary;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    #[value(name = "lmstudio")]
    LMStudio,
    #[value(name = "openrouter")]
    OpenRouter,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
            CliTranslationProvider::OpenRouter => TranslationProvider::OpenRouter,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Options shared by every subcommand
#[derive(Args, Debug)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "i18n-translator.json")]
    config: String,

    /// Translation provider to use
    #[arg(short, long, global = true, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Maximum entries per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Product or tone description added to every prompt
    #[arg(long, global = true, conflicts_with = "context_file")]
    context: Option<String>,

    /// File holding the global prompt context
    #[arg(long, global = true)]
    context_file: Option<PathBuf>,

    /// JSON file mapping keys to prompt context
    #[arg(long, global = true)]
    meta_file: Option<String>,

    /// Directory for run ledgers
    #[arg(long, global = true)]
    runs_dir: Option<String>,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the translation memory from the catalog directory
    BuildMemory {
        #[arg(long)]
        i18n_dir: Option<String>,
        /// Memory file to write
        #[arg(long)]
        output: Option<String>,
        #[arg(long)]
        source_lang: Option<String>,
    },

    /// Validate a saved provider response
    Validate {
        #[arg(value_name = "RESPONSE_FILE")]
        response_file: PathBuf,
        #[arg(long)]
        memory_file: Option<String>,
        /// Check the full contract for this language against the memory file
        #[arg(long)]
        target_lang: Option<String>,
        /// Keys the response must cover (defaults to the keys it contains)
        #[arg(long, value_delimiter = ',', requires = "target_lang")]
        keys: Vec<String>,
    },

    /// Merge a saved results file into a target catalog
    WriteBack {
        #[arg(long)]
        memory_file: Option<String>,
        #[arg(long)]
        i18n_dir: Option<String>,
        #[arg(long)]
        target_lang: String,
        /// Overwrite existing translations
        #[arg(short, long)]
        force: bool,
        /// Results file: {"targetLanguage": ..., "translations": [...]}
        #[arg(long)]
        results: PathBuf,
    },

    /// Translate the missing entries of one language using the memory file
    TranslateMissing {
        #[arg(long)]
        memory_file: Option<String>,
        #[arg(long)]
        i18n_dir: Option<String>,
        #[arg(long)]
        target_lang: String,
        /// Overwrite existing translations
        #[arg(short, long)]
        force: bool,
        /// Batches in flight at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Build the memory, translate and write back
    Run {
        #[arg(long)]
        i18n_dir: Option<String>,
        /// Target languages, comma separated (defaults to the configured ones)
        #[arg(long, value_delimiter = ',')]
        target_lang: Vec<String>,
        /// Overwrite existing translations
        #[arg(short, long)]
        force: bool,
        /// Only rebuild the memory file
        #[arg(long)]
        skip_translate: bool,
    },

    /// Generate shell completions for i18n-translator
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// i18n-translator - fill missing i18n catalog entries with LLM translations
#[derive(Parser, Debug)]
#[command(name = "i18n-translator")]
#[command(version)]
#[command(about = "Translate missing i18n catalog entries with LLM providers")]
#[command(long_about = "i18n-translator builds a translation memory from JSON catalogs, sends the missing
entries to an LLM provider in batches, validates every answer (placeholders included)
and merges only new translations back. Existing translations are never overwritten
unless --force is given.

EXAMPLES:
    i18n-translator run                                  # Build, translate and write back
    i18n-translator run --target-lang fr,de -p openai    # Specific languages and provider
    i18n-translator build-memory --i18n-dir locales      # Only build the memory file
    i18n-translator translate-missing --target-lang fr   # Translate from an existing memory
    i18n-translator validate response.json --target-lang fr
    i18n-translator write-back --target-lang fr --results fr.results.json
    i18n-translator completions bash > i18n-translator.bash

SUPPORTED PROVIDERS:
    ollama     - Local Ollama server
    openai     - OpenAI API (requires OPENAI_API_KEY or api_key)
    anthropic  - Anthropic API (requires ANTHROPIC_API_KEY or api_key)
    lmstudio   - LM Studio local server (OpenAI-compatible)
    openrouter - OpenRouter (requires OPENROUTER_API_KEY or api_key)")]
struct CommandLineOptions {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: log::Level) -> &'static str {
        match level {
            log::Level::Error => "\x1B[1;31m",
            log::Level::Warn => "\x1B[1;33m",
            log::Level::Info => "\x1B[1;32m",
            log::Level::Debug => "\x1B[1;36m",
            log::Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Load the config file and apply command line overrides
fn load_config(common: &CommonArgs) -> Result<Config> {
    let mut config = Config::load_or_create(&common.config)?;

    if let Some(provider) = &common.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &common.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(batch_size) = common.batch_size {
        config.translation.common.batch_size = batch_size;
    }
    if let Some(context) = &common.context {
        config.translation.common.global_context = Some(context.clone());
    }
    if let Some(path) = &common.context_file {
        let context = FileManager::read_to_string(path)?;
        config.translation.common.global_context = Some(context.trim().to_string());
    }
    if let Some(meta_file) = &common.meta_file {
        config.paths.meta_file = Some(meta_file.clone());
    }
    if let Some(runs_dir) = &common.runs_dir {
        config.paths.runs_dir = runs_dir.clone();
    }
    if let Some(log_level) = &common.log_level {
        config.log_level = log_level.clone().into();
    }

    Ok(config)
}

fn print_summaries(summaries: &[RunSummary]) {
    for summary in summaries {
        println!("{}", summary.render());
        if !summary.is_clean() {
            warn!(
                "{} entr{} of {} could not be translated, rerun to retry them",
                summary.failed,
                if summary.failed == 1 { "y" } else { "ies" },
                summary.target_language
            );
        }
    }
}

/// Cancel `token` on Ctrl-C; in-flight requests stop waiting
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current run summary");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "i18n-translator", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = load_config(&cli.common)?;
    log::set_max_level(config.log_level.to_level_filter());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::BuildMemory { i18n_dir, output, source_lang } => {
            if let Some(dir) = i18n_dir {
                config.paths.i18n_dir = dir;
            }
            if let Some(output) = output {
                config.paths.memory_file = output;
            }
            if let Some(lang) = source_lang {
                config.source_language = lang;
            }
            let controller = Controller::with_config(config)?;
            let artifact = controller.build_memory()?;
            info!("Memory built: {} entries", artifact.len());
        }
        Commands::Validate { response_file, memory_file, target_lang, keys } => {
            if let Some(memory_file) = memory_file {
                config.paths.memory_file = memory_file;
            }
            let controller = Controller::with_config(config)?;
            let report = controller.validate_file(&response_file, target_lang.as_deref(), &keys)?;
            if report.is_valid() {
                println!("VALID: {} translation(s)", report.translations);
            } else {
                println!("INVALID:");
                for err in &report.errors {
                    println!("  - {}", err);
                }
            }
        }
        Commands::WriteBack { memory_file, i18n_dir, target_lang, force, results } => {
            if let Some(memory_file) = memory_file {
                config.paths.memory_file = memory_file;
            }
            if let Some(dir) = i18n_dir {
                config.paths.i18n_dir = dir;
            }
            let controller = Controller::with_config(config)?;
            let stats = controller.write_back(&target_lang, &results, force)?;
            println!(
                "{}: {} updated, {} skipped, {} unchanged",
                target_lang, stats.updated, stats.skipped, stats.unchanged
            );
        }
        Commands::TranslateMissing { memory_file, i18n_dir, target_lang, force, concurrency } => {
            if let Some(memory_file) = memory_file {
                config.paths.memory_file = memory_file;
            }
            if let Some(dir) = i18n_dir {
                config.paths.i18n_dir = dir;
            }
            if let Some(n) = concurrency {
                config.translation.common.concurrent_batches = n;
            }
            let controller = Controller::with_config(config)?;
            let summary = controller
                .translate_from_memory(&target_lang, force, &cancel)
                .await
                .inspect_err(|e| error!("{:#}", e))?;
            print_summaries(&[summary]);
        }
        Commands::Run { i18n_dir, target_lang, force, skip_translate } => {
            if let Some(dir) = i18n_dir {
                config.paths.i18n_dir = dir;
            }
            let controller = Controller::with_config(config)?;
            let request = RunRequest {
                target_languages: target_lang,
                force,
                skip_translate,
            };
            let summaries = controller
                .run(&request, &cancel)
                .await
                .context("Run aborted")?;
            print_summaries(&summaries);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
