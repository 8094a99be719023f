//! Binary entry point for jnext.
//!
//! This binary provides the CLI interface for the jnext chat pipeline.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use jnext::JnextConfig;
use jnext::cli::{self, ChatArgs, OutputFormat};
use jnext::llm::CancelToken;
use jnext::observability::{self, InitOptions};
use jnext::services::{DEFAULT_CREATIVITY, DEFAULT_KNOWLEDGE_LIMIT};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// jnext - topic-scoped chat across several model backends.
#[derive(Parser)]
#[command(name = "jnext")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "JNEXT_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Output format: table, json, or yaml.
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Expose Prometheus metrics on an HTTP listener while running.
    #[arg(long, global = true)]
    metrics_listen: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Answer an utterance.
    Chat {
        /// The utterance.
        utterance: String,

        /// Backend id, or `all` to ask every enabled backend.
        #[arg(short, long)]
        backend: Option<String>,

        /// Topic scope id.
        #[arg(short, long)]
        scope: Option<String>,

        /// Creativity in [0, 1].
        #[arg(long, default_value_t = DEFAULT_CREATIVITY)]
        creativity: f64,

        /// Knowledge focus in 0..=100.
        #[arg(long, default_value_t = 0)]
        focus: u8,

        /// Overall deadline in seconds, retries included.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show the intent of an utterance.
    Classify {
        /// The utterance.
        utterance: String,

        /// Topic scope id whose categories to match.
        #[arg(short, long)]
        scope: Option<String>,
    },

    /// Manage topic scopes.
    Scopes {
        #[command(subcommand)]
        action: ScopesAction,
    },

    /// List configured backends.
    Backends,

    /// Inspect or add captured documents.
    Captures {
        #[command(subcommand)]
        action: CapturesAction,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Scope actions.
#[derive(Subcommand)]
enum ScopesAction {
    /// List registered scopes.
    List,

    /// Create a scope with the generic constitution.
    Create {
        /// Scope id (lowercase letters and underscores).
        id: String,

        /// Display name.
        display_name: String,

        /// Short description.
        #[arg(short, long, default_value = "")]
        description: String,
    },
}

/// Capture actions.
#[derive(Subcommand)]
enum CapturesAction {
    /// List captured documents of a scope, newest first.
    List {
        /// Scope id.
        scope: String,

        /// Maximum number of documents.
        #[arg(short, long, default_value_t = DEFAULT_KNOWLEDGE_LIMIT)]
        limit: usize,
    },

    /// Save text directly, bypassing the quality gate.
    Save {
        /// Scope id.
        scope: String,

        /// The content to save.
        content: String,

        /// Document title.
        #[arg(short, long, default_value = "Untitled")]
        title: String,

        /// Document category.
        #[arg(long, default_value = "general")]
        category: String,
    },
}

fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "jnext", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let config = match JnextConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: cli.metrics_listen,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &JnextConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut service = cli::build_chat_service(config)?;
    let format = cli.format;

    match cli.command {
        Commands::Chat {
            utterance,
            backend,
            scope,
            creativity,
            focus,
            timeout_secs,
        } => {
            let args = ChatArgs {
                utterance,
                backend,
                scope,
                creativity,
                focus,
                timeout_secs,
            };
            let cancel = args.cancel_token();
            install_interrupt_handler(&cancel);
            cli::cmd_chat(&service, &args, &config.default_backend, &cancel, format)
        },

        Commands::Classify { utterance, scope } => {
            cli::cmd_classify(&service, &utterance, scope.as_deref(), format)
        },

        Commands::Scopes { action } => match action {
            ScopesAction::List => cli::cmd_scopes_list(&service, format),
            ScopesAction::Create {
                id,
                display_name,
                description,
            } => cli::cmd_scopes_create(&mut service, &id, &display_name, &description),
        },

        Commands::Backends => cli::cmd_backends(&service, format),

        Commands::Captures { action } => match action {
            CapturesAction::List { scope, limit } => {
                cli::cmd_captures_list(&service, &scope, limit, format)
            },
            CapturesAction::Save {
                scope,
                content,
                title,
                category,
            } => cli::cmd_captures_save(&service, &scope, &title, &category, &content),
        },

        Commands::Completions { .. } => Ok(()),
    }
}

/// Cancels the in-flight request on Ctrl-C instead of killing the process.
fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }
}
