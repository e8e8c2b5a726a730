//! xschema command line.
//!
//! `xschema generate` runs the full pipeline: parse config documents,
//! retrieve schemas, fan out to adapters, write the generated module and
//! rewire the client file.

mod ui;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use xschema_lib::language;
use xschema_lib::parser;
use xschema_lib::pipeline::{self, PipelineOptions};
use xschema_lib::retriever;

use ui::ProgressRenderer;

#[derive(Parser, Debug)]
#[command(name = "xschema")]
#[command(version, about = "JSON Schema to native validators", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse config documents, convert schemas, output native validators
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Project directory to search for config documents
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    /// Output directory for the generated module
    #[arg(short, long, default_value = ".xschema")]
    output: PathBuf,

    /// Target language when config documents mix languages
    #[arg(long)]
    lang: Option<String>,

    /// Client source file to rewire after generation
    #[arg(long)]
    client: Option<PathBuf>,

    /// Regex pattern for config files to include
    #[arg(long, value_name = "REGEX")]
    include: Option<String>,

    /// Regex pattern for config files to exclude
    #[arg(long, value_name = "REGEX")]
    exclude: Option<String>,

    /// Only run adapters whose identifier contains this substring
    #[arg(long)]
    adapter: Option<String>,

    /// Maximum concurrent schema fetches
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// HTTP timeout per attempt, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    http_timeout: u64,

    /// Total attempts per URL (1 disables retries)
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Disable the schema dedup cache
    #[arg(long)]
    no_cache: bool,

    /// Show the generation plan without writing anything
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(verbose: u8) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,xschema_lib=info".to_string(),
            _ => "info,xschema_lib=debug".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(verbose >= 2)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            ctrl_c_cancel.cancel();
        }
    });

    let Command::Generate(args) = cli.command;
    if let Err(code) = generate(args, &cancel).await {
        std::process::exit(code);
    }
}

async fn generate(args: GenerateArgs, cancel: &CancellationToken) -> Result<(), i32> {
    let mut renderer = ProgressRenderer::new();

    let lang_filter = match &args.lang {
        Some(name) => match language::by_name(name) {
            Some(lang) => Some(lang),
            None => {
                let known: Vec<&str> = language::LANGUAGES.iter().map(|l| l.name).collect();
                renderer.error(&format!(
                    "unknown language \"{name}\"; supported: {}",
                    known.join(", ")
                ));
                return Err(2);
            }
        },
        None => None,
    };

    let parse_options = match build_parser_options(&args) {
        Ok(options) => options,
        Err(message) => {
            renderer.error(&message);
            return Err(2);
        }
    };

    let options = PipelineOptions {
        project: args.project,
        out_dir: args.output,
        language: lang_filter,
        client_file: args.client,
        adapter_filter: args.adapter,
        parse: parse_options,
        retrieve: retriever::Options {
            concurrency: args.concurrency,
            http_timeout: Duration::from_secs(args.http_timeout),
            retries: args.retries,
            no_cache: args.no_cache,
        },
        dry_run: args.dry_run,
    };

    match pipeline::run(&options, cancel, |event| renderer.handle(&event)).await {
        Ok(summary) => {
            if summary.declarations == 0 && summary.generated_file.is_none() {
                eprintln!("no xschema declarations found");
            }
            Ok(())
        }
        Err(error) => {
            renderer.error(&error.to_string());
            Err(1)
        }
    }
}

/// Compiles the `--include`/`--exclude` patterns. An invalid pattern is a
/// hard error before any pipeline stage runs.
fn build_parser_options(args: &GenerateArgs) -> Result<parser::Options, String> {
    let mut options = parser::Options::default();
    if let Some(pattern) = &args.include {
        options.include = Some(
            Regex::new(pattern).map_err(|e| format!("invalid --include regex: {e}"))?,
        );
    }
    if let Some(pattern) = &args.exclude {
        options.exclude = Some(
            Regex::new(pattern).map_err(|e| format!("invalid --exclude regex: {e}"))?,
        );
    }
    Ok(options)
}
