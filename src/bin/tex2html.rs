//! CLI binary for edgequake-tex2html.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig` and either runs the web service, converts one file, or
//! sweeps the upload directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_tex2html::{
    convert_file, converter, serve, ConverterKind, ServiceConfig, Tex2HtmlError, UploadStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the upload service on :5000 with the ar5ivist container
  tex2html serve

  # Same, with latexmlc installed on the host
  tex2html serve --converter local --port 8080

  # Convert one file (writes paper.html next to it)
  tex2html convert paper.tex

  # Delete uploads and artifacts older than a day
  tex2html sweep --retention-secs 86400

ENVIRONMENT VARIABLES:
  UPLOAD_FOLDER                 Upload directory (default: ./temp)
  TEX2HTML_HOST / TEX2HTML_PORT Bind address (default: 127.0.0.1:5000)
  TEX2HTML_CONVERTER            container | local
  TEX2HTML_DOCKER               Container client (default: docker)
  TEX2HTML_IMAGE                Converter image (default: latexml/ar5ivist:latest)
  TEX2HTML_LATEXMLC             latexmlc executable
  TEX2HTML_RETENTION_SECS       Enable the background sweeper
  RUST_LOG                      Override log filter

SETUP:
  1. Pull the image:  docker pull latexml/ar5ivist:latest
  2. Serve:           tex2html serve
  3. Upload:          curl -F file=@paper.tex http://127.0.0.1:5000/
"#;

/// Upload LaTeX sources over HTTP and convert them to HTML with latexmlc.
#[derive(Parser, Debug)]
#[command(
    name = "tex2html",
    version,
    about = "Upload LaTeX sources over HTTP and convert them to HTML with latexmlc",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TEX2HTML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TEX2HTML_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the upload/convert web service.
    Serve(ServeArgs),
    /// Convert a single .tex file.
    Convert(ConvertArgs),
    /// Delete expired files from the upload directory once.
    Sweep(SweepArgs),
}

/// Flags shared by every subcommand that talks to the converter.
#[derive(Args, Debug, Clone)]
struct ConverterArgs {
    /// Where latexmlc runs: container or local.
    #[arg(long, env = "TEX2HTML_CONVERTER", value_enum, default_value = "container")]
    converter: ConverterArg,

    /// Container client binary.
    #[arg(long, env = "TEX2HTML_DOCKER", default_value = "docker")]
    docker: String,

    /// Converter image.
    #[arg(long, env = "TEX2HTML_IMAGE", default_value = "latexml/ar5ivist:latest")]
    image: String,

    /// latexmlc executable (inside the container or on the host).
    #[arg(long, env = "TEX2HTML_LATEXMLC", default_value = "latexmlc")]
    latexmlc: String,

    /// latexmlc --timeout in seconds.
    #[arg(long, env = "TEX2HTML_TOOL_TIMEOUT", default_value_t = 2700)]
    tool_timeout: u64,

    /// Host-side bound on one invocation in seconds.
    #[arg(long, env = "TEX2HTML_CONVERTER_TIMEOUT", default_value_t = 2760)]
    converter_timeout: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Upload directory.
    #[arg(long, env = "UPLOAD_FOLDER")]
    upload_dir: Option<PathBuf>,

    /// Bind host.
    #[arg(long, env = "TEX2HTML_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Bind port.
    #[arg(short, long, env = "TEX2HTML_PORT", default_value_t = 5000)]
    port: u16,

    /// Maximum upload size in bytes.
    #[arg(long, env = "TEX2HTML_MAX_UPLOAD_BYTES", default_value_t = 64 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Delete uploads and artifacts older than this many seconds.
    #[arg(long, env = "TEX2HTML_RETENTION_SECS")]
    retention_secs: Option<u64>,

    /// How often the sweeper runs, in seconds.
    #[arg(long, env = "TEX2HTML_SWEEP_INTERVAL_SECS", default_value_t = 600)]
    sweep_interval_secs: u64,

    #[command(flatten)]
    converter: ConverterArgs,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// LaTeX source file.
    input: PathBuf,

    /// Write HTML to this file instead of <input>.html.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable the spinner.
    #[arg(long, env = "TEX2HTML_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    converter: ConverterArgs,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Upload directory.
    #[arg(long, env = "UPLOAD_FOLDER")]
    upload_dir: Option<PathBuf>,

    /// Age in seconds past which files are deleted.
    #[arg(long, env = "TEX2HTML_RETENTION_SECS")]
    retention_secs: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ConverterArg {
    Container,
    Local,
}

impl From<ConverterArg> for ConverterKind {
    fn from(v: ConverterArg) -> Self {
        match v {
            ConverterArg::Container => ConverterKind::Container,
            ConverterArg::Local => ConverterKind::Local,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Convert(args) => run_convert(args, cli.quiet).await,
        Command::Sweep(args) => run_sweep(args, cli.quiet).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut builder = apply_converter(ServiceConfig::builder(), &args.converter)
        .host(args.host)
        .port(args.port)
        .max_upload_bytes(args.max_upload_bytes)
        .sweep_interval_secs(args.sweep_interval_secs);
    if let Some(dir) = args.upload_dir {
        builder = builder.upload_dir(dir);
    }
    if let Some(secs) = args.retention_secs {
        builder = builder.retention_secs(secs);
    }
    let config = builder.build().context("Invalid configuration")?;

    serve(config).await.context("Server failed")
}

async fn run_convert(args: ConvertArgs, quiet: bool) -> Result<()> {
    let config = apply_converter(ServiceConfig::builder(), &args.converter)
        .build()
        .context("Invalid configuration")?;
    let backend = converter::from_config(&config);

    let spinner = (!quiet && !args.no_progress).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(format!("latexmlc ({}) {}", backend.name(), args.input.display()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = convert_file(&args.input, args.output.as_deref(), backend.as_ref()).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    match result {
        Ok(output) => {
            if !quiet {
                eprintln!(
                    "{}  {}  {}ms  {} warnings  →  {}",
                    green("✔"),
                    args.input.display(),
                    output.duration_ms,
                    output.warning_count(),
                    bold(&output.artifact.display().to_string()),
                );
            }
            Ok(())
        }
        Err(Tex2HtmlError::Conversion(e)) => {
            eprintln!("{} {}", red("✘"), e);
            let details = e.details();
            if !details.trim().is_empty() {
                eprintln!("{}", dim(details.trim_end()));
            }
            std::process::exit(1);
        }
        Err(e) => Err(e).context("Conversion failed"),
    }
}

async fn run_sweep(args: SweepArgs, quiet: bool) -> Result<()> {
    let dir = match args.upload_dir {
        Some(d) => d,
        None => ServiceConfig::default().upload_dir,
    };
    let store = UploadStore::open(&dir)
        .await
        .with_context(|| format!("Failed to open upload directory {:?}", dir))?;
    let report = store
        .sweep(Duration::from_secs(args.retention_secs))
        .await
        .context("Sweep failed")?;

    if !quiet {
        for name in &report.removed {
            eprintln!("  {} {}", dim("removed"), name);
        }
        eprintln!(
            "{} {} files removed{}",
            green("✔"),
            bold(&report.removed.len().to_string()),
            if report.failed > 0 {
                red(&format!(", {} failed", report.failed))
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

/// Map converter flags onto the config builder.
fn apply_converter(
    builder: edgequake_tex2html::ServiceConfigBuilder,
    args: &ConverterArgs,
) -> edgequake_tex2html::ServiceConfigBuilder {
    builder
        .converter(args.converter.clone().into())
        .docker_bin(args.docker.clone())
        .image(args.image.clone())
        .latexmlc(args.latexmlc.clone())
        .tool_timeout_secs(args.tool_timeout)
        .converter_timeout_secs(args.converter_timeout)
}
