//! CLI for `oaskit`.
//!
//! # Subcommands
//!
//! ```text
//! # Inline every external $ref into components
//! oaskit bundle --input api/openapi.yaml --output dist/openapi.yaml
//!
//! # Copy referenced files into one directory
//! oaskit localize --input api/openapi.yaml --target-dir api/vendor
//!
//! # Prune, deduplicate, strip
//! oaskit clean --input dist/openapi.yaml
//! oaskit optimize --input dist/openapi.yaml
//! oaskit sanitize --input dist/openapi.yaml --keep 'x-speakeasy-*'
//! ```

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use oaskit::{
    BundleNaming, BundleOptions, HttpClient, LocalizeNaming, LocalizeOptions, ProjectConfig,
    ResolveOptions, SanitizeOptions,
};
use serde_yaml_ng::Value;
use tracing_subscriber::EnvFilter;

/// Bundle, localize, clean, optimize, and sanitize `OpenAPI` documents.
#[derive(Parser)]
#[command(name = "oaskit", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log reference decisions (`-v` debug, `-vv` trace). Overrides `RUST_LOG`.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Inline every external `$ref` target into `components`.
    Bundle(BundleArgs),

    /// Copy every external file into one directory and point `$ref`s at the copies.
    Localize(LocalizeArgs),

    /// Remove components and tags nothing reachable uses.
    Clean(Io),

    /// Replace duplicated inline schemas with shared components.
    Optimize(Io),

    /// Strip extensions and undefined fields, then clean.
    Sanitize(SanitizeArgs),
}

/// Input/output shared by every subcommand.
#[derive(Args)]
struct Io {
    /// Path to the input `OpenAPI` document (YAML or JSON).
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the output YAML file. Defaults to overwriting `--input`.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct BundleArgs {
    #[command(flatten)]
    io: Io,

    /// Path to a project config YAML file. CLI flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Naming when a component name is already taken.
    #[arg(long, value_enum)]
    naming: Option<BundleNamingArg>,
}

#[derive(Args)]
struct LocalizeArgs {
    #[command(flatten)]
    io: Io,

    /// Path to a project config YAML file. CLI flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory that receives the copied files.
    /// Overrides `localize.target_directory` from the config file.
    #[arg(short, long)]
    target_dir: Option<String>,

    /// Naming when file base names collide.
    #[arg(long, value_enum)]
    naming: Option<LocalizeNamingArg>,
}

#[derive(Args)]
struct SanitizeArgs {
    #[command(flatten)]
    io: Io,

    /// Path to a project config YAML file. CLI flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated globs of extensions to keep.
    #[arg(long, value_delimiter = ',')]
    keep: Vec<String>,

    /// Comma-separated globs of extensions to remove (default: all not kept).
    #[arg(long, value_delimiter = ',')]
    remove: Vec<String>,

    /// Skip the final clean pass.
    #[arg(long)]
    keep_unused_components: bool,

    /// Leave fields `OpenAPI` does not define.
    #[arg(long)]
    keep_unknown_properties: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum BundleNamingArg {
    Counter,
    Filepath,
}

#[derive(Clone, Copy, ValueEnum)]
enum LocalizeNamingArg {
    PathBased,
    Counter,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Bundle(args) => run_bundle(&args),
        Command::Localize(args) => run_localize(&args),
        Command::Clean(args) => run_clean(&args),
        Command::Optimize(args) => run_optimize(&args),
        Command::Sanitize(args) => run_sanitize(&args),
    }
}

/// Install a stderr subscriber; `-v` wins over `RUST_LOG`.
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("oaskit=debug"),
        _ => EnvFilter::new("oaskit=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn run_bundle(args: &BundleArgs) -> anyhow::Result<()> {
    let project = load_project(args.config.as_deref())?;
    let mut doc = read_document(&args.io.input)?;

    let location = args.io.input.to_string_lossy();
    let http = http_client();
    let mut options = BundleOptions::new(resolve_options(&location, &*http))
        .with_project_config(&project);
    if let Some(naming) = args.naming {
        options = options.naming(match naming {
            BundleNamingArg::Counter => BundleNaming::Counter,
            BundleNamingArg::Filepath => BundleNaming::FilePath,
        });
    }

    let report = oaskit::bundle(&mut doc, &options).context("Failed to bundle document")?;
    eprintln!(
        "Bundled {} components ({} reused) from {} documents",
        report.components_added, report.components_reused, report.documents_fetched,
    );
    write_document(&doc, output_path(&args.io))
}

fn run_localize(args: &LocalizeArgs) -> anyhow::Result<()> {
    let project = load_project(args.config.as_deref())?;
    let mut doc = read_document(&args.io.input)?;

    let location = args.io.input.to_string_lossy();
    let http = http_client();
    let mut options = LocalizeOptions::new(resolve_options(&location, &*http), "")
        .with_project_config(&project);
    if let Some(dir) = &args.target_dir {
        options = options.target_directory(dir.as_str());
    }
    if let Some(naming) = args.naming {
        options = options.naming(match naming {
            LocalizeNamingArg::PathBased => LocalizeNaming::PathBased,
            LocalizeNamingArg::Counter => LocalizeNaming::Counter,
        });
    }

    let report = oaskit::localize(&mut doc, &options).context("Failed to localize document")?;
    for (original, written) in &report.files {
        eprintln!("  {original} -> {written}");
    }
    eprintln!(
        "Localized {} files, rewrote {} references",
        report.files.len(),
        report.references_rewritten,
    );
    write_document(&doc, output_path(&args.io))
}

fn run_clean(args: &Io) -> anyhow::Result<()> {
    let mut doc = read_document(&args.input)?;
    let report = oaskit::clean(&mut doc).context("Failed to clean document")?;
    eprintln!(
        "Removed {} components and {} tags",
        report.removed_components.len(),
        report.removed_tags.len(),
    );
    write_document(&doc, output_path(args))
}

fn run_optimize(args: &Io) -> anyhow::Result<()> {
    let mut doc = read_document(&args.input)?;
    let report = oaskit::optimize(&mut doc).context("Failed to optimize document")?;
    eprintln!(
        "Created {} components, replaced {} inline schemas",
        report.created.len(),
        report.replaced,
    );
    write_document(&doc, output_path(args))
}

fn run_sanitize(args: &SanitizeArgs) -> anyhow::Result<()> {
    let project = load_project(args.config.as_deref())?;
    let mut doc = read_document(&args.io.input)?;

    let mut options = SanitizeOptions::new()
        .with_project_config(&project)
        .keep_extensions(args.keep.iter().cloned())
        .remove_extensions(args.remove.iter().cloned());
    if args.keep_unused_components {
        options = options.keep_unused_components(true);
    }
    if args.keep_unknown_properties {
        options = options.keep_unknown_properties(true);
    }

    let report = oaskit::sanitize(&mut doc, &options).context("Failed to sanitize document")?;
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    eprintln!(
        "Removed {} extensions and {} unknown fields",
        report.extensions_removed, report.properties_removed,
    );
    if let Some(clean) = &report.clean {
        eprintln!(
            "Removed {} components and {} tags",
            clean.removed_components.len(),
            clean.removed_tags.len(),
        );
    }
    write_document(&doc, output_path(&args.io))
}

/// Load project config (if provided), otherwise use defaults.
fn load_project(path: Option<&Path>) -> anyhow::Result<ProjectConfig> {
    match path {
        Some(path) => {
            eprintln!("Loading config: {}", path.display());
            ProjectConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))
        }
        None => Ok(ProjectConfig::default()),
    }
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;
    let doc: Value = serde_yaml_ng::from_str(&text)
        .with_context(|| format!("Failed to parse input: {}", path.display()))?;
    if !doc.is_mapping() {
        bail!("{} is not an OpenAPI document", path.display());
    }
    Ok(doc)
}

fn write_document(doc: &Value, path: &Path) -> anyhow::Result<()> {
    let output = serde_yaml_ng::to_string(doc).context("Failed to serialize document")?;
    fs::write(path, output)
        .with_context(|| format!("Failed to write output: {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

fn output_path(io: &Io) -> &Path {
    io.output.as_deref().unwrap_or(&io.input)
}

fn resolve_options<'a>(location: &'a str, http: &'a dyn HttpClient) -> ResolveOptions<'a> {
    ResolveOptions::new(location).http(http)
}

#[cfg(feature = "http")]
fn http_client() -> Box<dyn HttpClient> {
    Box::new(oaskit::ReqwestClient::default())
}

#[cfg(not(feature = "http"))]
fn http_client() -> Box<dyn HttpClient> {
    Box::new(oaskit::NoHttp)
}
