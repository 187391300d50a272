use clap::{Parser, Subcommand};
use respix::config;
use respix::document::Node;
use respix::imaging::{BackendGenerator, RustBackend};
use respix::orchestrator::{ImageOrchestrator, PassContext};
use respix::output;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "respix")]
#[command(about = "Rewrite image nodes in content documents with responsive variants")]
#[command(long_about = "\
Rewrite image nodes in content documents with responsive variants

Documents are JSON trees of {type, attrs, content} nodes. Every node with
type \"image\" and a local attrs.src is resized into each configured width
and format; the node gains srcset, sizes, width, height and originalSrc.

Source resolution:
  /photos/a.jpg    relative to --public-root
  photos/a.jpg     relative to the document's own directory
  https://...      left untouched

Results are memoized for cache_timeout seconds, so the same image
referenced from many documents is generated once per run.

Run 'respix gen-config' to generate a documented respix.toml.")]
#[command(version)]
struct Cli {
    /// Config file; repeat to layer overrides on top of earlier files
    #[arg(long, default_value = "respix.toml", global = true)]
    config: Vec<PathBuf>,

    /// Directory that `/`-prefixed image sources resolve against
    #[arg(long, default_value = "public", global = true)]
    public_root: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process documents and rewrite their image nodes
    Process {
        /// Document JSON files
        #[arg(required = true)]
        docs: Vec<PathBuf>,

        /// Write rewritten documents here instead of in place
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Validate the config and show the effective settings
    Check,
    /// Print a stock respix.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("respix=warn"),
        1 => EnvFilter::new("respix=info"),
        _ => EnvFilter::new("respix=debug"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Command::Process { docs, out_dir } => {
            let plugin_config = load(&cli.config)?;
            let generator = Arc::new(BackendGenerator::new(RustBackend::new()));
            let mut orchestrator = ImageOrchestrator::new(&plugin_config, generator)?;
            orchestrator.before_collect()?;

            if let Some(dir) = &out_dir {
                std::fs::create_dir_all(dir)?;
            }

            for doc_path in &docs {
                let mut doc: Node = serde_json::from_str(&std::fs::read_to_string(doc_path)?)?;
                let mut ctx = PassContext::new(&cli.public_root, doc_path);
                let stats = orchestrator.process_content(&mut doc, &mut ctx)?;

                let dest = destination(doc_path, out_dir.as_deref())?;
                std::fs::write(&dest, serde_json::to_string_pretty(&doc)?)?;
                let shown = out_dir.as_ref().map(|_| dest.as_path());
                output::print_document_result(doc_path, shown, &stats, &ctx.errors);
            }

            let stats = orchestrator.after_collect();
            output::print_run_summary(docs.len(), &stats);
            if stats.failed > 0 {
                return Err(format!("{} image(s) could not be processed", stats.failed).into());
            }
        }
        Command::Check => {
            let plugin_config = load(&cli.config)?;
            let options = plugin_config.resolve()?;
            output::print_config(&options);
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn load(paths: &[PathBuf]) -> Result<config::PluginConfig, config::ConfigError> {
    debug!("loading config from {:?}", paths);
    let paths: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
    config::load_config(&paths)
}

/// Where a processed document is written: in place, or under `out_dir`
/// with the same file name.
fn destination(doc: &Path, out_dir: Option<&Path>) -> Result<PathBuf, String> {
    match out_dir {
        None => Ok(doc.to_path_buf()),
        Some(dir) => doc
            .file_name()
            .map(|name| dir.join(name))
            .ok_or_else(|| format!("{} has no file name", doc.display())),
    }
}
