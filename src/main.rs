use clap::{Args, Parser, Subcommand};
use icon_builder::assets::{AssetCache, AssetFetcher, DirAssetFetcher};
use icon_builder::bundle::{self, AuxScope, BundleError, LinkMode};
use icon_builder::cache::{BlobStore, BuildManifest};
use icon_builder::error::ErrorKind;
use icon_builder::imaging::RasterCompositor;
use icon_builder::metadata::JsonlProvider;
use icon_builder::process::{self, BuildOutcome, CancelToken, RunOptions};
use icon_builder::{config, logging, output};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "icon-builder")]
#[command(about = "Deterministic, incremental icon builder for game item catalogs")]
#[command(long_about = "\
Deterministic, incremental icon builder for game item catalogs

Every command first brings the icon directory up to date (only items whose
inputs changed are composed again), then packages the result.

Inputs:

  items.jsonl                # One item record per line
  assets/
  ├── icons/<icon_id>.png    # Item icons
  ├── graphics/<id>_64.png   # Pre-rendered model graphics
  ├── graphics/<id>_512.jpg
  ├── skins/<material>.png   # SKIN swatches
  └── res/ui/texture/...     # Backgrounds, overlays, tech badges

Icon directory:

  icons/
  ├── manifest.json          # What was built, from what
  └── blobs/<hh>/<hash>.png  # Built images, content addressed

Run 'icon-builder gen-config' to generate a documented icons.toml.")]
#[command(version)]
struct Cli {
    /// JSON-lines file of item records
    #[arg(long, default_value = "items.jsonl", global = true)]
    metadata: PathBuf,

    /// Asset mirror root
    #[arg(long, default_value = "assets", global = true)]
    assets: PathBuf,

    /// Directory holding the build manifest and built images
    #[arg(long, default_value = "icons", global = true)]
    icon_dir: PathBuf,

    /// Config file (absent = stock defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Append to --log-file instead of truncating it
    #[arg(long, global = true)]
    append_log: bool,

    /// Only log warnings and errors
    #[arg(long, global = true)]
    quiet: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Ignore the cache and rebuild every item
    #[arg(short, long, global = true)]
    force_rebuild: bool,

    /// Do nothing when no item's inputs changed
    #[arg(short, long, global = true)]
    skip_if_fresh: bool,

    /// Leave SKIN items out of the icon set
    #[arg(long, global = true)]
    skip_skins: bool,

    /// Only process this type id
    #[arg(long, global = true)]
    type_id: Option<u32>,
}

#[derive(Args)]
struct OutArg {
    /// Output path
    #[arg(short, long)]
    out: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Build, then write the hash-named service bundle
    ServiceBundle(OutArg),
    /// Build, then write the image export collection
    Iec(OutArg),
    /// Build, then update a web directory
    WebDir {
        #[command(flatten)]
        out: OutArg,
        /// Copy images instead of symlinking into the blob store
        #[arg(long, conflicts_with = "hardlink")]
        copy_files: bool,
        /// Hardlink images instead of symlinking into the blob store
        #[arg(long)]
        hardlink: bool,
    },
    /// Build, then print (or write) the icon-set checksum
    Checksum {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Dump raw icon files, skipping the build
    AuxIcons(OutArg),
    /// Dump every source asset as PNG, skipping the build
    AuxAll(OutArg),
    /// Print a stock icons.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    // A bare checksum goes to stdout, so nothing else may.
    let bare_checksum = matches!(cli.command, Command::Checksum { out: None });
    logging::init(
        cli.quiet || bare_checksum,
        cli.log_file.as_deref(),
        cli.append_log,
    )?;
    let build_config = config::load_config(&cli.config)?;
    init_thread_pool(&build_config.processing);
    let fetcher: Arc<dyn AssetFetcher> = Arc::new(DirAssetFetcher::new(&cli.assets));

    let dump = match &cli.command {
        Command::AuxIcons(arg) => Some((AuxScope::Icons, arg)),
        Command::AuxAll(arg) => Some((AuxScope::All, arg)),
        _ => None,
    };
    if let Some((scope, arg)) = dump {
        let summary = bundle::dump_assets(fetcher.as_ref(), scope, &arg.out)
            .unwrap_or_else(|e| fail(Some(e.kind()), &e));
        println!("{}", output::format_aux_summary(&summary));
        return Ok(());
    }

    let options = RunOptions {
        force_rebuild: cli.run.force_rebuild,
        skip_if_fresh: cli.run.skip_if_fresh && !bare_checksum,
        skip_skins: cli.run.skip_skins,
        single_item: cli.run.type_id,
        classify: build_config.classify_options(),
    };
    let compositor = RasterCompositor::new(build_config.encode_params());
    let cancel = CancelToken::new();
    if let Err(e) = cancel.cancel_when(tokio::signal::ctrl_c()) {
        tracing::warn!(error = %e, "cannot watch for interrupts");
    }
    let outcome = run_build(&cli, fetcher, &compositor, &options, &cancel, !bare_checksum)?;

    if outcome.no_op && !matches!(cli.command, Command::Checksum { .. }) {
        return Ok(());
    }

    let blobs = BlobStore::new(&cli.icon_dir);
    let force = cli.run.force_rebuild;
    if let Err(e) = write_bundle(cli.command, &outcome.manifest, &blobs, force) {
        fail(Some(e.kind()), &e);
    }
    Ok(())
}

/// Package the manifest the way `command` asks.
fn write_bundle(
    command: Command,
    manifest: &BuildManifest,
    blobs: &BlobStore,
    force: bool,
) -> Result<(), BundleError> {
    match command {
        Command::ServiceBundle(arg) => {
            let files = bundle::write_service_bundle(manifest, blobs, &arg.out)?;
            println!("Service bundle: {} files → {}", files, arg.out.display());
        }
        Command::Iec(arg) => {
            let files = bundle::write_export_collection(manifest, blobs, &arg.out)?;
            println!("Export collection: {} files → {}", files, arg.out.display());
        }
        Command::WebDir {
            out,
            copy_files,
            hardlink,
        } => {
            let mode = if copy_files {
                LinkMode::Copy
            } else if hardlink {
                LinkMode::Hardlink
            } else {
                LinkMode::Symlink
            };
            let summary = bundle::write_web_dir(manifest, blobs, &out.out, &mode, force)?;
            println!("{}", output::format_web_summary(&summary));
        }
        Command::Checksum { out: Some(path) } => {
            let digest = bundle::write_checksum(manifest, &path)?;
            println!("Checksum: {} → {}", digest, path.display());
        }
        Command::Checksum { out: None } => {
            println!("{}", bundle::manifest_checksum(manifest));
        }
        Command::AuxIcons(_) | Command::AuxAll(_) | Command::GenConfig => {}
    }
    Ok(())
}

/// Report a run-level failure with its kind and exit non-zero.
fn fail(kind: Option<ErrorKind>, error: &dyn std::error::Error) -> ! {
    eprintln!("{}", output::format_run_error(kind, error));
    std::process::exit(1);
}

/// Bring the icon directory up to date, printing events as they arrive
/// when `report` is set.
fn run_build(
    cli: &Cli,
    fetcher: Arc<dyn AssetFetcher>,
    compositor: &RasterCompositor,
    options: &RunOptions,
    cancel: &CancelToken,
    report: bool,
) -> Result<BuildOutcome, Box<dyn std::error::Error>> {
    let assets = AssetCache::new(fetcher);
    let mut provider = JsonlProvider::new(&cli.metadata);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            if report {
                output::print_build_event(&event);
            }
        }
    });
    let result = process::build(
        &mut provider,
        &assets,
        compositor,
        &cli.icon_dir,
        options,
        cancel,
        Some(tx),
    );
    printer
        .join()
        .map_err(|_| "output printer thread panicked")?;
    let outcome = result.unwrap_or_else(|e| fail(e.kind(), &e));

    if report {
        output::print_summary(&outcome);
    }
    Ok(outcome)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
