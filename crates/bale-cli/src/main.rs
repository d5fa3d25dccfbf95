//! # bale CLI
//!
//! Command-line front-end for the bale archive engine. Object URLs
//! (`s3://bucket/key`) resolve against the local object store rooted at
//! `store.root`; any other location is a plain filesystem path.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use bale_config::{init_logging, log_cli_info, Config, LogLevel};
use bale_pack::{ArchiveEngine, BuildRequest, DeletionReport};
use bale_store::{LocalStore, Location, ObjectUrl};

const PROJECT_CONFIG: &str = ".bale/config.toml";

/// bale - consolidate small objects into one tar archive plus a CSV manifest
#[derive(Parser)]
#[command(name = "bale")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory backing the object store
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    /// Concurrent object fetches
    #[arg(short = 'j', long, global = true)]
    workers: Option<usize>,

    /// error, warn, info, debug or trace
    #[arg(long, global = true, env = "BALE_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive every object under a prefix, then validate the result
    Archive(ArchiveArgs),

    /// Check that an archive matches its manifest
    Validate {
        manifest: Location,
        archive: Location,
    },

    /// Delete originals whose ETag matches the archived hash
    Delete {
        manifest: Location,

        /// Archive to validate before deleting
        archive: Option<Location>,

        /// Skip validation
        #[arg(long)]
        no_validate: bool,

        /// Report what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy one archived object out of an archive
    Extract {
        manifest: Location,
        archive: Location,

        /// Object to extract (s3://bucket/key)
        object: ObjectUrl,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args)]
struct ArchiveArgs {
    /// Bucket and prefix to archive (s3://bucket/prefix)
    source: ObjectUrl,

    /// Manifest destination
    manifest: Location,

    /// Archive destination
    archive: Location,

    /// Prefix removed from keys to form entry names
    #[arg(long)]
    strip_prefix: Option<String>,

    /// Replace existing destinations
    #[arg(long)]
    overwrite: bool,

    /// Skip validation after building
    #[arg(long)]
    no_validate: bool,

    /// Delete hash-matched originals after a successful build
    #[arg(long)]
    delete: bool,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration file locations
    Path,
    /// Write a default project configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(root) = cli.store_root {
        config.store.root = root;
    }
    if let Some(workers) = cli.workers {
        config.archive.workers = workers;
        config.archive.normalize();
    }
    init_logging(cli.log_level.unwrap_or_else(|| config.log.level()));

    match cli.command {
        Commands::Archive(args) => cmd_archive(&engine(&config)?, args),
        Commands::Validate { manifest, archive } => {
            cmd_validate(&engine(&config)?, &manifest, &archive)
        }
        Commands::Delete {
            manifest,
            archive,
            no_validate,
            dry_run,
        } => cmd_delete(
            &engine(&config)?,
            &manifest,
            archive.as_ref(),
            no_validate,
            dry_run,
        ),
        Commands::Extract {
            manifest,
            archive,
            object,
            out,
        } => cmd_extract(&engine(&config)?, &manifest, &archive, &object, out.as_deref()),
        Commands::Config { command } => cmd_config(&config, command),
    }
}

fn engine(config: &Config) -> Result<ArchiveEngine> {
    let store = LocalStore::new(&config.store.root).with_context(|| {
        format!("Failed to open object store at {}", config.store.root.display())
    })?;
    log_cli_info!(
        "Using object store",
        root = config.store.root.display().to_string().as_str(),
        workers = config.archive.workers,
    );
    Ok(ArchiveEngine::new(Arc::new(store), config.archive.clone()))
}

fn cmd_archive(engine: &ArchiveEngine, args: ArchiveArgs) -> Result<()> {
    let request = BuildRequest {
        source: args.source,
        manifest: args.manifest,
        archive: args.archive,
        strip_prefix: args.strip_prefix,
        overwrite: args.overwrite,
    };
    let summary = engine
        .build(&request)
        .with_context(|| format!("Failed to archive {}", request.source))?;
    println!(
        "Archived {} objects ({} bytes) into {} ({} bytes)",
        summary.entries, summary.bytes, request.archive, summary.archive_size
    );
    println!("Manifest: {}", request.manifest);

    if !args.no_validate {
        cmd_validate(engine, &request.manifest, &request.archive)?;
    }
    if args.delete {
        let report = engine.delete_originals(&request.manifest, false)?;
        print_report(&report, false)?;
    }
    Ok(())
}

fn cmd_validate(engine: &ArchiveEngine, manifest: &Location, archive: &Location) -> Result<()> {
    let summary = engine
        .validate(manifest, archive)
        .with_context(|| format!("{} does not match {}", archive, manifest))?;
    println!(
        "Validated {} entries ({} bytes) in {}",
        summary.entries, summary.bytes, archive
    );
    Ok(())
}

fn cmd_delete(
    engine: &ArchiveEngine,
    manifest: &Location,
    archive: Option<&Location>,
    no_validate: bool,
    dry_run: bool,
) -> Result<()> {
    if !no_validate {
        let Some(archive) = archive else {
            bail!("An archive location is required for validation (or pass --no-validate)");
        };
        cmd_validate(engine, manifest, archive)?;
    }
    let report = engine.delete_originals(manifest, dry_run)?;
    print_report(&report, dry_run)
}

fn print_report(report: &DeletionReport, dry_run: bool) -> Result<()> {
    let mut failed = 0;
    for (bucket, deletion) in report {
        if dry_run {
            println!(
                "s3://{}: would delete {} objects, {} kept (ETag mismatch)",
                bucket,
                deletion.eligible.len(),
                deletion.mismatched.len()
            );
        } else {
            println!(
                "s3://{}: deleted {} of {} objects, {} failed, {} kept (ETag mismatch)",
                bucket,
                deletion.deleted.len(),
                deletion.eligible.len(),
                deletion.errors.len(),
                deletion.mismatched.len()
            );
        }
        for key in &deletion.mismatched {
            println!("  kept: {}", key);
        }
        for key in &deletion.errors {
            println!("  failed: {}", key);
        }
        failed += deletion.errors.len();
    }
    if failed > 0 {
        bail!("{} objects could not be deleted", failed);
    }
    Ok(())
}

fn cmd_extract(
    engine: &ArchiveEngine,
    manifest: &Location,
    archive: &Location,
    object: &ObjectUrl,
    out: Option<&Path>,
) -> Result<()> {
    match out {
        Some(path) => {
            let mut file = BufWriter::new(
                File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
            );
            let copied = engine.extract_to(manifest, archive, object, &mut file)?;
            file.flush()?;
            println!("Extracted {} ({} bytes) to {}", object, copied, path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            engine.extract_to(manifest, archive, object, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

fn cmd_config(config: &Config, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global: {}", path.display()),
                None => println!("Global: (no home directory)"),
            }
            println!("Project: {}", PROJECT_CONFIG);
        }
        ConfigCommands::Init { force } => {
            let path = Path::new(PROJECT_CONFIG);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", PROJECT_CONFIG);
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, Config::default_toml())?;
            println!("Wrote {}", PROJECT_CONFIG);
        }
    }
    Ok(())
}
