//! RO-Crate CLI
//!
//! Command-line tool for creating, inspecting and converting RO-Crates.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::Level;

use rocrate_io::{
    CrateError, CrateReader, CrateWriter, FolderStorage, RoCrate, RoCrateBuilder, SaveOptions,
    SaveReport, ZipStorage,
};
use zip::CompressionMethod;

#[derive(Parser)]
#[command(name = "rocrate-io")]
#[command(about = "Create, inspect and convert RO-Crates")]
#[command(version)]
struct Cli {
    /// Log progress, not just warnings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a crate folder holding only metadata
    Init(InitArgs),
    /// Print a crate's metadata document
    Show(ShowArgs),
    /// Write a crate folder as a zip archive
    Pack(ConvertArgs),
    /// Write a zipped crate as a folder
    Unpack(ConvertArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Directory to create; must be absent or empty
    dir: PathBuf,

    #[arg(long, default_value = "")]
    name: String,

    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Args)]
struct ShowArgs {
    /// Crate folder, its ro-crate-metadata.json, or a zip archive
    source: PathBuf,

    /// Read the source as a zip archive (implied by a .zip extension)
    #[arg(long)]
    zip: bool,

    /// Single-line JSON output
    #[arg(long)]
    compact: bool,
}

#[derive(Args)]
struct ConvertArgs {
    source: PathBuf,

    destination: PathBuf,

    /// Single-line metadata document
    #[arg(long)]
    compact: bool,

    /// Store zip entries without compression
    #[arg(long)]
    stored: bool,

    /// Exit with an error when any payload was skipped
    #[arg(long)]
    strict: bool,
}

impl ConvertArgs {
    fn save_options(&self) -> SaveOptions {
        SaveOptions {
            pretty: !self.compact,
        }
    }

    fn zip_storage(&self) -> ZipStorage {
        if self.stored {
            ZipStorage::default().with_compression(CompressionMethod::Stored)
        } else {
            ZipStorage::default()
        }
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

fn read_any(source: &Path, zip: bool) -> Result<RoCrate, CrateError> {
    if zip || is_zip(source) {
        CrateReader::new(ZipStorage::default()).read_crate(source)
    } else {
        CrateReader::new(FolderStorage).read_crate(source)
    }
}

fn print_report(report: SaveReport, strict: bool) -> Result<(), CrateError> {
    // each skipped payload was already logged at warn level
    if !report.is_complete() {
        eprintln!("{} payload(s) skipped", report.warnings.len());
    }
    eprintln!(
        "Wrote {} entries to {}",
        report.entries.len(),
        report.destination.display()
    );
    if strict {
        report.into_result()?;
    }
    Ok(())
}

fn run_init(args: InitArgs) -> Result<(), CrateError> {
    let crate_ = RoCrateBuilder::new(args.name, args.description).build()?;
    let report = CrateWriter::new(FolderStorage).save(&crate_, &args.dir)?;
    print_report(report, false)
}

fn run_show(args: ShowArgs) -> Result<(), CrateError> {
    let crate_ = read_any(&args.source, args.zip)?;
    println!("{}", crate_.json_metadata_with(!args.compact)?);
    Ok(())
}

fn run_pack(args: ConvertArgs) -> Result<(), CrateError> {
    let crate_ = CrateReader::new(FolderStorage).read_crate(&args.source)?;
    let report = CrateWriter::new(args.zip_storage())
        .with_options(args.save_options())
        .save(&crate_, &args.destination)?;
    print_report(report, args.strict)
}

fn run_unpack(args: ConvertArgs) -> Result<(), CrateError> {
    let crate_ = CrateReader::new(ZipStorage::default()).read_crate(&args.source)?;
    let report = CrateWriter::new(FolderStorage)
        .with_options(args.save_options())
        .save(&crate_, &args.destination)?;
    print_report(report, args.strict)
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::INFO } else { Level::WARN })
        .init();

    let result = match cli.command {
        Commands::Init(args) => run_init(args),
        Commands::Show(args) => run_show(args),
        Commands::Pack(args) => run_pack(args),
        Commands::Unpack(args) => run_unpack(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
