//! omex - command-line front end for COMBINE/OMEX archive bundles

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use omex::formats::{MANIFEST_KEY, METADATA_KEY};
use omex::{registry, Archive, BundleConfig, Description, Entry, VCard};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omex")]
#[command(version)]
#[command(about = "Inspect, create and edit COMBINE/OMEX archive bundles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory where archives are unpacked while being worked on
    #[arg(long, global = true, env = "OMEX_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Timeout in seconds for fetching remote entries
    #[arg(long, global = true, env = "OMEX_FETCH_TIMEOUT")]
    timeout: Option<u64>,
}

/// Picks an entry by location, or else the first entry of a format.
#[derive(Args)]
struct Selector {
    /// Entry location inside the archive
    #[arg(short, long)]
    location: Option<String>,

    /// Entry format (alias like "sbml" or a full identifier)
    #[arg(short, long)]
    format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of an archive
    List {
        archive: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the description of an entry
    View {
        archive: PathBuf,

        #[command(flatten)]
        selector: Selector,
    },

    /// Create an empty archive
    Create {
        archive: PathBuf,
    },

    /// Add a file to an archive
    Add {
        archive: PathBuf,

        /// File to add
        file: PathBuf,

        /// Format of the file (guessed from its extension when omitted)
        #[arg(short, long)]
        format: Option<String>,

        /// Create the archive if it doesn't exist
        #[arg(short, long)]
        create: bool,

        /// Make the new entry the master
        #[arg(long)]
        master: bool,

        /// Description text for the entry
        #[arg(long)]
        description: Option<String>,

        /// Creator given name
        #[arg(long)]
        given_name: Option<String>,

        /// Creator family name
        #[arg(long)]
        family_name: Option<String>,

        /// Creator email
        #[arg(long)]
        email: Option<String>,

        /// Creator organization
        #[arg(long)]
        organization: Option<String>,
    },

    /// Remove an entry from an archive
    Remove {
        archive: PathBuf,

        #[command(flatten)]
        selector: Selector,
    },

    /// Mark an entry as the master
    SetMaster {
        archive: PathBuf,

        #[command(flatten)]
        selector: Selector,
    },

    /// Clear the master flag from an entry
    UnsetMaster {
        archive: PathBuf,

        #[command(flatten)]
        selector: Selector,
    },

    /// Copy every entry into a directory
    Extract {
        archive: PathBuf,

        /// Output directory
        dir: PathBuf,
    },

    /// Show the issues found while loading an archive
    Validate {
        archive: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the content of an entry
    Cat {
        archive: PathBuf,

        /// Entry location inside the archive
        location: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "omex=debug".parse()? } else { "omex=warn".parse()? }),
            )
            .init();
    }

    let mut config = BundleConfig::default();
    if let Some(dir) = cli.staging_dir {
        config.staging_root = dir;
    }
    if let Some(secs) = cli.timeout {
        config.fetch_timeout = Duration::from_secs(secs);
    }
    config.validate()?;

    match cli.command {
        Commands::List { archive, json } => {
            let bundle = open(&archive, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(bundle.entries())?);
            } else {
                print_entries(&bundle);
            }
            bundle.remove_staging_dir()?;
        }

        Commands::View { archive, selector } => {
            let bundle = open(&archive, &config)?;
            let entry = select(&bundle, &selector)?.clone();
            match bundle.description_of(&entry.location) {
                Some(desc) => print_description(&entry, desc),
                None => println!("No description available.\n"),
            }
            bundle.remove_staging_dir()?;
        }

        Commands::Create { archive } => {
            let mut bundle = Archive::with_config(config)?;
            bundle
                .save_to(&archive)
                .with_context(|| format!("Failed to write {}", archive.display()))?;
            println!("Created {}", archive.display());
            bundle.remove_staging_dir()?;
        }

        Commands::Add {
            archive,
            file,
            format,
            create,
            master,
            description,
            given_name,
            family_name,
            email,
            organization,
        } => {
            let mut bundle = if archive.exists() {
                open(&archive, &config)?
            } else if create {
                Archive::with_config(config)?
            } else {
                bail!("Archive {} does not exist (use --create)", archive.display());
            };

            let format = resolve_format(format.as_deref(), &file);
            if [METADATA_KEY, MANIFEST_KEY]
                .iter()
                .any(|key| registry().is_format(key, &format))
            {
                bail!("{} is written by omex itself and can't be added by hand", format);
            }
            let creator = VCard {
                given_name: given_name.unwrap_or_default(),
                family_name: family_name.unwrap_or_default(),
                email: email.unwrap_or_default(),
                organization: organization.unwrap_or_default(),
            };
            let desc = Description::new("")
                .with_description(description.unwrap_or_default())
                .with_creator(creator);

            let location = match bundle.add_entry(&file, &format, Some(desc))? {
                Some(entry) => entry.location.clone(),
                None => bail!("No such file: {}", file.display()),
            };
            if master {
                bundle.set_main_entry(&location)?;
            }

            bundle.save_to(&archive)?;
            println!("Added {} as {}", location, format);
            bundle.remove_staging_dir()?;
        }

        Commands::Remove { archive, selector } => {
            let mut bundle = open(&archive, &config)?;
            let location = select(&bundle, &selector)?.location.clone();
            bundle.remove_entry(&location);
            bundle.save_to(&archive)?;
            println!("Removed {}", location);
            bundle.remove_staging_dir()?;
        }

        Commands::SetMaster { archive, selector } => {
            let mut bundle = open(&archive, &config)?;
            let location = select(&bundle, &selector)?.location.clone();
            bundle.set_main_entry(&location)?;
            bundle.save_to(&archive)?;
            println!("Master entry is now {}", location);
            bundle.remove_staging_dir()?;
        }

        Commands::UnsetMaster { archive, selector } => {
            let mut bundle = open(&archive, &config)?;
            let entry = select(&bundle, &selector)?.clone();
            if entry.master {
                bundle.clear_main_entry();
                bundle.save_to(&archive)?;
                println!("{} is no longer the master entry", entry.location);
            } else {
                println!("{} is not the master entry", entry.location);
            }
            bundle.remove_staging_dir()?;
        }

        Commands::Extract { archive, dir } => {
            let bundle = open(&archive, &config)?;
            let count = bundle
                .extract_to(&dir)
                .with_context(|| format!("Failed to extract to {}", dir.display()))?;
            println!("Extracted {} entries to {}", count, dir.display());
            bundle.remove_staging_dir()?;
        }

        Commands::Validate { archive, json } => {
            let bundle = open(&archive, &config)?;
            let issues = bundle.validate();
            if json {
                println!("{}", serde_json::to_string_pretty(issues)?);
            } else if issues.is_empty() {
                println!("No issues.");
            } else {
                for issue in issues {
                    println!("{}", issue);
                }
            }
            bundle.remove_staging_dir()?;
        }

        Commands::Cat { archive, location } => {
            let bundle = open(&archive, &config)?;
            let text = bundle
                .entry_text(&location)
                .with_context(|| format!("Failed to read {}", location))?;
            print!("{}", text);
            bundle.remove_staging_dir()?;
        }
    }

    Ok(())
}

fn open(path: &Path, config: &BundleConfig) -> Result<Archive> {
    Archive::open_with_config(path, config.clone())
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Alias keys become canonical identifiers; anything else is used as given.
fn resolve_format(format: Option<&str>, file: &Path) -> String {
    let formats = registry();
    match format {
        Some(format) => formats
            .canonical(format)
            .map(str::to_string)
            .unwrap_or_else(|_| format.to_string()),
        None => {
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            formats.guess_format(&name).to_string()
        }
    }
}

fn select<'a>(archive: &'a Archive, selector: &Selector) -> Result<&'a Entry> {
    if let Some(location) = &selector.location {
        return archive
            .entry(location)
            .with_context(|| format!("No such entry: {}", location));
    }
    if let Some(format) = &selector.format {
        return archive
            .entries_with_format(format)
            .into_iter()
            .next()
            .with_context(|| format!("No entry with format {}", format));
    }
    bail!("Specify an entry with --location or --format");
}

fn print_entries(archive: &Archive) {
    println!("Archive:           {}", archive.archive_file_name());
    println!("Number of Entries: {}", archive.entries().len());
    println!();

    let width = archive
        .entries()
        .iter()
        .map(|e| e.location.len())
        .max()
        .unwrap_or(0);
    for entry in archive.entries() {
        let marker = if entry.master { "*" } else { " " };
        println!("{} {:<width$} : {}", marker, entry.location, entry.format, width = width);
    }
    println!();
}

fn print_description(entry: &Entry, desc: &Description) {
    println!(" location : {}", entry.location);
    println!(" format   : {}", entry.format);
    println!();
    println!(" description: {}", desc.description);
    println!();
    println!(" created: {}", omex::metadata::format_w3cdtf(&desc.created));
    for modified in &desc.modified {
        println!(" modified: {}", omex::metadata::format_w3cdtf(modified));
    }
    println!();
    for creator in &desc.creators {
        println!("  first: {}", creator.given_name);
        println!("  last : {}", creator.family_name);
        println!("  email: {}", creator.email);
        println!("  org  : {}", creator.organization);
        println!();
    }
}
