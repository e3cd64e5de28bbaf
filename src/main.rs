//! cloud-init-seed - build cloud-init seed images
//!
//! Reads one or more seed profiles and writes a NoCloud, EC2, GCE or
//! ConfigDrive seed image, or prints individual documents.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use cloud_init_seed::config::CloudConfig;
use cloud_init_seed::config::loader::load_profiles;
use cloud_init_seed::image::{self, ManifestWriter};
use cloud_init_seed::network::render;
use cloud_init_seed::SeedConfig;

#[derive(Parser)]
#[command(name = "cloud-init-seed")]
#[command(author, version, about = "Build cloud-init seed images", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ProfileArgs {
    /// Seed profile (YAML or JSON); later profiles override earlier ones
    #[arg(
        short,
        long = "profile",
        required = true,
        env = "CLOUD_INIT_SEED_PROFILE",
        value_delimiter = ','
    )]
    profiles: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the seed image
    Build {
        #[command(flatten)]
        profiles: ProfileArgs,
        /// Output image path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print one rendered document
    Render {
        #[command(flatten)]
        profiles: ProfileArgs,
        document: Document,
    },
    /// Print the image manifest without building an image
    Manifest {
        #[command(flatten)]
        profiles: ProfileArgs,
    },
    /// List the label and files of an existing image
    Inspect {
        /// Image to read
        image: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Document {
    UserData,
    MetaData,
    NetworkConfig,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn load_seed(args: &ProfileArgs) -> Result<SeedConfig> {
    let profile = load_profiles(&args.profiles).context("Failed to load seed profiles")?;
    profile
        .into_seed_config()
        .context("Failed to build seed configuration")
}

/// Write the image beside `output` first so a failure never leaves a
/// complete-looking file behind
fn build_image(config: &SeedConfig, output: &Path) -> Result<()> {
    let file_name = output
        .file_name()
        .with_context(|| format!("Invalid output path {}", output.display()))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".partial");
    let temp_path = output.with_file_name(temp_name);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        image::assemble_image(config, &mut file)?;
        file.sync_all()?;
        fs::rename(&temp_path, output)
            .with_context(|| format!("Failed to move image to {}", output.display()))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn render_document(config: &SeedConfig, document: Document) -> Result<String> {
    let datasource = config.kind().datasource();
    let rendered = match document {
        Document::UserData => CloudConfig::from_seed(config)?.to_document()?,
        Document::MetaData => datasource.render_metadata(config)?,
        Document::NetworkConfig => {
            if config.interfaces().is_empty() {
                bail!("No interfaces configured, the seed has no network document");
            }
            render::render(datasource.network_renderer(), config.interfaces())?
        }
    };
    Ok(rendered)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build { profiles, output } => {
            let config = load_seed(&profiles)?;
            build_image(&config, &output)?;
            info!("Wrote {} seed image to {}", config.kind(), output.display());
        }
        Commands::Render { profiles, document } => {
            let config = load_seed(&profiles)?;
            let rendered = render_document(&config, document)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            if !rendered.ends_with('\n') {
                writeln!(stdout)?;
            }
        }
        Commands::Manifest { profiles } => {
            let config = load_seed(&profiles)?;
            image::assemble_with(&ManifestWriter, &config, &mut io::stdout().lock())?;
        }
        Commands::Inspect { image: path } => {
            let bytes =
                fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let parsed = image::read_image(&bytes)
                .with_context(|| format!("{} is not a readable ISO 9660 image", path.display()))?;
            println!("label: {}", parsed.label());
            for entry in &parsed.entries {
                println!("{:>8}  {}", entry.content.len(), entry.path);
            }
        }
    }

    Ok(())
}
