use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use facesift_bridge::{BridgeClient, SendMessageRequest};
use facesift_core::files::extension_allowed;
use facesift_core::{best_match, Config, EncodingProvider, IdentityRegistry};
use facesift_encoder::{ModelVariant, OnnxProvider};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Parser)]
#[command(name = "facesift", about = "facesift operator CLI", version)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known identities and their reference images
    Identities,
    /// Detect and match faces in an image without touching it
    Match {
        /// Image file to inspect
        image: PathBuf,
    },
    /// Send a text message through the bridge
    Send {
        /// Destination group or channel identifier
        destination: String,
        /// Message text
        message: String,
        /// Send at a local wall-clock time ("YYYY-MM-DD HH:MM")
        #[arg(long)]
        at: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Identities => cmd_identities(&config),
        Commands::Match { image } => cmd_match(&config, &image),
        Commands::Send { destination, message, at } => {
            cmd_send(&config, &destination, &message, at.as_deref())
        }
    }
}

fn cmd_identities(config: &Config) -> Result<()> {
    let identities = scan_identities(
        &config.face_detection.known_faces_dir,
        &config.media.allowed_extensions,
    )
    .with_context(|| {
        format!(
            "reading known-faces directory {}",
            config.face_detection.known_faces_dir.display()
        )
    })?;

    if identities.is_empty() {
        println!("no identities found");
        return Ok(());
    }

    let mut total_references = 0usize;
    for (name, count) in &identities {
        total_references += count;
        match config.destinations.get(name) {
            Some(dest) => {
                println!("{name}: {count} reference image(s), destination {}", dest.group)
            }
            None => println!("{name}: {count} reference image(s), no destination configured"),
        }
    }
    println!("{} identities, {} reference images", identities.len(), total_references);
    Ok(())
}

fn cmd_match(config: &Config, image: &Path) -> Result<()> {
    let variant: ModelVariant = config
        .face_detection
        .model
        .parse()
        .context("face_detection.model")?;
    let provider = OnnxProvider::load(&config.face_detection.model_dir, variant)
        .context("loading face models")?;
    let registry = IdentityRegistry::load(
        &provider,
        &config.face_detection.known_faces_dir,
        &config.media.allowed_extensions,
    )
    .context("loading known faces")?;
    println!(
        "loaded {} identities ({} reference images)",
        registry.len(),
        registry.reference_count()
    );

    let faces = provider
        .detect_faces(image)
        .with_context(|| format!("analyzing {}", image.display()))?;

    if faces.is_empty() {
        println!("no faces detected");
        return Ok(());
    }

    let policy = config.match_policy();
    for (index, face) in faces.iter().enumerate() {
        let bb = &face.bounding_box;
        println!(
            "face {}: {}x{} at ({}, {}), confidence {:.2}",
            index + 1,
            bb.width,
            bb.height,
            bb.x,
            bb.y,
            bb.confidence
        );
        match best_match(&face.encoding, &registry, &policy) {
            Some(result) => println!(
                "  matched {} (distance {:.3}, votes {}/{})",
                result.identity, result.best_distance, result.votes_matched, result.votes_total
            ),
            None => println!("  no match"),
        }
    }
    Ok(())
}

fn cmd_send(config: &Config, destination: &str, message: &str, at: Option<&str>) -> Result<()> {
    if let Some(at) = at {
        let target = NaiveDateTime::parse_from_str(at, SCHEDULE_FORMAT)
            .with_context(|| format!("--at must be formatted as {SCHEDULE_FORMAT:?}"))?;
        wait_until(target);
    }

    let client = BridgeClient::new(&config.notifier.endpoint, config.notification_timeout())?;
    client.send(&SendMessageRequest::text(destination, message))?;
    println!("message sent to {destination}");
    Ok(())
}

/// Identity sub-directories under `root` with their reference-image
/// counts, in name order.
fn scan_identities(root: &Path, allowed: &[String]) -> std::io::Result<Vec<(String, usize)>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut identities = Vec::new();
    for dir in dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let count = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && extension_allowed(path, allowed))
            .count();
        identities.push((name.to_string(), count));
    }
    Ok(identities)
}

/// Sleep until the target local time. A target in the past sends
/// immediately with a warning instead of failing.
fn wait_until(target: NaiveDateTime) {
    let now = Local::now().naive_local();
    if target <= now {
        eprintln!("scheduled time {} is in the past; sending now", target.format(SCHEDULE_FORMAT));
        return;
    }

    let wait = (target - now).to_std().unwrap_or_default();
    println!("waiting {} (until {})", format_wait(wait), target.format(SCHEDULE_FORMAT));
    std::thread::sleep(wait);
}

fn format_wait(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
