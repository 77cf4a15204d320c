use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{debug, info};

use coverkeep::config_persistence::{default_config_path, load_or_create_config};
use coverkeep::db_manager::DbManager;
use coverkeep::image_pipeline::{probe_dimensions, ImagePostProcessor};
use coverkeep::providers::http_transport::HttpTransport;
use coverkeep::{AlbumRef, ArtistRef, CacheStore, FetchFailure, ImageLookup};

#[derive(Parser)]
#[command(name = "coverkeep", about = "Inspect and maintain the local artwork cache")]
struct Cli {
    /// Config file, defaults to the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artwork database, defaults to the user cache directory
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective artwork configuration
    Config,
    /// Show the cache state of an artist image
    Artist {
        name: String,
        #[arg(long)]
        mbid: Option<String>,
    },
    /// Show the cache state of an album cover
    Album {
        name: String,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        mbid: Option<String>,
    },
    /// Download an image and store it for an artist or an album
    Download {
        url: String,
        #[arg(long, conflicts_with = "album")]
        artist: Option<String>,
        #[arg(long)]
        album: Option<String>,
        #[arg(long = "album-artist")]
        album_artist: Option<String>,
        #[arg(long)]
        mbid: Option<String>,
    },
    /// Count cached images and negative markers
    Stats,
    /// Remove every cached image and negative marker
    Clear,
    /// Run the storage post-processor on an image file
    Normalize { input: PathBuf, output: PathBuf },
}

fn open_cache(db_path: Option<&Path>) -> Result<CacheStore, Box<dyn std::error::Error>> {
    let db_manager = match db_path {
        Some(path) => DbManager::open(path)?,
        None => DbManager::new()?,
    };
    Ok(CacheStore::new(Arc::new(db_manager)))
}

fn describe(lookup: &ImageLookup) -> String {
    match lookup {
        ImageLookup::Found(bytes) => match probe_dimensions(bytes) {
            Some((width, height)) => format!("cached ({} bytes, {width}x{height})", bytes.len()),
            None => format!("cached ({} bytes)", bytes.len()),
        },
        ImageLookup::NegativeCached => "not found (negative marker)".to_string(),
        ImageLookup::NotAttempted => "never fetched".to_string(),
    }
}

/// Payload to store for a download. Throttled requests store nothing so
/// the entity can be retried; other failures become the negative marker.
fn downloaded_payload(
    url: &str,
    result: Result<Vec<u8>, FetchFailure>,
) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>> {
    match result {
        Ok(bytes) => Ok(Some(bytes)),
        Err(FetchFailure::RateLimited) => {
            Err(format!("download of {url} was rate limited, nothing stored").into())
        }
        Err(failure) => {
            info!("Download of {url} failed: {failure:?}");
            Ok(None)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_or_create_config(&config_path)?;
    debug!("Loaded config from {}", config_path.display());

    match cli.command {
        Commands::Config => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string(&config)?);
        }
        Commands::Artist { name, mbid } => {
            let cache = open_cache(cli.db.as_deref())?;
            let artist = ArtistRef::new(name).with_mbid(mbid.unwrap_or_default());
            println!("{}", describe(&cache.artist_image(&artist)?));
        }
        Commands::Album { name, artist, mbid } => {
            let cache = open_cache(cli.db.as_deref())?;
            let album =
                AlbumRef::new(name, artist.unwrap_or_default()).with_mbid(mbid.unwrap_or_default());
            println!("{}", describe(&cache.album_image(&album)?));
        }
        Commands::Download {
            url,
            artist,
            album,
            album_artist,
            mbid,
        } => {
            let cache = open_cache(cli.db.as_deref())?;
            let transport = HttpTransport::new();
            let payload = downloaded_payload(&url, transport.get_bytes(&url))?;
            let image = ImagePostProcessor::from_config(&config).prepare_for_storage(payload);
            if let Some(album_name) = album {
                let album = AlbumRef::new(album_name, album_artist.unwrap_or_default())
                    .with_mbid(mbid.unwrap_or_default());
                cache.put_album_image(&album, image.as_deref())?;
                println!("{}", describe(&cache.album_image(&album)?));
            } else if let Some(artist_name) = artist {
                let artist = ArtistRef::new(artist_name).with_mbid(mbid.unwrap_or_default());
                cache.put_artist_image(&artist, image.as_deref())?;
                println!("{}", describe(&cache.artist_image(&artist)?));
            } else {
                return Err("download needs --artist or --album".into());
            }
        }
        Commands::Stats => {
            let stats = open_cache(cli.db.as_deref())?.stats()?;
            println!(
                "artists: {} images, {} not found",
                stats.artist_images, stats.artist_not_found
            );
            println!(
                "albums:  {} images, {} not found",
                stats.album_images, stats.album_not_found
            );
        }
        Commands::Clear => {
            let removed = open_cache(cli.db.as_deref())?.clear()?;
            println!("removed {removed} rows");
        }
        Commands::Normalize { input, output } => {
            let bytes = fs::read(&input)?;
            let processor = ImagePostProcessor::from_config(&config);
            match processor.normalize(&bytes)? {
                Some(rescaled) => {
                    fs::write(&output, &rescaled)?;
                    println!("rescaled {} -> {}", input.display(), output.display());
                }
                None => {
                    fs::write(&output, &bytes)?;
                    println!("{} already fits, copied unchanged", input.display());
                }
            }
        }
    }

    Ok(())
}
