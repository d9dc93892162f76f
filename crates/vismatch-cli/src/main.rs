//! CLI entry point for the vismatch backend (for dev and testing).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vismatch_core::{
    app_data_dir, ingest_directory, ingest_images, load_config, load_config_from, match_image,
    scan_images, set_catalog_root, status, watch_catalog, Config, ImagePreprocessor, ImageSource,
    MatchRequest, PooledExtractor, SharedEngine, SimilarityEngine,
};

#[derive(Parser)]
#[command(name = "vismatch")]
#[command(about = "vismatch: find catalog products that look like a photo")]
struct Cli {
    /// Read config from this file instead of the app data directory.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// More log output (-v info, -vv debug). RUST_LOG applies when absent.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status and catalog size.
    Status,
    /// Show where vismatch stores its config, index and metadata.
    DataDir,
    /// Remember a directory of catalog images.
    SetCatalog {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// List catalog images in a directory.
    Scan {
        /// Defaults to the configured catalog directory.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Embed and index every image in a directory, then save.
    Ingest {
        /// Defaults to the configured catalog directory.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Find catalog products similar to an image. Prints JSON.
    Match {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
        /// Maximum number of candidates to score.
        #[arg(long)]
        top_k: Option<usize>,
        /// Drop results scoring below this (0 to 1).
        #[arg(long)]
        min_similarity: Option<f32>,
    },
    /// Print every catalog product as JSON.
    Products,
    /// Watch a catalog directory and ingest new images as they appear.
    Watch {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => match load_config_from(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => load_config(),
    };

    let result = match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => show_status(&config),
        Commands::DataDir => match app_data_dir() {
            Some(p) => {
                println!("{}", p.display());
                Ok(())
            }
            None => Err("could not determine app data directory".to_string()),
        },
        Commands::SetCatalog { path } => set_catalog_root(&path)
            .map(|()| println!("Catalog directory set to {}", path.display()))
            .map_err(|e| e.to_string()),
        Commands::Scan { path } => scan(&config, path),
        Commands::Ingest { path } => ingest(&config, path),
        Commands::Match {
            image,
            top_k,
            min_similarity,
        } => {
            let request = MatchRequest {
                top_k: top_k.unwrap_or(config.top_k),
                min_similarity: min_similarity.unwrap_or(config.min_similarity),
            };
            find_matches(&config, image, request)
        }
        Commands::Products => products(&config),
        Commands::Watch { path } => watch(&config, path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn open_engine(config: &Config) -> Result<SharedEngine, String> {
    let paths = config
        .storage_paths()
        .ok_or("could not determine where to store the index")?;
    let engine = SimilarityEngine::open(config.dimension, paths).map_err(|e| e.to_string())?;
    Ok(SharedEngine::new(engine))
}

fn catalog_dir(config: &Config, path: Option<PathBuf>) -> Result<PathBuf, String> {
    path.or_else(|| config.catalog_root())
        .ok_or_else(|| "no directory given and no catalog directory configured".to_string())
}

fn preprocessor(config: &Config) -> ImagePreprocessor {
    ImagePreprocessor::new().with_max_bytes(config.max_image_bytes)
}

fn show_status(config: &Config) -> Result<(), String> {
    println!("vismatch backend");
    println!("  core: {}", status());
    println!("  dimension: {}", config.dimension);
    match open_engine(config) {
        Ok(engine) => {
            let engine = engine.read();
            println!("  products: {}", engine.len());
            println!("  index: {}", engine.paths().index.display());
            println!("  metadata: {}", engine.paths().metadata.display());
        }
        Err(e) => println!("  engine: unavailable ({})", e),
    }
    Ok(())
}

fn scan(config: &Config, path: Option<PathBuf>) -> Result<(), String> {
    let root = catalog_dir(config, path)?;
    let images = scan_images(&root, &config.allowed_extensions).map_err(|e| e.to_string())?;
    println!("Found {} image(s) under {}", images.len(), root.display());
    for image in images {
        println!("  {}", image.display());
    }
    Ok(())
}

fn ingest(config: &Config, path: Option<PathBuf>) -> Result<(), String> {
    let root = catalog_dir(config, path)?;
    let engine = open_engine(config)?;
    let extractor = PooledExtractor::new(config.dimension);
    let report = ingest_directory(
        &engine,
        &root,
        &config.allowed_extensions,
        &preprocessor(config),
        &extractor,
    )
    .map_err(|e| e.to_string())?;

    println!(
        "Added {}, skipped {}, failed {} (catalog now {} product(s))",
        report.added.len(),
        report.skipped.len(),
        report.failed.len(),
        engine.len()
    );
    for (path, e) in &report.failed {
        println!("  failed {}: {}", path.display(), e);
    }
    Ok(())
}

fn find_matches(config: &Config, image: PathBuf, request: MatchRequest) -> Result<(), String> {
    let engine = open_engine(config)?;
    let extractor = PooledExtractor::new(config.dimension);
    let response = match_image(
        &engine,
        &preprocessor(config),
        &extractor,
        &ImageSource::Path(image),
        request,
    )
    .map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn products(config: &Config) -> Result<(), String> {
    let engine = open_engine(config)?;
    let json = serde_json::to_string_pretty(&serde_json::json!({ "products": engine.list_all() }))
        .map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn watch(config: &Config, path: Option<PathBuf>) -> Result<(), String> {
    let root = catalog_dir(config, path)?;
    let engine = open_engine(config)?;
    let preprocessor = preprocessor(config);
    let extractor = PooledExtractor::new(config.dimension);

    println!("Watching {} (Ctrl+C to stop)", root.display());
    watch_catalog(&root, config.allowed_extensions.clone(), move |scanned| {
        let images = match scanned {
            Ok(images) => images,
            Err(e) => {
                eprintln!("Scan error: {}", e);
                return;
            }
        };
        let report = ingest_images(&engine, &images, &preprocessor, &extractor);
        if report.added.is_empty() {
            return;
        }
        match engine.persist() {
            Ok(()) => println!(
                "Added {} image(s), catalog now {} product(s)",
                report.added.len(),
                engine.len()
            ),
            Err(e) => eprintln!("Failed to save index: {}", e),
        }
    })
    .map_err(|e| e.to_string())
}
