use clap::{Parser, Subcommand};
use memory_match::catalog::Catalog;
use memory_match::config::{self, GameConfig};
use memory_match::engine::Engine;
use memory_match::imaging::Quality;
use memory_match::normalizer::Normalizer;
use memory_match::output;
use memory_match::server;
use memory_match::store::MemoryStore;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "memory-match")]
#[command(about = "Two-player memory matching game over a folder of photos")]
#[command(long_about = "\
Two-player memory matching game over a folder of photos

Each round samples width*height/2 images from the image directory and deals
every one twice, face down. Cards must be square: square photos are used as
they are, others go through a crop step in the browser first. Cropped
squares are cached and reused in later rounds.

Image directory:

  img/
  ├── beach.jpg                 # Base images (jpg, jpeg, png, gif, webp)
  ├── harbor.png
  └── squared/                  # Derivative cache, managed by the server
      ├── beach_square.jpg
      └── harbor_square.jpg

Run 'memory-match gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing file means stock defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the game server
    Serve {
        /// Listen port (overrides PORT and config.toml)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List the image catalog and what each image still needs
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    match cli.command {
        Command::Serve { port } => {
            let config = config::load_config(&cli.config)?;
            let port = resolve_port(port, &config);
            let bind: IpAddr = config.bind.parse()?;
            let engine = Engine::new(
                MemoryStore::with_capacity(config.max_sessions),
                &config.image_dir,
                Quality::new(config.jpeg_quality),
                config.board(),
            );
            let board = engine.board_size();
            info!(
                image_dir = %config.image_dir,
                grid = %config.grid,
                width = board.width,
                height = board.height,
                "starting memory-match {}",
                version_string()
            );

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(Arc::new(engine), SocketAddr::new(bind, port)))?;
        }
        Command::Check => {
            let config = config::load_config(&cli.config)?;
            let root = PathBuf::from(&config.image_dir);
            let normalizer = Normalizer::new(&root, Quality::new(config.jpeg_quality));
            let inventory: Vec<_> = Catalog::new(&root)
                .all_images()?
                .into_iter()
                .map(|name| {
                    let status = normalizer.status(&name);
                    (name, status)
                })
                .collect();
            output::print_check_output(&root, &inventory, &config.grid, config.board());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `--port` beats `PORT`, which beats `config.toml`.
fn resolve_port(flag: Option<u16>, config: &GameConfig) -> u16 {
    flag.or_else(|| std::env::var("PORT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(config.port)
}
