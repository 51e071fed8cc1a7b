use choropleth::config::AppConfig;
use choropleth::data::Loader;
use choropleth::render::{build_scene, Scene};
use choropleth::{export, server};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the choropleth to an SVG file
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Export the joined regions as GeoJSON
    Export {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Render, then serve the map and the hover API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

async fn load_scene(config: &AppConfig) -> anyhow::Result<Scene> {
    let loader = Loader::from_config(&config.input)?;
    let inputs = loader.load_inputs(&config.input).await?;
    build_scene(config, inputs.topology.as_ref(), &inputs.statistics)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config } => {
            let app_config = AppConfig::load_or_default(config)?;
            let scene = load_scene(&app_config).await?;
            scene.write_svg(&app_config.output.svg_path())?;
        }
        Commands::Export { config } => {
            let app_config = AppConfig::load_or_default(config)?;
            let scene = load_scene(&app_config).await?;
            export::write_geojson(&scene, &app_config.output.geojson_path())?;
        }
        Commands::Serve { config } => {
            let app_config = AppConfig::load_or_default(config)?;
            let scene = load_scene(&app_config).await?;
            // Keep the static copy in sync with what the server hands out.
            scene.write_svg(&app_config.output.svg_path())?;
            server::start_server(app_config, scene).await?;
        }
    }

    Ok(())
}
