use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

use crate::projection::Projection;

pub const EDUCATION_URL: &str =
    "https://cdn.freecodecamp.org/testable-projects-fcc/data/choropleth_map/for_user_education.json";
pub const COUNTIES_URL: &str =
    "https://cdn.freecodecamp.org/testable-projects-fcc/data/choropleth_map/counties.json";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub statistics: String, // URL or local .json/.csv path
    pub topology: String,   // URL or local TopoJSON path
    pub regions_object: String,
    pub boundaries_object: String,
    pub timeout_secs: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            statistics: EDUCATION_URL.to_string(),
            topology: COUNTIES_URL.to_string(),
            regions_object: "counties".to_string(),
            boundaries_object: "states".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    pub width: f64,
    pub height: f64,
    pub projection: Projection,
    pub no_data_color: String,
    pub boundary_color: String,
    pub legend: LegendConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 975.0,
            height: 610.0,
            projection: Projection::Identity,
            no_data_color: "#ccc".to_string(),
            boundary_color: "white".to_string(),
            legend: LegendConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LegendConfig {
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub ticks: usize,
    pub tick_suffix: String,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self {
            title: "Education attainment percentage (bachelor's degree or higher)".to_string(),
            x: 610.0,
            y: 20.0,
            width: 260.0,
            ticks: 8,
            tick_suffix: "%".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub svg: String,
    pub geojson: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            svg: "map.svg".to_string(),
            geojson: "counties.geojson".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn svg_path(&self) -> PathBuf {
        self.dir.join(&self.svg)
    }

    pub fn geojson_path(&self) -> PathBuf {
        self.dir.join(&self.geojson)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML configuration")
    }

    /// Loads `path` when it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!(?path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}
