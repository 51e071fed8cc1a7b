use crate::config::InputConfig;
use crate::topology::Topology;
use crate::types::StatRecord;
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a resource comes from: a remote URL or a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    File(PathBuf),
}

impl Source {
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            Source::Url(s.to_string())
        } else {
            Source::File(PathBuf::from(s))
        }
    }

    fn is_csv(&self) -> bool {
        match self {
            Source::File(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false),
            Source::Url(_) => false,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Url(url) => write!(f, "{}", url),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Both inputs, loaded. `topology` is `None` when the payload was `null`.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub statistics: Vec<StatRecord>,
    pub topology: Option<Topology>,
}

pub struct Loader {
    client: reqwest::Client,
}

impl Loader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("choropleth/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn from_config(config: &InputConfig) -> Result<Self> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }

    /// Fetches statistics and topology concurrently; fails if either fails.
    pub async fn load_inputs(&self, config: &InputConfig) -> Result<Inputs> {
        let statistics_source = Source::parse(&config.statistics);
        let topology_source = Source::parse(&config.topology);

        let (statistics, topology) = tokio::try_join!(
            self.load_statistics(&statistics_source),
            self.load_topology(&topology_source),
        )?;

        Ok(Inputs { statistics, topology })
    }

    /// A `null` payload is treated as an empty list.
    pub async fn load_statistics(&self, source: &Source) -> Result<Vec<StatRecord>> {
        if source.is_csv() {
            if let Source::File(path) = source {
                return load_csv_statistics(path).await;
            }
        }
        let records: Option<Vec<StatRecord>> = self.fetch_json(source).await?;
        let records = records.unwrap_or_default();
        tracing::info!(count = records.len(), %source, "loaded statistics");
        Ok(records)
    }

    pub async fn load_topology(&self, source: &Source) -> Result<Option<Topology>> {
        let topology: Option<Topology> = self.fetch_json(source).await?;
        match &topology {
            Some(t) => tracing::info!(arcs = t.arcs.len(), objects = t.objects.len(), %source, "loaded topology"),
            None => tracing::warn!(%source, "topology payload was empty"),
        }
        Ok(topology)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, source: &Source) -> Result<T> {
        match source {
            Source::Url(url) => {
                tracing::debug!(%url, "fetching");
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to fetch {}", url))?
                    .error_for_status()
                    .with_context(|| format!("Bad response from {}", url))?;
                let body = response
                    .text()
                    .await
                    .with_context(|| format!("Failed to read body of {}", url))?;
                parse_json(&body, source)
            }
            Source::File(path) => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read file: {:?}", path))?;
                parse_json(&content, source)
            }
        }
    }
}

fn parse_json<T: DeserializeOwned>(content: &str, source: &Source) -> Result<T> {
    // An empty body counts as "no payload".
    let content = if content.trim().is_empty() { "null" } else { content };
    serde_json::from_str(content).with_context(|| format!("Failed to parse JSON from {}", source))
}

/// Reads statistics from a CSV with `fips,area_name,state,bachelorsOrHigher` columns.
pub async fn load_csv_statistics(path: &Path) -> Result<Vec<StatRecord>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let records = parse_csv_statistics(&content, path)?;
    tracing::info!(count = records.len(), ?path, "loaded statistics from CSV");
    Ok(records)
}

fn parse_csv_statistics(content: &str, path: &Path) -> Result<Vec<StatRecord>> {
    let mut rdr = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = rdr.headers()?.clone();
    for required in ["fips", "area_name", "state", "bachelorsOrHigher"] {
        if !headers.iter().any(|h| h == required) {
            return Err(anyhow!("Column '{}' not found in CSV {:?}", required, path));
        }
    }

    let mut records = Vec::new();
    for (line, result) in rdr.deserialize::<StatRecord>().enumerate() {
        let record = result.with_context(|| format!("Bad CSV record {} in {:?}", line + 1, path))?;
        records.push(record);
    }
    Ok(records)
}
