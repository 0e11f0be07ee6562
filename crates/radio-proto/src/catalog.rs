//! Station list loaders.
//!
//! Sources are tried in priority order by [`load_stations`]:
//! the configured `stations.toml`, a `stations.toml` beside the executable or
//! in the working directory, then the configured m3u URL or file.  An empty
//! list is a valid result; the controller shows "NO STATIONS" for it.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::protocol::Station;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid station TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to fetch station list: {0}")]
    Http(#[from] reqwest::Error),
    #[error("station list server answered HTTP {0}")]
    Status(reqwest::StatusCode),
}

pub fn parse_m3u_from_str(content: &str) -> Vec<Station> {
    let mut stations = Vec::new();
    let mut pending_name: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            if let Some(comma_idx) = rest.find(',') {
                pending_name = Some(rest[comma_idx + 1..].trim().to_string());
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let url = line.to_string();
        let name = pending_name.take().unwrap_or_else(|| url.clone());
        stations.push(Station::new(name, url));
    }

    stations
}

pub fn load_stations_from_m3u(path: &Path) -> Result<Vec<Station>, CatalogError> {
    let content = read(path)?;
    Ok(parse_m3u_from_str(&content))
}

// ── TOML station loader ───────────────────────────────────────────────────────

/// Matches the TOML `[[station]]` table.  Kept separate from `Station` so the
/// file schema can diverge from the wire struct.
#[derive(Debug, serde::Deserialize)]
struct TomlStationFile {
    #[serde(default)]
    station: Vec<TomlStation>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlStation {
    name: String,
    url: String,
    #[serde(default)]
    network: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
}

pub fn load_stations_from_toml(path: &Path) -> Result<Vec<Station>, CatalogError> {
    let content = read(path)?;
    parse_stations_from_toml_str(&content)
}

pub fn parse_stations_from_toml_str(content: &str) -> Result<Vec<Station>, CatalogError> {
    let file: TomlStationFile = toml::from_str(content)?;
    let stations = file
        .station
        .into_iter()
        .map(|s| Station {
            name: s.name,
            url: s.url,
            network: s.network,
            description: s.description,
            tags: s.tags,
            city: s.city,
            country: s.country,
        })
        .collect();
    Ok(stations)
}

fn read(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the station list from the first source that yields one.
pub async fn load_stations(config: &Config) -> Vec<Station> {
    // 1. Configured TOML (user's custom stations)
    let toml_path = &config.stations.stations_toml;
    if toml_path.exists() {
        match load_stations_from_toml(toml_path) {
            Ok(s) => {
                info!(
                    "Loaded {} stations from TOML: {}",
                    s.len(),
                    toml_path.display()
                );
                return s;
            }
            Err(e) => warn!("Failed to parse TOML stations: {}", e),
        }
    }

    // 2. stations.toml beside executable, then in working directory
    let mut fallbacks = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            fallbacks.push(dir.join("stations.toml"));
        }
    }
    fallbacks.push(PathBuf::from("stations.toml"));
    for path in fallbacks.iter().filter(|p| p.exists()) {
        match load_stations_from_toml(path) {
            Ok(s) => {
                info!("Loaded {} stations from {}", s.len(), path.display());
                return s;
            }
            Err(e) => warn!("Failed to parse {}: {}", path.display(), e),
        }
    }

    // 3. m3u URL or file
    let source = config.stations.m3u_url.trim();
    if source.starts_with("http://") || source.starts_with("https://") {
        info!("Loading stations from m3u: {}", source);
        match fetch_m3u_url(source).await {
            Ok(s) => {
                info!("Loaded {} stations from URL", s.len());
                return s;
            }
            Err(e) => warn!("Failed to fetch stations from URL: {}", e),
        }
    } else if !source.is_empty() {
        let path = PathBuf::from(source);
        match load_stations_from_m3u(&path) {
            Ok(s) => {
                info!("Loaded {} stations from m3u file", s.len());
                return s;
            }
            Err(e) => warn!("Failed to read m3u file: {}", e),
        }
    }

    info!("No station source available, starting with empty list");
    Vec::new()
}

async fn fetch_m3u_url(url: &str) -> Result<Vec<Station>, CatalogError> {
    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(CatalogError::Status(response.status()));
    }
    let text = response.text().await?;
    Ok(parse_m3u_from_str(&text))
}
