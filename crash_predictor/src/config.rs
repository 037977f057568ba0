use anyhow::{Context, Result};
use std::{fs, net::SocketAddr, path::PathBuf};

use crate::{bounds::GeoBounds, model::ModelFormat};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_path: PathBuf,
    pub model_path: PathBuf,
    pub model_format: ModelFormat,
    pub meta_path: Option<PathBuf>,
    pub geo_bounds_path: Option<PathBuf>,
    pub addr: SocketAddr,
    pub log_predictions: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_path = resolve_path(&get("DATA_PATH").unwrap_or_else(|| "data/cleaned.csv".to_string()));
        let model_path =
            resolve_path(&get("MODEL_PATH").unwrap_or_else(|| "saves/crash_regressor.json".to_string()));
        let model_format = match get("MODEL_FORMAT") {
            Some(s) => s.parse().map_err(anyhow::Error::msg)?,
            None => ModelFormat::Trees,
        };
        let meta_path = get("META_PATH").map(|p| resolve_path(&p));
        let geo_bounds_path = get("GEO_BOUNDS_PATH").map(|p| resolve_path(&p));

        let port: u16 = match get("PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid PORT `{}`", p))?,
            None => 8080,
        };
        let host = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid BIND_ADDR `{}`", host))?;

        Ok(Self {
            data_path,
            model_path,
            model_format,
            meta_path,
            geo_bounds_path,
            addr,
            log_predictions: get("LOG_PRED").as_deref() == Some("1"),
        })
    }

    /// Geographic target ranges: the override file if one is set, NYC otherwise.
    pub fn geo_bounds(&self) -> Result<GeoBounds> {
        match &self.geo_bounds_path {
            Some(p) => load_geo_bounds(p),
            None => Ok(GeoBounds::NYC),
        }
    }
}

pub fn load_geo_bounds(path: &std::path::Path) -> Result<GeoBounds> {
    let data = fs::read_to_string(path).with_context(|| format!("failed to read geo bounds at {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid geo bounds JSON in {}", path.display()))
}

/// Relative paths: working directory first, then next to the executable,
/// then (debug builds only) the crate directory. Falls back to the path as
/// given so the eventual open reports it.
pub fn resolve_path(raw: &str) -> PathBuf {
    let p = PathBuf::from(raw);
    if p.is_absolute() || p.exists() {
        return p;
    }

    let mut candidates = Vec::new();
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop(); // exe dir
        candidates.push(exe.join(&p));
    }
    // Source-tree fallback for `cargo run`; not baked into release builds.
    #[cfg(debug_assertions)]
    candidates.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(&p));

    candidates.into_iter().find(|c| c.exists()).unwrap_or(p)
}
