//! Viewer configuration.
//!
//! Defaults are overridden by an optional TOML file, which is in turn
//! overridden by the environment variables the viewer has always read
//! (`PACS_HOST`, `PACS_LABELLIST_*`, `DCM4CHEE_HOST`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{RegistrationPolicy, ToolChangeMode};
use crate::load_pipeline::{LoadOptions, RenderThrottle};
use crate::state::{DEFAULT_PRESET_ID, DEFAULT_SLAB_THICKNESS_MM};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub pacs: PacsConfig,
    pub dicomweb: DicomWebConfig,
    pub sync: SyncConfig,
    pub load: LoadConfig,
    pub http: HttpConfig,
}

/// Remote label-list API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PacsConfig {
    pub host: String,
    pub labellist_list: String,
    /// Falls back to `labellist_list` when unset.
    pub labellist_add: Option<String>,
    pub labellist_update: Option<String>,
    pub labellist_delete: Option<String>,
    pub label_type: String,
}

impl Default for PacsConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            labellist_list: "/api/v1/labeling".to_string(),
            labellist_add: None,
            labellist_update: None,
            labellist_delete: None,
            label_type: "nifti".to_string(),
        }
    }
}

impl PacsConfig {
    pub fn list_url(&self) -> String {
        join_url(&self.host, &self.labellist_list)
    }

    pub fn add_url(&self) -> String {
        join_url(&self.host, self.labellist_add.as_ref().unwrap_or(&self.labellist_list))
    }

    pub fn update_url(&self) -> String {
        join_url(
            &self.host,
            self.labellist_update.as_ref().unwrap_or(&self.labellist_list),
        )
    }

    pub fn delete_url(&self) -> String {
        join_url(
            &self.host,
            self.labellist_delete.as_ref().unwrap_or(&self.labellist_list),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DicomWebConfig {
    pub host: String,
    pub aet_path: String,
}

impl Default for DicomWebConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            aet_path: "/dcm4chee-arc/aets/DCM4CHEE".to_string(),
        }
    }
}

impl DicomWebConfig {
    /// QIDO/WADO-RS root.
    pub fn rs_url(&self) -> String {
        format!("{}/rs", join_url(&self.host, &self.aet_path))
    }

    /// WADO-URI endpoint the image ids point at.
    pub fn wado_uri_url(&self) -> String {
        format!("{}/wado?requestType=WADO", join_url(&self.host, &self.aet_path))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub expected_viewports: usize,
    pub registration: RegistrationPolicy,
    pub tool_change: ToolChangeMode,
    pub initial_slab_thickness_mm: f64,
    pub default_preset: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            expected_viewports: 3,
            registration: RegistrationPolicy::default(),
            tool_change: ToolChangeMode::default(),
            initial_slab_thickness_mm: DEFAULT_SLAB_THICKNESS_MM,
            default_preset: DEFAULT_PRESET_ID.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Re-render while loading whenever progress hits a multiple of this.
    pub render_step_percent: u32,
    pub timeout_secs: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            render_step_percent: RenderThrottle::DEFAULT_STEP,
            timeout_secs: None,
        }
    }
}

impl LoadConfig {
    pub fn options(&self) -> LoadOptions {
        LoadOptions {
            throttle: RenderThrottle::new(self.render_step_percent),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl ViewerConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Override fields from environment-style variables looked up through
    /// `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PACS_HOST") {
            self.pacs.host = host;
        }
        if let Some(path) = lookup("PACS_LABELLIST_LIST") {
            self.pacs.labellist_list = path;
        }
        if let Some(path) = lookup("PACS_LABELLIST_ADD") {
            self.pacs.labellist_add = Some(path);
        }
        if let Some(path) = lookup("PACS_LABELLIST_UPDATE") {
            self.pacs.labellist_update = Some(path);
        }
        if let Some(path) = lookup("PACS_LABELLIST_DELETE") {
            self.pacs.labellist_delete = Some(path);
        }
        if let Some(host) = lookup("DCM4CHEE_HOST") {
            self.dicomweb.host = host;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.expected_viewports == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.expected_viewports",
                message: "at least one viewport is required".to_string(),
            });
        }
        if !(1..=100).contains(&self.load.render_step_percent) {
            return Err(ConfigError::Invalid {
                key: "load.render_step_percent",
                message: format!("{} is not within 1..=100", self.load.render_step_percent),
            });
        }
        if !self.sync.initial_slab_thickness_mm.is_finite()
            || self.sync.initial_slab_thickness_mm < 0.0
        {
            return Err(ConfigError::Invalid {
                key: "sync.initial_slab_thickness_mm",
                message: "must be a non-negative number".to_string(),
            });
        }
        Ok(())
    }
}

fn join_url(host: &str, path: &str) -> String {
    match (host.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", host, &path[1..]),
        (false, false) if !host.is_empty() && !path.is_empty() => format!("{host}/{path}"),
        _ => format!("{host}{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::join_url;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://pacs/", "/api"), "http://pacs/api");
        assert_eq!(join_url("http://pacs", "api"), "http://pacs/api");
        assert_eq!(join_url("http://pacs", "/api"), "http://pacs/api");
    }
}
