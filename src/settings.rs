use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::board::drag::DEFAULT_ACTIVATION_DISTANCE;
use crate::board::{DragConfig, EngineConfig};
use crate::notification::NotificationBackend;
use crate::remote::ServerConfig;

const MAX_ACTIVATION_DISTANCE: f64 = 200.0;
const DEFAULT_DROP_ZONE_SLOP: f64 = 0.0;
const MAX_DROP_ZONE_SLOP: f64 = 100.0;
const DEFAULT_COLUMN_GAP: f64 = 2.0;
const MAX_COLUMN_GAP: f64 = 50.0;
const MIN_MOVE_TIMEOUT_MS: u64 = 500;
const MAX_MOVE_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_MOVE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 5_000;
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080/api";
const DEFAULT_PROJECT: &str = "default";
const DEFAULT_NOTIFICATION_BACKEND: &str = "log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub drag_activation_distance: f64,
    pub drop_zone_slop: f64,
    pub column_gap: f64,
    pub move_timeout_ms: u64,
    pub server_url: String,
    pub default_project: String,
    pub notification_backend: String,
    pub notification_display_duration_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            drag_activation_distance: DEFAULT_ACTIVATION_DISTANCE,
            drop_zone_slop: DEFAULT_DROP_ZONE_SLOP,
            column_gap: DEFAULT_COLUMN_GAP,
            move_timeout_ms: DEFAULT_MOVE_TIMEOUT_MS,
            server_url: DEFAULT_SERVER_URL.to_string(),
            default_project: DEFAULT_PROJECT.to_string(),
            notification_backend: DEFAULT_NOTIFICATION_BACKEND.to_string(),
            notification_display_duration_ms: DEFAULT_NOTIFICATION_DURATION_MS,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("swimlane");
        path.push("settings.toml");
        Some(path)
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(mut settings) => {
                    settings.validate();
                    settings
                }
                Err(error) => {
                    warn!(
                        "failed to parse settings config '{}': {}",
                        path.display(),
                        error
                    );
                    Self::default()
                }
            },
            Err(error) => {
                warn!(
                    "failed to read settings config '{}': {}",
                    path.display(),
                    error
                );
                Self::default()
            }
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            drag: DragConfig {
                activation_distance: self.drag_activation_distance,
            },
            drop_zone_slop: self.drop_zone_slop,
            move_timeout: Duration::from_millis(self.move_timeout_ms),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            base_url: self.server_url.clone(),
            // The HTTP client gives up slightly after the mover's own timeout.
            request_timeout: Duration::from_millis(self.move_timeout_ms.saturating_add(1_000)),
        }
    }

    pub fn notification_backend(&self) -> NotificationBackend {
        NotificationBackend::from_settings_value(&self.notification_backend).unwrap_or_default()
    }

    fn validate(&mut self) {
        self.drag_activation_distance = clamp_f64(
            "drag_activation_distance",
            self.drag_activation_distance,
            MAX_ACTIVATION_DISTANCE,
            DEFAULT_ACTIVATION_DISTANCE,
        );
        self.drop_zone_slop = clamp_f64(
            "drop_zone_slop",
            self.drop_zone_slop,
            MAX_DROP_ZONE_SLOP,
            DEFAULT_DROP_ZONE_SLOP,
        );
        self.column_gap = clamp_f64(
            "column_gap",
            self.column_gap,
            MAX_COLUMN_GAP,
            DEFAULT_COLUMN_GAP,
        );
        self.move_timeout_ms = self
            .move_timeout_ms
            .clamp(MIN_MOVE_TIMEOUT_MS, MAX_MOVE_TIMEOUT_MS);

        if self.server_url.trim().is_empty() {
            warn!("empty server_url in settings config; falling back to {DEFAULT_SERVER_URL}");
            self.server_url = DEFAULT_SERVER_URL.to_string();
        } else {
            self.server_url = self.server_url.trim().to_string();
        }

        if self.default_project.trim().is_empty() {
            self.default_project = DEFAULT_PROJECT.to_string();
        }

        self.notification_backend =
            match NotificationBackend::from_settings_value(&self.notification_backend) {
                Some(backend) => backend.as_str().to_string(),
                None => {
                    warn!(
                        "invalid notification_backend '{}' in settings config; falling back to {}",
                        self.notification_backend, DEFAULT_NOTIFICATION_BACKEND
                    );
                    DEFAULT_NOTIFICATION_BACKEND.to_string()
                }
            };
    }
}

fn clamp_f64(field: &str, value: f64, max: f64, default: f64) -> f64 {
    if !value.is_finite() {
        warn!("non-finite {field} in settings config; falling back to {default}");
        return default;
    }
    value.clamp(0.0, max)
}
