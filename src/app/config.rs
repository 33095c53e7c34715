use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;

pub const SETTINGS_PACKAGE: &str = "com.android.settings";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    pub adb_command_path: String,
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadinessSettings {
    pub overall_timeout_secs: u64,
    pub ui_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub query_timeout_secs: u64,
    pub launch_timeout_secs: u64,
    pub min_hierarchy_len: usize,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            overall_timeout_secs: 30,
            ui_timeout_secs: 10,
            poll_interval_ms: 1000,
            query_timeout_secs: 5,
            launch_timeout_secs: 10,
            min_hierarchy_len: 50,
        }
    }
}

impl ReadinessSettings {
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }

    pub fn ui_timeout(&self) -> Duration {
        Duration::from_secs(self.ui_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SwipeSettings {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Share of the screen width treated as the left navigation pane.
    pub left_pane_ratio: f64,
    pub enumeration_steps: u32,
    pub max_attempts: u32,
    pub scroll_settle_ms: u64,
    pub tap_settle_ms: u64,
    pub compensate_settle_ms: u64,
    pub tap_hold_ms: u64,
    pub enumeration_swipe: SwipeSettings,
    pub compensate_swipe: SwipeSettings,
    pub list_resource_id: String,
    pub title_resource_id: String,
    pub enumeration_rewind_swipes: u32,
    pub traversal_rewind_swipes: u32,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            left_pane_ratio: 0.3,
            enumeration_steps: 8,
            max_attempts: 3,
            scroll_settle_ms: 1000,
            tap_settle_ms: 2000,
            compensate_settle_ms: 500,
            tap_hold_ms: 100,
            enumeration_swipe: SwipeSettings {
                start_x: 200,
                start_y: 1000,
                end_x: 200,
                end_y: 400,
                duration_ms: 800,
            },
            compensate_swipe: SwipeSettings {
                start_x: 200,
                start_y: 800,
                end_x: 200,
                end_y: 500,
                duration_ms: 500,
            },
            list_resource_id: "com.android.settings:id/recycler_view".to_string(),
            title_resource_id: "android:id/title".to_string(),
            enumeration_rewind_swipes: 10,
            traversal_rewind_swipes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppiumSettings {
    pub server_url: String,
    pub platform_name: String,
    pub automation_name: String,
    pub enable_multi_windows: bool,
    pub ignore_unimportant_views: bool,
    pub no_reset: bool,
    pub request_timeout_secs: u64,
}

impl Default for AppiumSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4725".to_string(),
            platform_name: "Android".to_string(),
            automation_name: "UiAutomator2".to_string(),
            enable_multi_windows: true,
            ignore_unimportant_views: false,
            no_reset: true,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    pub apps: Vec<String>,
    pub output_dir: String,
    pub crawl_targets: Vec<String>,
    pub pause_between_apps_ms: u64,
    pub open_settle_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            apps: vec![
                "com.mvbcast.crosswalk".to_string(),
                "com.viewsonic.droid".to_string(),
                SETTINGS_PACKAGE.to_string(),
            ],
            output_dir: "checkOpen".to_string(),
            crawl_targets: vec![SETTINGS_PACKAGE.to_string()],
            pause_between_apps_ms: 1000,
            open_settle_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub readiness: ReadinessSettings,
    #[serde(default)]
    pub crawler: CrawlerSettings,
    #[serde(default)]
    pub appium: AppiumSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("READYCHECK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".readycheck_config.json")
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), ""))?;
    Ok(validate_config(config))
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let readiness_defaults = ReadinessSettings::default();
    if config.readiness.overall_timeout_secs == 0 {
        config.readiness.overall_timeout_secs = readiness_defaults.overall_timeout_secs;
    }
    if config.readiness.ui_timeout_secs == 0 {
        config.readiness.ui_timeout_secs = readiness_defaults.ui_timeout_secs;
    }
    if config.readiness.poll_interval_ms < 50 {
        config.readiness.poll_interval_ms = readiness_defaults.poll_interval_ms;
    }
    if config.readiness.query_timeout_secs == 0 {
        config.readiness.query_timeout_secs = readiness_defaults.query_timeout_secs;
    }
    if config.readiness.launch_timeout_secs == 0 {
        config.readiness.launch_timeout_secs = readiness_defaults.launch_timeout_secs;
    }

    let crawler_defaults = CrawlerSettings::default();
    if !(config.crawler.left_pane_ratio > 0.0 && config.crawler.left_pane_ratio <= 1.0) {
        config.crawler.left_pane_ratio = crawler_defaults.left_pane_ratio;
    }
    if config.crawler.enumeration_steps == 0 {
        config.crawler.enumeration_steps = crawler_defaults.enumeration_steps;
    }
    if config.crawler.max_attempts == 0 {
        config.crawler.max_attempts = crawler_defaults.max_attempts;
    }
    if config.crawler.list_resource_id.trim().is_empty() {
        config.crawler.list_resource_id = crawler_defaults.list_resource_id;
    }
    if config.crawler.title_resource_id.trim().is_empty() {
        config.crawler.title_resource_id = crawler_defaults.title_resource_id;
    }

    if config.appium.server_url.trim().is_empty() {
        config.appium.server_url = AppiumSettings::default().server_url;
    }
    if config.run.output_dir.trim().is_empty() {
        config.run.output_dir = RunSettings::default().output_dir;
    }
    config.run.apps = dedupe_apps(&config.run.apps);
    config
}

/// Trims identifiers and drops blanks and repeats, keeping first-seen order.
pub fn dedupe_apps(apps: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(apps.len());
    for app in apps {
        let trimmed = app.trim();
        if trimmed.is_empty() || seen.iter().any(|existing| existing == trimmed) {
            continue;
        }
        seen.push(trimmed.to_string());
    }
    seen
}
