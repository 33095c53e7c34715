pub mod appium;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::config::AppiumSettings;
use crate::app::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    XPath(String),
    /// Android `UiSelector` / `UiScrollable` expression.
    UiAutomator(String),
}

impl Locator {
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::XPath(_) => "xpath",
            Locator::UiAutomator(_) => "-android uiautomator",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::XPath(value) | Locator::UiAutomator(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

/// A live remote UI-automation session on the device.
pub trait UiSession {
    fn screen_size(&mut self) -> Result<ScreenSize, AppError>;
    fn find_element(&mut self, locator: &Locator) -> Result<ElementId, AppError>;
    fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementId>, AppError>;
    fn element_text(&mut self, element: &ElementId) -> Result<String, AppError>;
    fn element_rect(&mut self, element: &ElementId) -> Result<Rect, AppError>;
    fn tap(&mut self, point: Point, hold: Duration) -> Result<(), AppError>;
    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), AppError>;
    fn save_screenshot(&mut self, path: &Path) -> Result<(), AppError>;
    fn quit(&mut self) -> Result<(), AppError>;
}

/// Capabilities sent when a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    #[serde(rename = "platformName")]
    pub platform_name: String,
    #[serde(rename = "appium:automationName")]
    pub automation_name: String,
    #[serde(rename = "appium:enableMultiWindows")]
    pub enable_multi_windows: bool,
    #[serde(rename = "appium:ignoreUnimportantViews")]
    pub ignore_unimportant_views: bool,
    #[serde(rename = "appium:noReset")]
    pub no_reset: bool,
}

impl From<&AppiumSettings> for SessionOptions {
    fn from(settings: &AppiumSettings) -> Self {
        Self {
            platform_name: settings.platform_name.clone(),
            automation_name: settings.automation_name.clone(),
            enable_multi_windows: settings.enable_multi_windows,
            ignore_unimportant_views: settings.ignore_unimportant_views,
            no_reset: settings.no_reset,
        }
    }
}

pub trait SessionFactory {
    fn open(&self, options: &SessionOptions) -> Result<Box<dyn UiSession>, AppError>;
}
