pub mod enumerate;
pub mod traverse;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::clock::Clock;
use crate::app::config::{CrawlerSettings, SwipeSettings};
use crate::app::error::AppError;
use crate::app::models::{NavigableItem, TraversalRecord};
use crate::app::session::{Locator, Point, SessionFactory, SessionOptions, UiSession};

pub use enumerate::enumerate_items;
pub use traverse::traverse_items;

/// Quotes `text` as an XPath 1.0 string literal.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Title element whose text equals `label` exactly.
pub fn title_xpath(title_resource_id: &str, label: &str) -> String {
    format!(
        "//android.widget.TextView[@resource-id='{title_resource_id}' and @text={}]",
        xpath_literal(label)
    )
}

pub fn list_titles_xpath(list_resource_id: &str, title_resource_id: &str) -> String {
    format!(
        "//androidx.recyclerview.widget.RecyclerView[@resource-id='{list_resource_id}']//android.widget.TextView[@resource-id='{title_resource_id}']"
    )
}

pub fn scroll_to_top_locator(list_resource_id: &str, max_swipes: u32) -> Locator {
    Locator::UiAutomator(format!(
        "new UiScrollable(new UiSelector().resourceId(\"{list_resource_id}\")).scrollToBeginning({max_swipes})"
    ))
}

/// Keeps alphanumerics, spaces and underscores, then turns spaces into
/// underscores.
pub fn sanitize_label(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == ' ' || *ch == '_')
        .collect();
    kept.trim().replace(' ', "_")
}

pub fn item_screenshot_name(index: usize, label: &str) -> String {
    format!("{index:02}_{}.png", sanitize_label(label))
}

pub fn crawl_folder_name(started_at: &DateTime<Local>) -> String {
    started_at.format("Screenshots_%Y%m%d_%H%M%S").to_string()
}

fn swipe_geometry(swipe: &SwipeSettings) -> (Point, Point, Duration) {
    (
        Point::new(f64::from(swipe.start_x), f64::from(swipe.start_y)),
        Point::new(f64::from(swipe.end_x), f64::from(swipe.end_y)),
        Duration::from_millis(swipe.duration_ms),
    )
}

pub(crate) fn perform_swipe(
    session: &mut dyn UiSession,
    swipe: &SwipeSettings,
    trace_id: &str,
) -> Result<(), AppError> {
    let (from, to, duration) = swipe_geometry(swipe);
    session.swipe(from, to, duration).map_err(|err| {
        warn!(trace_id = %trace_id, error = %err, "swipe failed");
        err
    })
}

/// Rewinds the list container. A missing container is logged, not fatal.
pub(crate) fn scroll_to_top(
    session: &mut dyn UiSession,
    settings: &CrawlerSettings,
    max_swipes: u32,
    trace_id: &str,
) {
    let locator = scroll_to_top_locator(&settings.list_resource_id, max_swipes);
    if let Err(err) = session.find_element(&locator) {
        warn!(trace_id = %trace_id, error = %err, "scroll to top failed");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub folder: PathBuf,
    pub items: Vec<NavigableItem>,
    pub records: Vec<TraversalRecord>,
}

impl CrawlReport {
    pub fn captured(&self) -> usize {
        self.records.iter().filter(|record| record.success).count()
    }
}

/// Opens a session, enumerates the left pane and walks every item.
///
/// Only session establishment and folder creation are errors; individual
/// items that cannot be reached are recorded in the report.
pub fn run_crawl(
    factory: &dyn SessionFactory,
    options: &SessionOptions,
    settings: &CrawlerSettings,
    clock: &dyn Clock,
    output_dir: &Path,
    trace_id: &str,
) -> Result<CrawlReport, AppError> {
    let mut session = factory.open(options)?;
    let folder = output_dir.join(crawl_folder_name(&Local::now()));
    let result = crawl_session(session.as_mut(), settings, clock, &folder, trace_id);
    if let Err(err) = session.quit() {
        warn!(trace_id = %trace_id, error = %err, "failed to close ui session");
    }
    let report = result?;
    info!(
        trace_id = %trace_id,
        folder = %report.folder.display(),
        items = report.items.len(),
        captured = report.captured(),
        "crawl finished"
    );
    Ok(report)
}

fn crawl_session(
    session: &mut dyn UiSession,
    settings: &CrawlerSettings,
    clock: &dyn Clock,
    folder: &Path,
    trace_id: &str,
) -> Result<CrawlReport, AppError> {
    fs::create_dir_all(folder).map_err(|err| {
        AppError::system(format!("Failed to create screenshot folder: {err}"), trace_id)
    })?;
    let items = enumerate_items(session, clock, settings, trace_id);
    println!("Discovered {} items", items.len());
    let records = if items.is_empty() {
        Vec::new()
    } else {
        traverse_items(session, clock, settings, &items, folder, trace_id)
    };
    Ok(CrawlReport {
        folder: folder.to_path_buf(),
        items,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::clock::ManualClock;
    use crate::app::config::AppiumSettings;
    use crate::app::testing::{FakeItem, FakeSessionFactory, TEST_TRACE_ID};
    use chrono::TimeZone;

    #[test]
    fn literal_switches_quotes_when_needed() {
        assert_eq!(xpath_literal("Network"), "'Network'");
        assert_eq!(xpath_literal("Owner's phone"), "\"Owner's phone\"");
        assert_eq!(
            xpath_literal("it's \"on\""),
            "concat('it', \"'\", 's \"on\"')"
        );
    }

    #[test]
    fn sanitized_names_keep_index_prefix() {
        assert_eq!(item_screenshot_name(1, "Network & internet"), "01_Network__internet.png");
        assert_eq!(item_screenshot_name(12, " Display "), "12_Display.png");
        assert_eq!(item_screenshot_name(3, "Wi-Fi_2"), "03_WiFi_2.png");
    }

    #[test]
    fn folder_name_uses_start_time() {
        let at = Local
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .expect("valid local time");
        assert_eq!(crawl_folder_name(&at), "Screenshots_20260102_030405");
    }

    #[test]
    fn scroll_locator_targets_list_container() {
        let locator = scroll_to_top_locator("com.android.settings:id/recycler_view", 10);
        assert_eq!(locator.strategy(), "-android uiautomator");
        assert!(locator
            .value()
            .ends_with("resourceId(\"com.android.settings:id/recycler_view\")).scrollToBeginning(10)"));
    }

    #[test]
    fn crawl_writes_screenshots_into_timestamped_folder_and_quits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let factory = FakeSessionFactory::new(vec![FakeItem::left("Network"), FakeItem::left("Display")]);
        let clock = ManualClock::new();
        let options = SessionOptions::from(&AppiumSettings::default());

        let report = run_crawl(
            &factory,
            &options,
            &CrawlerSettings::default(),
            &clock,
            dir.path(),
            TEST_TRACE_ID,
        )
        .expect("crawl");

        assert!(report
            .folder
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("Screenshots_")));
        assert_eq!(report.captured(), 2);
        assert!(report.folder.join("01_Network.png").is_file());
        assert!(report.folder.join("02_Display.png").is_file());
        assert!(factory.screen.borrow().quit);
    }

    #[test]
    fn unreachable_server_fails_the_crawl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let factory = FakeSessionFactory::unreachable();
        let clock = ManualClock::new();
        let options = SessionOptions::from(&AppiumSettings::default());

        let err = run_crawl(
            &factory,
            &options,
            &CrawlerSettings::default(),
            &clock,
            dir.path(),
            TEST_TRACE_ID,
        )
        .expect_err("no session");

        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert_eq!(factory.opened(), 0);
    }
}
