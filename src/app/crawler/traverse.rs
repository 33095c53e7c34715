use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::{item_screenshot_name, perform_swipe, scroll_to_top, title_xpath};
use crate::app::clock::Clock;
use crate::app::config::CrawlerSettings;
use crate::app::error::AppError;
use crate::app::models::{NavigableItem, TraversalRecord};
use crate::app::session::{Locator, UiSession};

/// One locate, tap, settle and capture pass. Returns the screenshot file name.
fn open_item(
    session: &mut dyn UiSession,
    clock: &dyn Clock,
    settings: &CrawlerSettings,
    item: &NavigableItem,
    folder: &Path,
) -> Result<String, AppError> {
    let locator = Locator::XPath(title_xpath(&settings.title_resource_id, &item.label));
    let element = session.find_element(&locator)?;
    let center = session.element_rect(&element)?.center();
    session.tap(center, Duration::from_millis(settings.tap_hold_ms))?;
    clock.sleep(Duration::from_millis(settings.tap_settle_ms));

    let file_name = item_screenshot_name(item.index, &item.label);
    session.save_screenshot(&folder.join(&file_name))?;
    Ok(file_name)
}

/// Taps every item in order and captures the detail pane it opens.
///
/// Each item gets `max_attempts` tries; a failed try is followed by one
/// compensating swipe. An item that is never reached is recorded and
/// skipped.
pub fn traverse_items(
    session: &mut dyn UiSession,
    clock: &dyn Clock,
    settings: &CrawlerSettings,
    items: &[NavigableItem],
    folder: &Path,
    trace_id: &str,
) -> Vec<TraversalRecord> {
    scroll_to_top(session, settings, settings.traversal_rewind_swipes, trace_id);
    let total = items.len();
    let mut records = Vec::with_capacity(total);

    for item in items {
        println!("[{}/{}] {}", item.index, total, item.label);
        let mut record = TraversalRecord {
            item: item.clone(),
            success: false,
            attempts: 0,
            screenshot: None,
        };

        while record.attempts < settings.max_attempts {
            record.attempts += 1;
            match open_item(session, clock, settings, item, folder) {
                Ok(file_name) => {
                    println!("  saved {file_name}");
                    record.success = true;
                    record.screenshot = Some(file_name);
                    break;
                }
                Err(err) => {
                    warn!(
                        trace_id = %trace_id,
                        label = %item.label,
                        attempt = record.attempts,
                        error = %err,
                        "item attempt failed"
                    );
                    // Swipe failures are logged by perform_swipe; the attempt still counts.
                    let _ = perform_swipe(session, &settings.compensate_swipe, trace_id);
                    clock.sleep(Duration::from_millis(settings.compensate_settle_ms));
                }
            }
        }

        if record.success {
            info!(trace_id = %trace_id, index = item.index, label = %item.label, "item captured");
        } else {
            println!("  could not locate {}, skipped", item.label);
            warn!(trace_id = %trace_id, index = item.index, label = %item.label, "item skipped");
        }
        records.push(record);
    }
    records
}
