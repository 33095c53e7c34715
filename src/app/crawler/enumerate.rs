use std::time::Duration;

use tracing::{debug, info, warn};

use super::{list_titles_xpath, perform_swipe, scroll_to_top};
use crate::app::clock::Clock;
use crate::app::config::CrawlerSettings;
use crate::app::error::AppError;
use crate::app::models::NavigableItem;
use crate::app::session::{ElementId, Locator, UiSession};

fn read_label(
    session: &mut dyn UiSession,
    element: &ElementId,
) -> Result<(String, f64), AppError> {
    let text = session.element_text(element)?;
    let rect = session.element_rect(element)?;
    Ok((text, rect.x))
}

/// Collects the labels of the left-hand list in first-seen order.
///
/// Always rewinds first, so two calls on an unchanged screen agree. The
/// step count is a fixed bound, not an end-of-list signal.
pub fn enumerate_items(
    session: &mut dyn UiSession,
    clock: &dyn Clock,
    settings: &CrawlerSettings,
    trace_id: &str,
) -> Vec<NavigableItem> {
    scroll_to_top(session, settings, settings.enumeration_rewind_swipes, trace_id);

    // Without a width there is no left-pane boundary to filter against.
    let boundary = match session.screen_size() {
        Ok(size) => size.width * settings.left_pane_ratio,
        Err(err) => {
            println!("Could not read screen size: {err}");
            warn!(trace_id = %trace_id, error = %err, "screen size unavailable; nothing enumerated");
            return Vec::new();
        }
    };
    let locator = Locator::XPath(list_titles_xpath(
        &settings.list_resource_id,
        &settings.title_resource_id,
    ));
    let mut labels: Vec<String> = Vec::new();

    for step in 0..settings.enumeration_steps {
        let elements = session.find_elements(&locator).unwrap_or_else(|err| {
            debug!(trace_id = %trace_id, step, error = %err, "title lookup failed");
            Vec::new()
        });
        for element in &elements {
            let (text, x) = match read_label(session, element) {
                Ok(value) => value,
                Err(err) => {
                    debug!(trace_id = %trace_id, element = %element.0, error = %err, "skipping unreadable element");
                    continue;
                }
            };
            if text.is_empty() || x >= boundary || labels.contains(&text) {
                continue;
            }
            labels.push(text);
        }
        // Swipe failures are logged by perform_swipe; the step still counts.
        let _ = perform_swipe(session, &settings.enumeration_swipe, trace_id);
        clock.sleep(Duration::from_millis(settings.scroll_settle_ms));
    }

    info!(trace_id = %trace_id, count = labels.len(), "left pane enumerated");
    labels
        .into_iter()
        .enumerate()
        .map(|(index, label)| NavigableItem {
            index: index + 1,
            label,
        })
        .collect()
}
