use regex::Regex;

use crate::app::models::{ComponentName, WindowRecord, WindowSize, WindowSnapshot};

pub struct DumpsysParser {
    re_resumed: Regex,
    re_focus: Regex,
    re_window_header: Regex,
    re_package_field: Regex,
    re_frame: Regex,
    re_requested: Regex,
    re_requested_legacy: Regex,
}

impl Default for DumpsysParser {
    fn default() -> Self {
        Self {
            re_resumed: Regex::new(
                r"(?:mResumedActivity|topResumedActivity|ResumedActivity)\s*[:=]\s*ActivityRecord\{([^}]*)\}",
            )
            .unwrap(),
            re_focus: Regex::new(r"mCurrentFocus\s*=\s*(?:Window\{([^}]*)\}|null)").unwrap(),
            re_window_header: Regex::new(r"^\s*Window #\d+\s+Window\{([^}]*)\}").unwrap(),
            re_package_field: Regex::new(r"\bpackage=([A-Za-z0-9_.]+)").unwrap(),
            re_frame: Regex::new(r"\bmFrame=\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").unwrap(),
            re_requested: Regex::new(r"\bRequested w=(-?\d+) h=(-?\d+)").unwrap(),
            re_requested_legacy: Regex::new(r"\bmRequestedWidth=(-?\d+) mRequestedHeight=(-?\d+)")
                .unwrap(),
        }
    }
}

/// Parses the body of a `Window{...}` / `ActivityRecord{...}` record.
///
/// The body is `<hash> u<user> <title> [t<task>]`; the title is the last
/// token that is not a task marker.
pub fn parse_record_component(body: &str) -> Option<ComponentName> {
    let tokens: Vec<&str> = body.split_whitespace().collect();
    let user_index = tokens
        .iter()
        .position(|token| token.len() > 1 && token.starts_with('u') && token[1..].chars().all(|ch| ch.is_ascii_digit()))?;
    let title = tokens[user_index + 1..]
        .iter()
        .rev()
        .find(|token| !is_task_marker(token))?;
    parse_component(title)
}

fn is_task_marker(token: &str) -> bool {
    token.len() > 1 && token.starts_with('t') && token[1..].chars().all(|ch| ch.is_ascii_digit())
}

pub fn parse_component(token: &str) -> Option<ComponentName> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    match token.split_once('/') {
        Some((package, activity)) if !package.is_empty() => Some(ComponentName {
            package: package.to_string(),
            activity: Some(activity.to_string()).filter(|value| !value.is_empty()),
        }),
        Some(_) => None,
        None => Some(ComponentName {
            package: token.to_string(),
            activity: None,
        }),
    }
}

impl DumpsysParser {
    /// Resumed activity from `dumpsys activity activities`.
    pub fn parse_resumed_activity(&self, output: &str) -> Option<ComponentName> {
        output.lines().find_map(|line| {
            let captures = self.re_resumed.captures(line)?;
            parse_record_component(captures.get(1)?.as_str())
        })
    }

    /// Current focus and per-window records from `dumpsys window windows`.
    pub fn parse_window_snapshot(&self, output: &str) -> WindowSnapshot {
        let mut snapshot = WindowSnapshot::default();
        let mut current: Option<WindowRecord> = None;
        let mut frame_seen = false;

        for line in output.lines() {
            if let Some(captures) = self.re_window_header.captures(line) {
                if let Some(done) = current.take() {
                    snapshot.windows.push(done);
                }
                let body = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                let component = parse_record_component(body);
                current = Some(WindowRecord {
                    title: component
                        .as_ref()
                        .map(|component| match &component.activity {
                            Some(activity) => format!("{}/{}", component.package, activity),
                            None => component.package.clone(),
                        })
                        .unwrap_or_default(),
                    package: component
                        .filter(|component| component.package.contains('.'))
                        .map(|component| component.package),
                    size: None,
                });
                frame_seen = false;
                continue;
            }

            if let Some(captures) = self.re_focus.captures(line) {
                snapshot.focused = captures
                    .get(1)
                    .and_then(|body| parse_record_component(body.as_str()));
                continue;
            }

            let Some(window) = current.as_mut() else {
                continue;
            };
            if window.package.is_none() {
                if let Some(captures) = self.re_package_field.captures(line) {
                    window.package = Some(captures[1].to_string());
                }
            }
            if let Some(size) = self.parse_frame(line) {
                window.size = Some(size);
                frame_seen = true;
            } else if !frame_seen {
                if let Some(size) = self.parse_requested(line) {
                    window.size = Some(size);
                }
            }
        }

        if let Some(done) = current.take() {
            snapshot.windows.push(done);
        }
        snapshot
    }

    fn parse_frame(&self, line: &str) -> Option<WindowSize> {
        let captures = self.re_frame.captures(line)?;
        let left: i32 = captures[1].parse().ok()?;
        let top: i32 = captures[2].parse().ok()?;
        let right: i32 = captures[3].parse().ok()?;
        let bottom: i32 = captures[4].parse().ok()?;
        Some(WindowSize {
            width: right - left,
            height: bottom - top,
        })
    }

    fn parse_requested(&self, line: &str) -> Option<WindowSize> {
        let captures = self
            .re_requested
            .captures(line)
            .or_else(|| self.re_requested_legacy.captures(line))?;
        Some(WindowSize {
            width: captures[1].parse().ok()?,
            height: captures[2].parse().ok()?,
        })
    }
}
