use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::app::adb::apps::SCREENSHOT_DEVICE_PATH;
use crate::app::adb::runner::DeviceShell;
use crate::app::error::AppError;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn validate_png(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < PNG_SIGNATURE.len() {
        return Err("Screenshot data is empty".to_string());
    }
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err("Screenshot data is not a PNG".to_string());
    }
    Ok(())
}

pub fn sanitize_file_component(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "app".to_string()
    } else {
        cleaned
    }
}

pub fn screenshot_file_name(package: &str, taken_at: &DateTime<Local>) -> String {
    format!(
        "{}_{}.png",
        sanitize_file_component(package),
        taken_at.format("%Y%m%d_%H%M%S")
    )
}

/// Saves one frame of the device screen as `{package}_{timestamp}.png`
/// under `output_dir`, creating the folder when needed.
pub fn capture_app_screenshot(
    shell: &dyn DeviceShell,
    package: &str,
    output_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, AppError> {
    capture_app_screenshot_at(shell, package, output_dir, timeout, &Local::now())
}

pub fn capture_app_screenshot_at(
    shell: &dyn DeviceShell,
    package: &str,
    output_dir: &Path,
    timeout: Duration,
    taken_at: &DateTime<Local>,
) -> Result<PathBuf, AppError> {
    let trace_id = shell.trace_id().to_string();
    fs::create_dir_all(output_dir).map_err(|err| {
        AppError::system(format!("Failed to create output dir: {err}"), &trace_id)
    })?;
    let output_path = output_dir.join(screenshot_file_name(package, taken_at));

    let direct = shell
        .adb(
            &["exec-out".to_string(), "screencap".to_string(), "-p".to_string()],
            timeout,
        )
        .and_then(|output| {
            validate_png(&output.raw_stdout)
                .map(|_| output.raw_stdout)
                .map_err(|message| AppError::system(message, &trace_id))
        });

    match direct {
        Ok(bytes) => {
            fs::write(&output_path, &bytes).map_err(|err| {
                AppError::system(format!("Failed to write screenshot: {err}"), &trace_id)
            })?;
        }
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "exec-out screencap failed; falling back to pull");
            pull_screenshot(shell, &output_path, timeout)?;
        }
    }

    info!(trace_id = %trace_id, package = %package, path = %output_path.display(), "screenshot saved");
    Ok(output_path)
}

fn pull_screenshot(shell: &dyn DeviceShell, output_path: &Path, timeout: Duration) -> Result<(), AppError> {
    let trace_id = shell.trace_id().to_string();
    let capture = shell.shell(&["screencap", "-p", SCREENSHOT_DEVICE_PATH], timeout)?;
    if !capture.success() {
        return Err(AppError::system(
            format!("screencap failed: {}", capture.stderr.trim()),
            &trace_id,
        ));
    }
    let pull = shell.adb(
        &[
            "pull".to_string(),
            SCREENSHOT_DEVICE_PATH.to_string(),
            output_path.to_string_lossy().to_string(),
        ],
        timeout,
    )?;
    if !pull.success() || !output_path.is_file() {
        return Err(AppError::system(
            format!("Failed to pull screenshot: {}", pull.stderr.trim()),
            &trace_id,
        ));
    }
    Ok(())
}
