use crate::app::config::SETTINGS_PACKAGE;
use crate::app::models::LaunchStrategy;

pub const UI_DUMP_DEVICE_PATH: &str = "/sdcard/ui_dump.xml";
pub const SCREENSHOT_DEVICE_PATH: &str = "/sdcard/screenshot.png";

pub fn launch_strategy(package: &str) -> LaunchStrategy {
    if package.trim() == SETTINGS_PACKAGE {
        LaunchStrategy::DirectIntent
    } else {
        LaunchStrategy::LauncherIntent
    }
}

/// `adb shell` arguments that start `package`.
pub fn launch_command(package: &str) -> Vec<String> {
    let package = package.trim();
    match launch_strategy(package) {
        LaunchStrategy::DirectIntent => vec![
            "am".to_string(),
            "start".to_string(),
            "-a".to_string(),
            "android.settings.SETTINGS".to_string(),
        ],
        LaunchStrategy::LauncherIntent => vec![
            "monkey".to_string(),
            "-p".to_string(),
            package.to_string(),
            "-c".to_string(),
            "android.intent.category.LAUNCHER".to_string(),
            "1".to_string(),
        ],
    }
}

pub fn force_stop_command(package: &str) -> Vec<String> {
    vec![
        "am".to_string(),
        "force-stop".to_string(),
        package.trim().to_string(),
    ]
}

/// `am start` and `monkey` both exit 0 on some failures; their stdout is the
/// only signal.
pub fn launch_rejected(stdout: &str, stderr: &str) -> Option<String> {
    let combined = format!("{stdout}\n{stderr}");
    for line in combined.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Error:")
            || trimmed.starts_with("Error type")
            || trimmed.contains("No activities found to run")
            || trimmed.contains("monkey aborted")
        {
            return Some(trimmed.to_string());
        }
    }
    None
}
