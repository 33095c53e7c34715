use std::path::{Path, PathBuf};

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn sdk_adb(sdk_root: &str) -> PathBuf {
    let name = if cfg!(windows) { "adb.exe" } else { "adb" };
    Path::new(sdk_root).join("platform-tools").join(name)
}

/// Configured path first, then the SDK under `ANDROID_HOME` /
/// `ANDROID_SDK_ROOT`, then whatever `adb` resolves to on `PATH`.
pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Ok(root) = std::env::var(var) {
            if root.trim().is_empty() {
                continue;
            }
            let candidate = sdk_adb(root.trim());
            if candidate.is_file() {
                return candidate.to_string_lossy().to_string();
            }
        }
    }
    "adb".to_string()
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}
