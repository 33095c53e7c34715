use std::time::Duration;

use tracing::{info, warn};

use crate::app::adb::apps::{force_stop_command, launch_command, launch_rejected, launch_strategy};
use crate::app::adb::runner::DeviceShell;

fn run_shell(shell: &dyn DeviceShell, command: &[String], timeout: Duration) -> Result<String, String> {
    let parts: Vec<&str> = command.iter().map(String::as_str).collect();
    let output = shell.shell(&parts, timeout).map_err(|err| err.to_string())?;
    if let Some(rejection) = launch_rejected(&output.stdout, &output.stderr) {
        return Err(rejection);
    }
    Ok(output.stdout)
}

/// Sends exactly one launch command. `true` means the device accepted it,
/// which says nothing about whether the UI came up.
pub fn launch_app(shell: &dyn DeviceShell, package: &str, timeout: Duration) -> bool {
    let package = package.trim();
    let strategy = launch_strategy(package);
    match run_shell(shell, &launch_command(package), timeout) {
        Ok(_) => {
            info!(trace_id = %shell.trace_id(), package = %package, strategy = ?strategy, "launch command sent");
            true
        }
        Err(error) => {
            warn!(trace_id = %shell.trace_id(), package = %package, strategy = ?strategy, error = %error, "launch failed");
            false
        }
    }
}

pub fn force_stop(shell: &dyn DeviceShell, package: &str, timeout: Duration) -> bool {
    let package = package.trim();
    let parts = force_stop_command(package);
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
    match shell.shell(&parts, timeout) {
        Ok(_) => {
            info!(trace_id = %shell.trace_id(), package = %package, "force-stopped");
            true
        }
        Err(err) => {
            warn!(trace_id = %shell.trace_id(), package = %package, error = %err, "force-stop failed");
            false
        }
    }
}
