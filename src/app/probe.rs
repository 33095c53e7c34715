use std::time::Duration;

use tracing::warn;

use crate::app::adb::apps::UI_DUMP_DEVICE_PATH;
use crate::app::adb::parse::DumpsysParser;
use crate::app::adb::runner::{CommandOutput, DeviceShell};
use crate::app::error::AppError;
use crate::app::models::{ComponentName, HierarchySnapshot, WindowSnapshot};
use crate::app::ui_xml::summarize_hierarchy;

/// `uiautomator dump` prints `UI hierchary dumped to: <path>` on success and
/// `ERROR: ...` lines on failure, sometimes with a zero exit code.
pub fn dump_succeeded(output: &CommandOutput) -> bool {
    let text = format!("{}\n{}", output.stdout, output.stderr);
    output.success() && !text.contains("ERROR") && text.contains("dumped to")
}

/// Typed device-state queries. Every query carries the same timeout.
pub struct DeviceProbe<'a> {
    shell: &'a dyn DeviceShell,
    parser: DumpsysParser,
    query_timeout: Duration,
}

impl<'a> DeviceProbe<'a> {
    pub fn new(shell: &'a dyn DeviceShell, query_timeout: Duration) -> Self {
        Self {
            shell,
            parser: DumpsysParser::default(),
            query_timeout,
        }
    }

    pub fn trace_id(&self) -> &str {
        self.shell.trace_id()
    }

    pub fn resumed_activity(&self) -> Result<Option<ComponentName>, AppError> {
        let output = self
            .shell
            .shell(&["dumpsys", "activity", "activities"], self.query_timeout)?;
        Ok(self.parser.parse_resumed_activity(&output.stdout))
    }

    pub fn window_snapshot(&self) -> Result<WindowSnapshot, AppError> {
        let output = self
            .shell
            .shell(&["dumpsys", "window", "windows"], self.query_timeout)?;
        Ok(self.parser.parse_window_snapshot(&output.stdout))
    }

    /// Dumps the hierarchy on the device, then reads the file back.
    ///
    /// The previous dump is removed first; a dump that reports an error
    /// yields an empty snapshot instead of whatever file is left over.
    pub fn hierarchy_snapshot(&self) -> Result<HierarchySnapshot, AppError> {
        self.shell
            .shell(&["rm", "-f", UI_DUMP_DEVICE_PATH], self.query_timeout)?;
        let dump = self
            .shell
            .shell(&["uiautomator", "dump", UI_DUMP_DEVICE_PATH], self.query_timeout)?;
        if !dump_succeeded(&dump) {
            warn!(
                trace_id = %self.trace_id(),
                exit_code = ?dump.exit_code,
                output = %dump.stdout.trim(),
                "uiautomator dump failed"
            );
            return Ok(HierarchySnapshot::default());
        }
        let output = self
            .shell
            .shell(&["cat", UI_DUMP_DEVICE_PATH], self.query_timeout)?;
        Ok(summarize_hierarchy(&output.stdout))
    }
}
