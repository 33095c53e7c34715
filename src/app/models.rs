use serde::{Deserialize, Serialize};
use std::fmt;

/// `package/activity` as printed by `dumpsys`. `activity` is absent for
/// windows that are titled by a bare name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentName {
    pub package: String,
    pub activity: Option<String>,
}

impl ComponentName {
    pub fn belongs_to(&self, package: &str) -> bool {
        self.package == package.trim()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSize {
    pub width: i32,
    pub height: i32,
}

impl WindowSize {
    pub fn is_zero_area(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowRecord {
    pub title: String,
    pub package: Option<String>,
    pub size: Option<WindowSize>,
}

impl WindowRecord {
    pub fn belongs_to(&self, package: &str) -> bool {
        self.package.as_deref() == Some(package.trim())
    }

    pub fn is_degenerate(&self) -> bool {
        self.size.map(|size| size.is_zero_area()).unwrap_or(false)
    }
}

/// Parsed `dumpsys window windows`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub focused: Option<ComponentName>,
    pub windows: Vec<WindowRecord>,
}

impl WindowSnapshot {
    pub fn windows_for<'a>(&'a self, package: &'a str) -> impl Iterator<Item = &'a WindowRecord> + 'a {
        self.windows.iter().filter(move |window| window.belongs_to(package))
    }
}

/// Parsed `uiautomator dump` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchySnapshot {
    pub has_root: bool,
    /// Bytes spanned by the `<hierarchy>` element, tags included.
    pub hierarchy_size: usize,
    pub node_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LaunchStrategy {
    DirectIntent,
    LauncherIntent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureReason {
    NeverForeground,
    FocusMismatch,
    WindowGeometry,
    HierarchyEmpty,
    UiTimeout,
    ProbeTimeout,
    ProbeError(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NeverForeground => write!(f, "app never reached foreground"),
            FailureReason::FocusMismatch => write!(f, "focus mismatch"),
            FailureReason::WindowGeometry => {
                write!(f, "window dimensions abnormal (zero-size or blank)")
            }
            FailureReason::HierarchyEmpty => write!(f, "UI hierarchy is empty or too small"),
            FailureReason::UiTimeout => {
                write!(f, "UI load timed out (foregrounded but UI not ready)")
            }
            FailureReason::ProbeTimeout => write!(f, "timed out while checking UI load"),
            FailureReason::ProbeError(message) => {
                write!(f, "error while checking UI load: {message}")
            }
        }
    }
}

/// Result of one readiness verification. Construct through [`ReadinessOutcome::ready`]
/// or [`ReadinessOutcome::failed`] so that a reason exists exactly when the app is not ready.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadinessOutcome {
    ready: bool,
    reason: Option<FailureReason>,
    last_check_failure: Option<FailureReason>,
    elapsed_ms: u128,
}

impl ReadinessOutcome {
    pub fn ready(elapsed_ms: u128) -> Self {
        Self {
            ready: true,
            reason: None,
            last_check_failure: None,
            elapsed_ms,
        }
    }

    pub fn failed(
        reason: FailureReason,
        last_check_failure: Option<FailureReason>,
        elapsed_ms: u128,
    ) -> Self {
        Self {
            ready: false,
            reason: Some(reason),
            last_check_failure,
            elapsed_ms,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        self.reason.as_ref()
    }

    /// The sub-check that failed on the final UI-stage iteration, if any.
    pub fn last_check_failure(&self) -> Option<&FailureReason> {
        self.last_check_failure.as_ref()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavigableItem {
    /// 1-based discovery order.
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraversalRecord {
    pub item: NavigableItem,
    pub success: bool,
    pub attempts: u32,
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "Pass",
            Verdict::Fail => "Fail",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub app: String,
    pub verdict: Verdict,
    pub reason: Option<String>,
}
