use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::clock::Clock;
use crate::app::config::ReadinessSettings;
use crate::app::error::AppError;
use crate::app::models::{FailureReason, ReadinessOutcome};
use crate::app::probe::DeviceProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub overall_timeout: Duration,
    pub ui_timeout: Duration,
    pub poll_interval: Duration,
    pub min_hierarchy_len: usize,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::from(&ReadinessSettings::default())
    }
}

impl From<&ReadinessSettings> for ReadinessPolicy {
    fn from(settings: &ReadinessSettings) -> Self {
        Self {
            overall_timeout: settings.overall_timeout(),
            ui_timeout: settings.ui_timeout(),
            poll_interval: settings.poll_interval(),
            min_hierarchy_len: settings.min_hierarchy_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierState {
    WaitingForeground,
    CheckingUi {
        entered_at: Duration,
        last_failure: Option<FailureReason>,
    },
    Ready,
    Failed {
        reason: FailureReason,
        last_failure: Option<FailureReason>,
    },
}

fn probe_failure(err: AppError) -> FailureReason {
    if err.is_timeout() {
        FailureReason::ProbeTimeout
    } else {
        FailureReason::ProbeError(err.error)
    }
}

/// Decides whether a launched app reached the foreground with a usable UI.
///
/// Stage one polls the resumed activity until `overall_timeout`. The first
/// success moves to stage two, which has its own `ui_timeout` budget; each
/// iteration runs the focus, geometry and hierarchy checks in that order and
/// stops at the first one that fails.
pub struct ReadinessVerifier<'a> {
    probe: DeviceProbe<'a>,
    clock: &'a dyn Clock,
    policy: ReadinessPolicy,
}

impl<'a> ReadinessVerifier<'a> {
    pub fn new(probe: DeviceProbe<'a>, clock: &'a dyn Clock, policy: ReadinessPolicy) -> Self {
        Self {
            probe,
            clock,
            policy,
        }
    }

    pub fn verify(&self, package: &str) -> ReadinessOutcome {
        let package = package.trim();
        let started = self.clock.now();
        let mut state = VerifierState::WaitingForeground;
        loop {
            state = match state {
                VerifierState::Ready => {
                    let elapsed = self.clock.now().saturating_sub(started);
                    info!(trace_id = %self.probe.trace_id(), package = %package, elapsed_ms = elapsed.as_millis() as u64, "UI fully loaded");
                    return ReadinessOutcome::ready(elapsed.as_millis());
                }
                VerifierState::Failed {
                    reason,
                    last_failure,
                } => {
                    let elapsed = self.clock.now().saturating_sub(started);
                    warn!(trace_id = %self.probe.trace_id(), package = %package, reason = %reason, "readiness failed");
                    return ReadinessOutcome::failed(reason, last_failure, elapsed.as_millis());
                }
                other => self.step(package, started, other),
            };
        }
    }

    /// Advances one poll iteration. Sleeps only when staying in the same state.
    pub fn step(&self, package: &str, started: Duration, state: VerifierState) -> VerifierState {
        let now = self.clock.now();
        match state {
            VerifierState::WaitingForeground => {
                let elapsed = now.saturating_sub(started);
                if elapsed >= self.policy.overall_timeout {
                    return VerifierState::Failed {
                        reason: FailureReason::NeverForeground,
                        last_failure: None,
                    };
                }
                if self.is_foreground(package) {
                    info!(trace_id = %self.probe.trace_id(), package = %package, elapsed_ms = elapsed.as_millis() as u64, "app is in foreground");
                    return VerifierState::CheckingUi {
                        entered_at: now,
                        last_failure: None,
                    };
                }
                info!(trace_id = %self.probe.trace_id(), package = %package, elapsed_s = elapsed.as_secs(), "waiting for foreground");
                self.clock.sleep(self.policy.poll_interval);
                VerifierState::WaitingForeground
            }
            VerifierState::CheckingUi {
                entered_at,
                last_failure,
            } => {
                if now.saturating_sub(entered_at) >= self.policy.ui_timeout {
                    return VerifierState::Failed {
                        reason: FailureReason::UiTimeout,
                        last_failure,
                    };
                }
                debug!(trace_id = %self.probe.trace_id(), package = %package, "checking UI load state");
                match self.check_ui(package) {
                    Ok(()) => VerifierState::Ready,
                    Err(reason) => {
                        info!(trace_id = %self.probe.trace_id(), package = %package, reason = %reason, "UI check did not pass");
                        self.clock.sleep(self.policy.poll_interval);
                        VerifierState::CheckingUi {
                            entered_at,
                            last_failure: Some(reason),
                        }
                    }
                }
            }
            terminal => terminal,
        }
    }

    fn is_foreground(&self, package: &str) -> bool {
        match self.probe.resumed_activity() {
            Ok(Some(component)) => component.belongs_to(package),
            Ok(None) => false,
            Err(err) => {
                warn!(trace_id = %self.probe.trace_id(), package = %package, error = %err, "resumed activity query failed");
                false
            }
        }
    }

    /// Focus, then geometry, then hierarchy content.
    pub fn check_ui(&self, package: &str) -> Result<(), FailureReason> {
        let windows = self.probe.window_snapshot().map_err(probe_failure)?;

        let focused = windows
            .focused
            .as_ref()
            .map(|component| component.belongs_to(package))
            .unwrap_or(false);
        if !focused {
            return Err(FailureReason::FocusMismatch);
        }
        debug!(trace_id = %self.probe.trace_id(), package = %package, "focus ok");

        let mut matching = windows.windows_for(package).peekable();
        let has_window = matching.peek().is_some();
        if !has_window || matching.any(|window| window.is_degenerate()) {
            return Err(FailureReason::WindowGeometry);
        }
        debug!(trace_id = %self.probe.trace_id(), package = %package, "window geometry ok");

        let hierarchy = self.probe.hierarchy_snapshot().map_err(probe_failure)?;
        if !hierarchy.has_root || hierarchy.hierarchy_size < self.policy.min_hierarchy_len {
            return Err(FailureReason::HierarchyEmpty);
        }
        debug!(trace_id = %self.probe.trace_id(), package = %package, nodes = hierarchy.node_count, "UI hierarchy loaded");
        Ok(())
    }
}
