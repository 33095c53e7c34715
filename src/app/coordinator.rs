use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::app::adb::runner::DeviceShell;
use crate::app::capture::capture_app_screenshot;
use crate::app::clock::Clock;
use crate::app::config::AppConfig;
use crate::app::crawler::{run_crawl, CrawlReport};
use crate::app::launcher::{force_stop, launch_app};
use crate::app::ledger::{failure_text, RunLedger};
use crate::app::models::ReadinessOutcome;
use crate::app::probe::DeviceProbe;
use crate::app::readiness::{ReadinessPolicy, ReadinessVerifier};
use crate::app::session::{SessionFactory, SessionOptions};

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Follow-up work run only after an app is confirmed ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PostReadyTask {
    SettingsCrawl,
}

pub fn post_ready_task(package: &str, crawl_targets: &[String]) -> Option<PostReadyTask> {
    let package = package.trim();
    crawl_targets
        .iter()
        .any(|target| target.trim() == package)
        .then_some(PostReadyTask::SettingsCrawl)
}

#[derive(Debug, Clone, Serialize)]
pub struct AppReport {
    pub package: String,
    pub launched: bool,
    pub outcome: ReadinessOutcome,
    pub screenshot: Option<PathBuf>,
    pub task: Option<PostReadyTask>,
    pub crawl: Option<CrawlReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub apps: Vec<AppReport>,
    pub ledger: RunLedger,
}

/// Drives launch, verification, capture, follow-up and force-stop for each
/// app in turn. Nothing here aborts the run; every failure ends up in the
/// ledger or the log.
pub struct RunCoordinator<'a> {
    shell: &'a dyn DeviceShell,
    clock: &'a dyn Clock,
    sessions: &'a dyn SessionFactory,
    config: &'a AppConfig,
    output_dir: PathBuf,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        shell: &'a dyn DeviceShell,
        clock: &'a dyn Clock,
        sessions: &'a dyn SessionFactory,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            shell,
            clock,
            sessions,
            config,
            output_dir: PathBuf::from(&config.run.output_dir),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn trace_id(&self) -> &str {
        self.shell.trace_id()
    }

    pub fn run(&self, apps: &[String]) -> RunReport {
        let mut ledger = RunLedger::new();
        let mut reports = Vec::with_capacity(apps.len());
        for package in apps {
            let report = self.process_app(package);
            ledger.record(&report.package, &report.outcome);
            reports.push(report);
        }
        info!(
            trace_id = %self.trace_id(),
            apps = ledger.len(),
            all_passed = ledger.all_passed(),
            "run finished"
        );
        RunReport {
            apps: reports,
            ledger,
        }
    }

    pub fn verify(&self, package: &str) -> ReadinessOutcome {
        let probe = DeviceProbe::new(self.shell, self.config.readiness.query_timeout());
        let policy = ReadinessPolicy::from(&self.config.readiness);
        ReadinessVerifier::new(probe, self.clock, policy).verify(package)
    }

    /// Launch, verify and capture one app without follow-up work.
    pub fn check_app(&self, package: &str) -> AppReport {
        let package = package.trim().to_string();
        println!("\n--- {package} ---");
        let launched = launch_app(self.shell, &package, self.config.readiness.launch_timeout());

        let outcome = self.verify(&package);
        if outcome.is_ready() {
            println!("{package} is ready ({} ms)", outcome.elapsed_ms());
        } else {
            println!("{package} failed: {}", failure_text(&outcome));
        }

        let screenshot = match capture_app_screenshot(
            self.shell,
            &package,
            &self.output_dir,
            CAPTURE_TIMEOUT,
        ) {
            Ok(path) => {
                println!("Screenshot saved: {}", path.display());
                Some(path)
            }
            Err(err) => {
                warn!(trace_id = %self.trace_id(), package = %package, error = %err, "screenshot failed");
                None
            }
        };

        AppReport {
            package,
            launched,
            outcome,
            screenshot,
            task: None,
            crawl: None,
        }
    }

    pub fn process_app(&self, package: &str) -> AppReport {
        let mut report = self.check_app(package);
        let stop_timeout = self.config.readiness.query_timeout();

        if !report.outcome.is_ready() {
            println!("Skipping follow-up for {}", report.package);
            force_stop(self.shell, &report.package, stop_timeout);
            return report;
        }

        report.task = post_ready_task(&report.package, &self.config.run.crawl_targets);
        if let Some(PostReadyTask::SettingsCrawl) = report.task {
            report.crawl = self.crawl();
        }

        force_stop(self.shell, &report.package, stop_timeout);
        self.clock
            .sleep(Duration::from_millis(self.config.run.pause_between_apps_ms));
        report
    }

    /// Crawls the settings UI that is already on screen.
    pub fn crawl(&self) -> Option<CrawlReport> {
        let options = SessionOptions::from(&self.config.appium);
        match run_crawl(
            self.sessions,
            &options,
            &self.config.crawler,
            self.clock,
            &self.output_dir,
            self.trace_id(),
        ) {
            Ok(report) => {
                println!("Crawl screenshots saved in {}", report.folder.display());
                Some(report)
            }
            Err(err) => {
                println!("Crawl failed: {err}");
                warn!(trace_id = %self.trace_id(), error = %err, "crawl failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::clock::ManualClock;
    use crate::app::config::SETTINGS_PACKAGE;
    use crate::app::models::FailureReason;
    use crate::app::testing::{
        activities_output, hierarchy_output, windows_output, FakeItem, FakeSessionFactory, FakeShell,
    };

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nframe";

    fn config() -> AppConfig {
        AppConfig::default()
    }

    fn healthy_device(shell: &FakeShell<'_>, package: &'static str) {
        shell.respond("dumpsys activity activities", move |_| Ok(activities_output(package)));
        shell.respond("dumpsys window windows", move |_| {
            Ok(windows_output(package, package, 1080, 2340))
        });
        shell.respond("shell cat", |_| Ok(hierarchy_output(&["Network", "Display"])));
        shell.respond_bytes("exec-out screencap", PNG.to_vec());
    }

    #[test]
    fn post_ready_task_only_for_crawl_targets() {
        let targets = vec![SETTINGS_PACKAGE.to_string()];
        assert_eq!(
            post_ready_task(" com.android.settings ", &targets),
            Some(PostReadyTask::SettingsCrawl)
        );
        assert_eq!(post_ready_task("com.viewsonic.droid", &targets), None);
    }

    #[test]
    fn ready_settings_app_is_crawled_then_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new();
        let shell = FakeShell::with_clock(&clock);
        healthy_device(&shell, SETTINGS_PACKAGE);
        let sessions = FakeSessionFactory::new(vec![FakeItem::left("Network")]);
        let config = config();
        let coordinator =
            RunCoordinator::new(&shell, &clock, &sessions, &config).with_output_dir(dir.path());

        let report = coordinator.run(&[SETTINGS_PACKAGE.to_string()]);

        let app = &report.apps[0];
        assert!(app.launched);
        assert!(app.outcome.is_ready());
        assert!(app.screenshot.as_ref().is_some_and(|path| path.is_file()));
        assert_eq!(app.crawl.as_ref().map(CrawlReport::captured), Some(1));
        assert_eq!(sessions.opened(), 1);
        assert_eq!(shell.count("am force-stop com.android.settings"), 1);
        assert!(report.ledger.all_passed());
    }

    #[test]
    fn app_that_never_foregrounds_is_failed_captured_and_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new();
        let shell = FakeShell::with_clock(&clock);
        shell.respond("dumpsys activity activities", |_| {
            Ok(activities_output("com.android.launcher3"))
        });
        shell.respond_bytes("exec-out screencap", PNG.to_vec());
        let sessions = FakeSessionFactory::new(vec![FakeItem::left("Network")]);
        let config = config();
        let coordinator =
            RunCoordinator::new(&shell, &clock, &sessions, &config).with_output_dir(dir.path());

        let report = coordinator.run(&[SETTINGS_PACKAGE.to_string()]);

        let app = &report.apps[0];
        assert_eq!(app.outcome.reason(), Some(&FailureReason::NeverForeground));
        assert_eq!(shell.count("exec-out screencap"), 1);
        assert_eq!(sessions.opened(), 0);
        assert_eq!(shell.count("am force-stop com.android.settings"), 1);
        let entry = &report.ledger.entries()[0];
        assert_eq!(entry.reason.as_deref(), Some("app never reached foreground"));
    }

    #[test]
    fn every_app_gets_one_outcome_and_one_capture_attempt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new();
        let shell = FakeShell::with_clock(&clock);
        healthy_device(&shell, "com.viewsonic.droid");
        shell.fail("exec-out screencap", |trace| {
            crate::app::error::AppError::dependency("device offline", trace)
        });
        let sessions = FakeSessionFactory::unreachable();
        let config = config();
        let coordinator =
            RunCoordinator::new(&shell, &clock, &sessions, &config).with_output_dir(dir.path());
        let apps = vec![
            "com.mvbcast.crosswalk".to_string(),
            "com.viewsonic.droid".to_string(),
            SETTINGS_PACKAGE.to_string(),
        ];

        let report = coordinator.run(&apps);

        assert_eq!(report.ledger.len(), 3);
        assert_eq!(shell.count("exec-out screencap"), 3);
        let verdicts: Vec<&str> = report
            .ledger
            .entries()
            .iter()
            .map(|entry| entry.verdict.as_str())
            .collect();
        assert_eq!(verdicts, vec!["Fail", "Pass", "Fail"]);
        assert!(report.apps.iter().all(|app| app.screenshot.is_none()));
        assert_eq!(shell.count("am force-stop"), 3);
    }

    #[test]
    fn crawl_failure_does_not_fail_the_app() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new();
        let shell = FakeShell::with_clock(&clock);
        healthy_device(&shell, SETTINGS_PACKAGE);
        let sessions = FakeSessionFactory::unreachable();
        let config = config();
        let coordinator =
            RunCoordinator::new(&shell, &clock, &sessions, &config).with_output_dir(dir.path());

        let report = coordinator.run(&[SETTINGS_PACKAGE.to_string()]);

        assert!(report.apps[0].outcome.is_ready());
        assert_eq!(report.apps[0].task, Some(PostReadyTask::SettingsCrawl));
        assert!(report.apps[0].crawl.is_none());
        assert!(report.ledger.all_passed());
        assert_eq!(shell.count("am force-stop"), 1);
    }
}
