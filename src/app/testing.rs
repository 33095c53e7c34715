//! Scripted device and session doubles shared by unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::app::adb::runner::{CommandOutput, DeviceShell};
use crate::app::clock::{Clock, ManualClock};
use crate::app::crawler::title_xpath;
use crate::app::error::AppError;
use crate::app::session::{
    ElementId, Locator, Point, Rect, ScreenSize, SessionFactory, SessionOptions, UiSession,
};

pub const TEST_TRACE_ID: &str = "trace-test";

pub const DUMP_OK: &str = "UI hierchary dumped to: /sdcard/ui_dump.xml";

type Responder = Box<dyn Fn(Duration, &[String], &str) -> Result<CommandOutput, AppError>>;

/// `DeviceShell` whose answers are matched by substring on the joined argv.
/// The most recently registered matching responder wins; unmatched commands
/// exit 0 with empty output. `uiautomator dump` reports success unless a
/// test overrides it.
pub struct FakeShell<'a> {
    clock: Option<&'a ManualClock>,
    responders: RefCell<Vec<(String, Responder)>>,
    calls: RefCell<Vec<String>>,
}

impl FakeShell<'static> {
    pub fn new() -> Self {
        Self::build(None)
    }
}

impl<'a> FakeShell<'a> {
    pub fn with_clock(clock: &'a ManualClock) -> Self {
        Self::build(Some(clock))
    }

    fn build(clock: Option<&'a ManualClock>) -> Self {
        let shell = Self {
            clock,
            responders: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        };
        shell.respond("uiautomator dump", |_| Ok(DUMP_OK.to_string()));
        shell
    }

    pub fn respond<F>(&self, pattern: &str, responder: F)
    where
        F: Fn(Duration) -> Result<String, AppError> + 'static,
    {
        self.responders.borrow_mut().push((
            pattern.to_string(),
            Box::new(move |now, _, _| responder(now).map(CommandOutput::from_stdout)),
        ));
    }

    /// Like [`FakeShell::respond`], but the responder sees the full argv.
    pub fn respond_args<F>(&self, pattern: &str, responder: F)
    where
        F: Fn(&[String]) -> Result<String, AppError> + 'static,
    {
        self.responders.borrow_mut().push((
            pattern.to_string(),
            Box::new(move |_, args, _| responder(args).map(CommandOutput::from_stdout)),
        ));
    }

    pub fn fail<F>(&self, pattern: &str, error: F)
    where
        F: Fn(&str) -> AppError + 'static,
    {
        self.responders
            .borrow_mut()
            .push((pattern.to_string(), Box::new(move |_, _, trace| Err(error(trace)))));
    }

    pub fn respond_bytes(&self, pattern: &str, bytes: Vec<u8>) {
        self.responders.borrow_mut().push((
            pattern.to_string(),
            Box::new(move |_, _, _| {
                Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&bytes).to_string(),
                    raw_stdout: bytes.clone(),
                    ..CommandOutput::from_stdout("")
                })
            }),
        ));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.contains(pattern))
            .count()
    }
}

impl DeviceShell for FakeShell<'_> {
    fn trace_id(&self) -> &str {
        TEST_TRACE_ID
    }

    fn adb(&self, args: &[String], _timeout: Duration) -> Result<CommandOutput, AppError> {
        let joined = args.join(" ");
        self.calls.borrow_mut().push(joined.clone());
        let now = self.clock.map(|clock| clock.now()).unwrap_or_default();
        let responders = self.responders.borrow();
        match responders
            .iter()
            .rev()
            .find(|(pattern, _)| joined.contains(pattern.as_str()))
        {
            Some((_, responder)) => responder(now, args, TEST_TRACE_ID),
            None => Ok(CommandOutput::from_stdout("")),
        }
    }
}

pub fn activities_output(package: &str) -> String {
    format!(
        "ACTIVITY MANAGER ACTIVITIES (dumpsys activity activities)\n\
         Display #0 (activities from top to bottom):\n\
         \x20 * Task{{41 #12 type=standard A=10041:{package}}}\n\
         \x20   mResumedActivity: ActivityRecord{{3f2a1b u0 {package}/.MainActivity t12}}\n"
    )
}

pub fn windows_output(focus_package: &str, window_package: &str, width: i32, height: i32) -> String {
    format!(
        "WINDOW MANAGER WINDOWS (dumpsys window windows)\n\
         \x20 Window #0 Window{{a11 u0 StatusBar}}:\n\
         \x20   mDisplayId=0 package=com.android.systemui\n\
         \x20   mFrame=[0,0][1080,63] last=[0,0][1080,63]\n\
         \x20 Window #1 Window{{8c2c6e1 u0 {window_package}/{window_package}.Main}}:\n\
         \x20   mDisplayId=0 package={window_package}\n\
         \x20   mFrame=[0,0][{width},{height}] last=[0,0][{width},{height}]\n\
         \x20 mCurrentFocus=Window{{8c2c6e1 u0 {focus_package}/{focus_package}.Main}}\n"
    )
}

pub fn hierarchy_output(labels: &[&str]) -> String {
    let nodes: String = labels
        .iter()
        .enumerate()
        .map(|(index, label)| {
            format!(
                "<node index=\"{index}\" text=\"{label}\" resource-id=\"android:id/title\" class=\"android.widget.TextView\" bounds=\"[0,{top}][300,{bottom}]\" />",
                top = index * 100,
                bottom = index * 100 + 90
            )
        })
        .collect();
    format!("<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation=\"0\">{nodes}</hierarchy>")
}

/// One labelled row in the simulated settings list.
#[derive(Debug, Clone)]
pub struct FakeItem {
    pub label: String,
    pub x: f64,
    pub unreadable: bool,
    pub unreachable: bool,
}

impl FakeItem {
    pub fn left(label: &str) -> Self {
        Self {
            label: label.to_string(),
            x: 40.0,
            unreadable: false,
            unreachable: false,
        }
    }

    pub fn right(label: &str) -> Self {
        Self {
            x: 800.0,
            ..Self::left(label)
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }
}

/// Observable state of a [`FakeSession`], shared with the test body.
#[derive(Debug)]
pub struct FakeScreen {
    pub items: Vec<FakeItem>,
    pub page_size: usize,
    pub scroll_step: usize,
    pub offset: usize,
    pub screen: ScreenSize,
    pub screen_size_fails: bool,
    pub title_resource_id: String,
    pub taps: Vec<Point>,
    pub swipes: usize,
    pub rewinds: usize,
    pub screenshots: Vec<PathBuf>,
    pub quit: bool,
}

impl FakeScreen {
    pub fn new(items: Vec<FakeItem>) -> Self {
        Self {
            items,
            page_size: 4,
            scroll_step: 2,
            offset: 0,
            screen: ScreenSize {
                width: 1000.0,
                height: 2000.0,
            },
            screen_size_fails: false,
            title_resource_id: "android:id/title".to_string(),
            taps: Vec::new(),
            swipes: 0,
            rewinds: 0,
            screenshots: Vec::new(),
            quit: false,
        }
    }

    fn visible(&self) -> std::ops::Range<usize> {
        let end = (self.offset + self.page_size).min(self.items.len());
        self.offset.min(end)..end
    }

    fn max_offset(&self) -> usize {
        self.items.len().saturating_sub(self.page_size)
    }
}

pub struct FakeSession {
    screen: Rc<RefCell<FakeScreen>>,
    rects: HashMap<String, Rect>,
    trace_id: String,
}

impl FakeSession {
    pub fn new(screen: Rc<RefCell<FakeScreen>>) -> Self {
        Self {
            screen,
            rects: HashMap::new(),
            trace_id: TEST_TRACE_ID.to_string(),
        }
    }

    fn item_index(&self, element: &ElementId) -> Result<usize, AppError> {
        element
            .0
            .strip_prefix("item-")
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| AppError::not_found("stale element reference", &self.trace_id))
    }

    fn row_rect(screen: &FakeScreen, index: usize) -> Rect {
        let row = index.saturating_sub(screen.offset) as f64;
        Rect {
            x: screen.items[index].x,
            y: 200.0 + row * 150.0,
            width: 200.0,
            height: 100.0,
        }
    }
}

impl UiSession for FakeSession {
    fn screen_size(&mut self) -> Result<ScreenSize, AppError> {
        let screen = self.screen.borrow();
        if screen.screen_size_fails {
            return Err(AppError::dependency("window/rect request failed", TEST_TRACE_ID));
        }
        Ok(screen.screen)
    }

    fn find_element(&mut self, locator: &Locator) -> Result<ElementId, AppError> {
        let mut screen = self.screen.borrow_mut();
        match locator {
            Locator::UiAutomator(expression) => {
                if expression.contains("scrollToBeginning") {
                    screen.offset = 0;
                    screen.rewinds += 1;
                }
                Ok(ElementId("scrollable".to_string()))
            }
            Locator::XPath(xpath) => {
                let title_id = screen.title_resource_id.clone();
                let found = screen.visible().find(|index| {
                    let item = &screen.items[*index];
                    !item.unreachable && *xpath == title_xpath(&title_id, &item.label)
                });
                match found {
                    Some(index) => {
                        let rect = Self::row_rect(&screen, index);
                        drop(screen);
                        self.rects.insert(format!("item-{index}"), rect);
                        Ok(ElementId(format!("item-{index}")))
                    }
                    None => Err(AppError::not_found("no such element", &self.trace_id)),
                }
            }
        }
    }

    fn find_elements(&mut self, _locator: &Locator) -> Result<Vec<ElementId>, AppError> {
        let screen = self.screen.borrow();
        let visible: Vec<usize> = screen.visible().collect();
        let rects: Vec<(String, Rect)> = visible
            .iter()
            .map(|index| (format!("item-{index}"), Self::row_rect(&screen, *index)))
            .collect();
        drop(screen);
        let mut ids = Vec::new();
        for (id, rect) in rects {
            self.rects.insert(id.clone(), rect);
            ids.push(ElementId(id));
        }
        Ok(ids)
    }

    fn element_text(&mut self, element: &ElementId) -> Result<String, AppError> {
        let index = self.item_index(element)?;
        let screen = self.screen.borrow();
        let item = screen
            .items
            .get(index)
            .ok_or_else(|| AppError::not_found("stale element reference", &self.trace_id))?;
        if item.unreadable {
            return Err(AppError::system("element text unavailable", &self.trace_id));
        }
        Ok(item.label.clone())
    }

    fn element_rect(&mut self, element: &ElementId) -> Result<Rect, AppError> {
        self.rects
            .get(&element.0)
            .copied()
            .ok_or_else(|| AppError::not_found("stale element reference", &self.trace_id))
    }

    fn tap(&mut self, point: Point, _hold: Duration) -> Result<(), AppError> {
        self.screen.borrow_mut().taps.push(point);
        Ok(())
    }

    fn swipe(&mut self, from: Point, to: Point, _duration: Duration) -> Result<(), AppError> {
        let mut screen = self.screen.borrow_mut();
        screen.swipes += 1;
        if from.y > to.y {
            let next = screen.offset + screen.scroll_step;
            screen.offset = next.min(screen.max_offset());
        } else {
            screen.offset = screen.offset.saturating_sub(screen.scroll_step);
        }
        Ok(())
    }

    fn save_screenshot(&mut self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::system(err.to_string(), &self.trace_id))?;
        }
        fs::write(path, b"\x89PNG\r\n\x1a\nfake")
            .map_err(|err| AppError::system(err.to_string(), &self.trace_id))?;
        self.screen.borrow_mut().screenshots.push(path.to_path_buf());
        Ok(())
    }

    fn quit(&mut self) -> Result<(), AppError> {
        self.screen.borrow_mut().quit = true;
        Ok(())
    }
}

/// Hands out [`FakeSession`]s over one shared screen, or refuses to connect.
pub struct FakeSessionFactory {
    pub screen: Rc<RefCell<FakeScreen>>,
    pub unreachable: bool,
    pub opened: RefCell<usize>,
}

impl FakeSessionFactory {
    pub fn new(items: Vec<FakeItem>) -> Self {
        Self {
            screen: Rc::new(RefCell::new(FakeScreen::new(items))),
            unreachable: false,
            opened: RefCell::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn opened(&self) -> usize {
        *self.opened.borrow()
    }
}

impl SessionFactory for FakeSessionFactory {
    fn open(&self, _options: &SessionOptions) -> Result<Box<dyn UiSession>, AppError> {
        if self.unreachable {
            return Err(AppError::dependency(
                "Appium server unreachable: connection refused",
                TEST_TRACE_ID,
            ));
        }
        *self.opened.borrow_mut() += 1;
        Ok(Box::new(FakeSession::new(Rc::clone(&self.screen))))
    }
}
