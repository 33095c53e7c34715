pub mod adb;
pub mod capture;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod crawler;
pub mod error;
pub mod launcher;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod probe;
pub mod readiness;
pub mod session;
pub mod ui_xml;

#[cfg(test)]
pub mod testing;
