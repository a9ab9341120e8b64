#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod cellart;
pub mod config;
pub mod data;
pub mod engine;
pub mod feed;
pub mod logging;
pub mod media;
pub mod message;
pub mod paging;
pub mod post;
pub mod prefs;
pub mod reconcile;
pub mod thread;
pub mod ui;
pub mod visibility;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
