pub mod config;
pub mod error;
pub mod launcher;
pub mod menu;

pub use config::{LaunchEntry, LauncherConfig};
pub use error::LauncherError;
pub use launcher::{LaunchReport, Launcher};
pub use menu::run_menu;
