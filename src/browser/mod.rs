//! Browser management: cache paths, Chrome for Testing installation, and
//! chromedriver-backed launching.

mod installer;
mod launcher;
pub mod paths;

pub use installer::{install, InstallResult};
pub use launcher::{launch, LaunchOptions, LaunchedBrowser};
