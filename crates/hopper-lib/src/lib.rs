//! Installation engine for Minecraft modpack instances.
//!
//! The public entry point is [`game::installer::InstanceInstaller`], which drives
//! the vanilla core download, mod loader installation, pack artifact download and
//! loader processor pipeline for a single instance directory.

pub mod error;
pub mod game;
pub mod utils;

pub use error::{ErrorKind, InstallError, InstallResult};
