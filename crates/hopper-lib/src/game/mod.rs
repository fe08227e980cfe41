pub mod installer;

pub use installer::{InstallOutcome, InstallRequest, InstanceInstaller, LoaderChoice};
