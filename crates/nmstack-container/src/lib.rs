pub mod compose;
pub mod engine;
pub mod error;
pub mod image;
pub mod installer;
pub mod probe;
pub mod runner;

pub use compose::ComposeCommand;
pub use engine::*;
pub use error::*;
pub use installer::{InstallOutcome, OsRelease, PackageFamily, RuntimeInstaller};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
