mod archive;
mod config;
mod error;
mod progress;
mod target;

pub use archive::ArchiveType;
pub use config::UpdaterConfig;
pub use error::UpdateError;
pub use progress::{UpdatePhase, UpdateProgress, UpdateResult};
pub use target::UpdateTarget;

#[cfg(test)]
mod tests;
