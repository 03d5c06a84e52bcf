mod fetch;
mod session;

pub use fetch::Fetcher;
pub use session::{ProgressSink, UpdateSession};
