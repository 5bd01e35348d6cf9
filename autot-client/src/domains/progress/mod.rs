//! Background job progress: pending count, sticky flag and adaptive polling.

pub mod poller;
pub mod state;

pub use poller::{PollTrigger, ProgressPoller, ProgressSource, RefreshCallback};
pub use state::ProgressState;
