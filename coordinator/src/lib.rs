mod coordinator;
mod error;
mod state;

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::UpgradeError;
pub use state::{Completion, CoordinatorState};
