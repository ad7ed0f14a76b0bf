mod error;
mod process;

pub use error::SupervisorError;
pub use process::{NodeProcess, ProcessSupervisor, StdioMode};

use async_trait::async_trait;

/// Starts and stops the supervised node.
///
/// Implementations must not block in `launch` until the child exits.
#[async_trait]
pub trait Supervisor: Send + Sync {
    type Handle: Send;

    /// Starts whatever binary `current` designates with `args`.
    async fn launch(&self, args: &[String]) -> Result<Self::Handle, SupervisorError>;

    /// Forcibly terminates the child. No graceful stop is attempted.
    async fn kill(&self, handle: &mut Self::Handle) -> Result<(), SupervisorError>;
}
