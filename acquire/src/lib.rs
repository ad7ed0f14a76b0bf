//! Fetching, verifying and building upgrade binaries.

mod archive;
mod config;
mod error;
mod mirror;

pub use config::{AcquireConfig, BuildRecipe, DEFAULT_MIRRORS};
pub use error::AcquireError;
pub use mirror::MirrorAcquirer;

use async_trait::async_trait;
use cutover_core::UpgradeInfo;

/// Makes an upgrade binary available at its canonical path.
///
/// Implementations are idempotent: an already installed binary is left as is.
#[async_trait]
pub trait Acquire: Send + Sync {
    async fn acquire(&self, upgrade: &UpgradeInfo) -> Result<(), AcquireError>;
}
