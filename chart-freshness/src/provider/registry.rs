//! Process-wide provider registry
//!
//! One provider per process, registered once by the application at startup. Nothing
//! is created implicitly; code that needs the provider and cannot be given a handle
//! asks [`installed`].

use std::sync::OnceLock;

use tracing::info;

use crate::error::ChartError;
use crate::provider::ChartProvider;

static INSTALLED: OnceLock<ChartProvider> = OnceLock::new();

/// Register `provider` as the process-wide instance
pub fn install(provider: ChartProvider) -> Result<(), ChartError> {
    INSTALLED
        .set(provider)
        .map_err(|_| ChartError::AlreadyInstalled)?;
    info!("Chart provider installed");
    Ok(())
}

/// The registered provider, if the application installed one
pub fn installed() -> Option<&'static ChartProvider> {
    INSTALLED.get()
}
