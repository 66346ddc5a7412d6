//! Host platform utility functions

use std::path::PathBuf;
use thiserror::Error;

/// Name of the environment variable pointing at the software root directory.
pub const SW_ROOT_ENV_VAR: &str = "DIFFBOT_SW_ROOT";

/// Errors which can occur when querying the host environment.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("The software root environment variable (DIFFBOT_SW_ROOT) is not set")]
    SwRootNotSet,
}

/// Get the root directory of the software installation.
///
/// The root is given by the `DIFFBOT_SW_ROOT` environment variable and
/// contains the `params` and `sessions` directories.
pub fn get_diffbot_sw_root() -> Result<PathBuf, HostError> {
    match std::env::var(SW_ROOT_ENV_VAR) {
        Ok(v) => Ok(PathBuf::from(v)),
        Err(_) => Err(HostError::SwRootNotSet),
    }
}
