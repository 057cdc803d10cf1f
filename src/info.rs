//! Build information baked in at compile time. `PROVISION_BUILD_TIME` and
//! `PROVISION_REVISION` are read from the build environment when set.

use serde::{Deserialize, Serialize};

pub fn build_time() -> &'static str { option_env!("PROVISION_BUILD_TIME").unwrap_or("") }

/// Commit the binary was built from.
pub fn revision() -> &'static str { option_env!("PROVISION_REVISION").unwrap_or("") }

pub fn version() -> &'static str { env!("CARGO_PKG_VERSION") }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub buildtime: String,
    pub revision: String,
    pub version: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self { buildtime: build_time().to_string(), revision: revision().to_string(), version: version().to_string() }
    }
}
