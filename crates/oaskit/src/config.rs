//! Project-level configuration loaded from YAML.
//!
//! Keeps per-project choices (naming strategies, output directory, which
//! extensions to strip) next to the API documents instead of on every
//! command line.
//!
//! # File format
//!
//! ```yaml
//! # api/oaskit.yaml
//! bundle:
//!   naming: counter        # counter | filepath
//!
//! localize:
//!   target_directory: api/localized
//!   naming: path_based     # path_based | counter
//!
//! sanitize:
//!   extensions:
//!     keep: ["x-speakeasy-*"]
//!     remove: []           # empty = every extension not kept
//!   keep_unused_components: false
//!   keep_unknown_properties: false
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::bundle::BundleNaming;
use crate::localize::LocalizeNaming;
use crate::sanitize::ExtensionFilter;

/// Project-level oaskit config.
///
/// Loaded from a YAML file via [`ProjectConfig::load`], then applied to the
/// engine option builders (`with_project_config`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Bundle settings.
    pub bundle: BundleConfig,

    /// Localize settings.
    pub localize: LocalizeConfig,

    /// Sanitize settings.
    pub sanitize: SanitizeConfig,
}

/// `bundle:` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Fallback naming when a simple component name is already taken.
    pub naming: BundleNaming,
}

/// `localize:` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LocalizeConfig {
    /// Directory that receives the copied files.
    pub target_directory: Option<String>,

    /// File naming when base names collide.
    pub naming: LocalizeNaming,
}

/// `sanitize:` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Which `x-*` extensions survive.
    pub extensions: ExtensionFilter,

    /// Skip the final Clean pass.
    pub keep_unused_components: bool,

    /// Keep fields the OpenAPI object model does not define.
    pub keep_unknown_properties: bool,
}

impl ProjectConfig {
    /// Load config from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml_ng::from_str(&content)?;
        Ok(config)
    }
}
