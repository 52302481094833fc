#![allow(clippy::doc_markdown)] // README uses "OpenAPI" proper noun throughout
#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! ## API Reference

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bundle;
mod clean;
mod config;
mod error;
mod helpers;
mod localize;
mod optimize;
mod resolve;
mod sanitize;

pub use bundle::{bundle, BundleNaming, BundleOptions, BundleReport};
pub use clean::{clean, clean_with, CleanReport};
pub use config::{BundleConfig, LocalizeConfig, ProjectConfig, SanitizeConfig};
pub use error::{Error, ResolveError, Result};
pub use localize::{localize, LocalizeNaming, LocalizeOptions, LocalizeReport};
pub use optimize::{optimize, optimize_with, NameRequest, OptimizeReport};
#[cfg(feature = "http")]
pub use resolve::ReqwestClient;
pub use resolve::{
    HttpClient, MemoryFs, NoHttp, OsFs, ResolveOptions, Resolved, Resolver, VirtualFs,
};
pub use sanitize::{sanitize, ExtensionFilter, SanitizeOptions, SanitizeReport};

pub use oaskit_core::{CancelToken, ComponentKind, ContentHash, Location, NodeKind};
