//! Shared primitives for the oaskit document transforms.
//!
//! - [`reference`]: `$ref` classification and path algebra that keeps every
//!   reference in root-document coordinates
//! - [`pointer`]: JSON-pointer [`Location`]s with get/set/remove on a live tree
//! - [`hash`]: canonical structural hashing of schema subtrees
//! - [`walk`]: the typed, cancellable document walker
//!
//! You should not need to depend on this crate directly; use `oaskit`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod hash;
pub mod pointer;
pub mod reference;
pub mod walk;

pub use error::{ReferenceError, WalkError};
pub use hash::ContentHash;
pub use pointer::Location;
pub use reference::{resolve_against, Reference, ReferenceKind};
pub use walk::{walk, CancelToken, ComponentKind, Flow, NodeKind, Visit, WalkOptions};
