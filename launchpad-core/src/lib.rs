//! Launchpad core library: project descriptors, configuration, errors.
//!
//! Public API surface:
//! - [`tree`]: [`FileSystemTree`] and [`FsNode`], the shape mounted into a sandbox
//! - [`project`]: the built-in starter project
//! - [`config`]: [`LaunchConfig`] load / save / init
//! - [`error`]: [`TreeError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod project;
pub mod tree;

pub use config::{CommandSpec, LaunchConfig};
pub use error::{ConfigError, TreeError};
pub use tree::{FileSystemTree, FsNode};
