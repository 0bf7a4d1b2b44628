//! Project descriptor: an in-memory file tree to provision into a sandbox.
//!
//! The serialized shape nests directories inside their parent:
//!
//! ```text
//! {
//!   "index.js": { "file": { "contents": "..." } },
//!   "src":      { "directory": { "app.js": { "file": { "contents": "..." } } } }
//! }
//! ```
//!
//! An entry is either a file leaf or a directory node, never both; the
//! externally tagged [`FsNode`] enum rejects anything else at parse time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// One entry of a [`FileSystemTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsNode {
    File { contents: String },
    Directory(FileSystemTree),
}

/// Mapping from entry name to file contents or a nested tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSystemTree(BTreeMap<String, FsNode>);

impl FileSystemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a file entry.
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.0.insert(
            name.into(),
            FsNode::File {
                contents: contents.into(),
            },
        );
        self
    }

    /// Builder: add a nested directory entry.
    pub fn with_directory(mut self, name: impl Into<String>, tree: FileSystemTree) -> Self {
        self.0.insert(name.into(), FsNode::Directory(tree));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FsNode> {
        self.0.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FsNode)> {
        self.0.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check every entry name, recursively.
    pub fn validate(&self) -> Result<(), TreeError> {
        self.validate_under("")
    }

    fn validate_under(&self, parent: &str) -> Result<(), TreeError> {
        for (name, node) in &self.0 {
            if name.is_empty() {
                return Err(TreeError::EmptyName {
                    parent: display_parent(parent),
                });
            }
            if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
                return Err(TreeError::InvalidName {
                    parent: display_parent(parent),
                    name: name.clone(),
                });
            }
            if let FsNode::Directory(child) = node {
                child.validate_under(&join(parent, name))?;
            }
        }
        Ok(())
    }

    /// All directories as `/`-separated relative paths, parents before children.
    pub fn directories(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_dirs("", &mut out);
        out
    }

    fn collect_dirs(&self, parent: &str, out: &mut Vec<String>) {
        for (name, node) in &self.0 {
            if let FsNode::Directory(child) = node {
                let path = join(parent, name);
                out.push(path.clone());
                child.collect_dirs(&path, out);
            }
        }
    }

    /// All files as `(relative path, contents)`, sorted by path.
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        self.collect_files("", &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn collect_files<'a>(&'a self, parent: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, node) in &self.0 {
            match node {
                FsNode::File { contents } => out.push((join(parent, name), contents.as_str())),
                FsNode::Directory(child) => child.collect_files(&join(parent, name), out),
            }
        }
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn display_parent(parent: &str) -> String {
    if parent.is_empty() {
        "/".to_string()
    } else {
        parent.to_string()
    }
}
