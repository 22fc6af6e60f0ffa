//! Target and source declarations.

use crate::{BuildError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// One compilable source file, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceNode {
    path: PathBuf,
}

impl SourceNode {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<&str> for SourceNode {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for SourceNode {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for SourceNode {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

/// One final artifact and the ordered sources it is linked from.
///
/// Always holds at least one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDeclaration {
    name: String,
    sources: Vec<SourceNode>,
}

impl TargetDeclaration {
    /// Declare a target. Fails with `InvalidDeclaration` when the name is
    /// blank or no sources are given.
    pub fn new<I, S>(name: impl Into<String>, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceNode>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BuildError::invalid_declaration(&name, "target name is empty"));
        }

        let sources: Vec<SourceNode> = sources.into_iter().map(Into::into).collect();
        if sources.is_empty() {
            return Err(BuildError::invalid_declaration(&name, "no sources declared"));
        }

        Ok(Self { name, sources })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sources in declaration order.
    pub fn sources(&self) -> &[SourceNode] {
        &self.sources
    }
}
