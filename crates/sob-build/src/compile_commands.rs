//! compile_commands.json generation.
//!
//! Editors and clang tooling read this file to learn how each source is
//! compiled. Entries come straight from the session's descriptor, so they
//! match what `sob build` runs.

use crate::session::BuildSession;
use crate::toolchain::Toolchain;
use crate::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single compile command from compile_commands.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    /// The working directory for compilation.
    pub directory: PathBuf,

    /// The source file path.
    pub file: PathBuf,

    /// The full compilation command.
    pub command: String,

    /// The object file produced.
    pub output: PathBuf,
}

/// Collection of compile commands.
#[derive(Debug, Clone, Default)]
pub struct CompileCommands {
    commands: Vec<CompileCommand>,
}

impl CompileCommands {
    /// One entry per source of every accepted target. A source shared by
    /// several targets is listed once.
    pub fn from_session<T: Toolchain>(session: &BuildSession<T>) -> Self {
        let descriptor = session.descriptor();
        let directory = session.project_root().to_path_buf();
        let mut commands: Vec<CompileCommand> = Vec::new();

        for target in session.targets() {
            for source in target.sources() {
                if commands.iter().any(|c| c.file == source.path()) {
                    continue;
                }
                commands.push(CompileCommand {
                    directory: directory.clone(),
                    file: source.path().to_path_buf(),
                    command: descriptor.compile_command(source),
                    output: descriptor.object_path_for(source),
                });
            }
        }

        Self { commands }
    }

    /// Parse compile commands from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let commands: Vec<CompileCommand> = serde_json::from_str(json)?;
        Ok(Self { commands })
    }

    /// Get all compile commands.
    pub fn commands(&self) -> &[CompileCommand] {
        &self.commands
    }

    /// Find the compile command for a specific source file.
    pub fn find_command(&self, source: &Path) -> Option<&CompileCommand> {
        self.commands
            .iter()
            .find(|cmd| cmd.file == source || cmd.file.ends_with(source))
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.commands)?)
    }

    /// Write the database to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| BuildError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }
}
