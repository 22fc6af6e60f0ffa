//! Statically declared C++ builds.
//!
//! This crate provides:
//! - Toolchain descriptors for GNU, Clang and MSVC
//! - A resolver that compiles a target's sources in order and links them
//! - Build sessions with per-target failure isolation
//! - The `sob.toml` manifest format
//! - compile_commands.json generation
//!
//! # Example
//!
//! ```toml
//! # sob.toml
//! [project]
//! name = "sob"
//!
//! [toolchain.gnu]
//! link_flags = ["`llvm-config --cxxflags --ldflags --system-libs --libs all`"]
//!
//! [[target]]
//! name = "toy"
//! sources = ["toy.cpp"]
//! ```
//!
//! The same graph can be declared in code:
//!
//! ```
//! use sob_build::{BuildSession, Gnu, RecordingRunner, TargetDeclaration, ToolchainDescriptor};
//!
//! let mut session = BuildSession::new(ToolchainDescriptor::<Gnu>::new());
//! session.declare(TargetDeclaration::new("app", ["a.cpp", "b.cpp"])?)?;
//!
//! let plan = session.plan()?;
//! assert_eq!(plan[0].1.last().unwrap(), "g++ build/a.o build/b.o -o app");
//! # Ok::<(), sob_build::BuildError>(())
//! ```

mod compile_commands;
mod config;
mod error;
mod resolver;
mod runner;
mod session;
mod target;
mod toolchain;

pub use compile_commands::{CompileCommand, CompileCommands};
pub use config::{BuildDirs, BuildManifest, FlagSet, ProjectConfig, TargetConfig, ToolchainConfig};
pub use error::{BuildError, Result};
pub use resolver::{BuildOptions, BuiltTarget, Phase, Resolver, TargetState};
pub use runner::{CommandRunner, ProcessOutput, RecordingRunner, ShellRunner};
pub use session::{BuildSession, SessionReport, TargetOutcome};
pub use target::{SourceNode, TargetDeclaration};
pub use toolchain::{
    find_on_path, Clang, Gnu, Msvc, Toolchain, ToolchainChoice, ToolchainDescriptor, ToolchainKind,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_manifest() {
        let toml = r#"
[project]
name = "test-project"

[[target]]
name = "main"
sources = ["src/main.cc"]
        "#;

        let manifest = BuildManifest::parse(toml).expect("Failed to parse manifest");
        assert_eq!(manifest.project.name, "test-project");
        assert_eq!(manifest.targets.len(), 1);
        assert_eq!(manifest.targets[0].name, "main");
    }
}
