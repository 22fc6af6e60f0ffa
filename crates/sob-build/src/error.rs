//! Error types for sob-build.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sob-build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that can occur while declaring or building targets.
#[derive(Error, Diagnostic, Debug)]
pub enum BuildError {
    /// A target declaration was rejected before any process ran.
    #[error("Invalid declaration for target `{target}`: {reason}")]
    #[diagnostic(code(sob::invalid_declaration))]
    InvalidDeclaration { target: String, reason: String },

    /// The compiler exited non-zero for one source file.
    #[error("Compilation failed for {}{}", .source_path.display(), exit_suffix(.status))]
    #[diagnostic(code(sob::compile_failure))]
    CompileFailure {
        source_path: PathBuf,
        status: Option<i32>,
        #[help]
        diagnostics: Option<String>,
    },

    /// The linker exited non-zero.
    #[error("Link failed for target `{target}`{}", exit_suffix(.status))]
    #[diagnostic(code(sob::link_failure))]
    LinkFailure {
        target: String,
        status: Option<i32>,
        #[help]
        diagnostics: Option<String>,
    },

    /// The shell or the tool it names could not be started.
    #[error("Failed to start `{command}`: {source}")]
    #[diagnostic(
        code(sob::spawn_failure),
        help("check that the toolchain is installed and on PATH")
    )]
    ProcessSpawnFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create an output directory.
    #[error("Failed to create directory {}: {source}", .path.display())]
    #[diagnostic(code(sob::create_dir))]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read the manifest file.
    #[error("Failed to read manifest {}: {source}", .path.display())]
    #[diagnostic(code(sob::read_manifest))]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the TOML manifest.
    #[error("Failed to parse TOML manifest: {0}")]
    #[diagnostic(code(sob::parse_toml))]
    ParseToml(#[from] toml::de::Error),

    /// Failed to serialize or parse JSON (compile_commands.json).
    #[error("Failed to process JSON: {0}")]
    #[diagnostic(code(sob::json))]
    ParseJson(#[from] serde_json::Error),

    /// Failed to write an output file.
    #[error("Failed to write {}: {source}", .path.display())]
    #[diagnostic(code(sob::write_file))]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Toolchain name not recognized.
    #[error("Unknown toolchain: {0}")]
    #[diagnostic(
        code(sob::unknown_toolchain),
        help("expected one of: auto, gnu, clang, msvc")
    )]
    UnknownToolchain(String),

    /// Auto-detection found no supported compiler.
    #[error("No C++ compiler found")]
    #[diagnostic(
        code(sob::no_toolchain),
        help("install g++, clang++ or MSVC, or pass --toolchain explicitly")
    )]
    NoToolchainFound,

    /// Target not found.
    #[error("Target not found: {0}")]
    #[diagnostic(code(sob::target_not_found))]
    TargetNotFound(String),
}

impl BuildError {
    pub(crate) fn invalid_declaration(target: &str, reason: impl Into<String>) -> Self {
        BuildError::InvalidDeclaration {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error was raised at declaration time, before any process ran.
    pub fn is_declaration_error(&self) -> bool {
        matches!(self, BuildError::InvalidDeclaration { .. })
    }
}

fn exit_suffix(status: &Option<i32>) -> String {
    match *status {
        Some(code) => format!(" (exit status {})", code),
        None => " (terminated by signal)".to_string(),
    }
}
