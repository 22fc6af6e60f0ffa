//! Build manifest types (sob.toml format).

use crate::resolver::BuildOptions;
use crate::session::BuildSession;
use crate::target::TargetDeclaration;
use crate::toolchain::{Toolchain, ToolchainChoice, ToolchainDescriptor, ToolchainKind};
use crate::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root build manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Project metadata.
    pub project: ProjectConfig,

    /// Output locations.
    #[serde(default)]
    pub build: BuildDirs,

    /// Toolchain selection and extra flags.
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Build targets.
    #[serde(rename = "target", default)]
    pub targets: Vec<TargetConfig>,
}

/// Project metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    pub name: String,

    /// Project version (optional).
    #[serde(default)]
    pub version: Option<String>,

    /// Project root directory (default: manifest directory).
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Where objects and artifacts go, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDirs {
    /// Object files (default: `build`).
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Final artifacts (default: the project root).
    #[serde(default)]
    pub artifact_dir: PathBuf,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

impl Default for BuildDirs {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            artifact_dir: PathBuf::new(),
        }
    }
}

/// Toolchain selection and per-family flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Which family to use (default: auto).
    #[serde(default)]
    pub kind: ToolchainChoice,

    #[serde(default)]
    pub gnu: FlagSet,

    #[serde(default)]
    pub clang: FlagSet,

    #[serde(default)]
    pub msvc: FlagSet,
}

/// Flags appended after a family's mandatory flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagSet {
    /// Compile commands only.
    #[serde(default)]
    pub compile_flags: Vec<String>,

    /// Link commands only.
    #[serde(default)]
    pub link_flags: Vec<String>,
}

/// Target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Artifact name.
    pub name: String,

    /// Source files, in link order.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl BuildManifest {
    /// Load a manifest from a TOML file. The project root defaults to the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| BuildError::ReadManifest {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::parse(&content)?;

        let dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        manifest.project.root = Some(match manifest.project.root.take() {
            Some(root) if root.is_absolute() => root,
            Some(root) => dir.join(root),
            None => dir,
        });
        Ok(manifest)
    }

    /// Parse a manifest from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Project root, as configured.
    pub fn root(&self) -> &Path {
        self.project.root.as_deref().unwrap_or(Path::new(""))
    }

    /// Find a target by name.
    pub fn find_target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Extra flags configured for a family.
    pub fn flags_for(&self, kind: ToolchainKind) -> &FlagSet {
        match kind {
            ToolchainKind::Gnu => &self.toolchain.gnu,
            ToolchainKind::Clang => &self.toolchain.clang,
            ToolchainKind::Msvc => &self.toolchain.msvc,
        }
    }

    /// Descriptor for `T` with this manifest's directories and flags.
    pub fn descriptor<T: Toolchain>(&self) -> ToolchainDescriptor<T> {
        let flags = self.flags_for(T::KIND);
        ToolchainDescriptor::new()
            .with_build_dir(self.build.build_dir.clone())
            .with_artifact_dir(self.build.artifact_dir.clone())
            .with_compile_flags(flags.compile_flags.iter().cloned())
            .with_link_flags(flags.link_flags.iter().cloned())
    }

    /// A session holding every target in the manifest.
    ///
    /// Invalid or duplicate declarations are recorded as rejected rather
    /// than failing the whole manifest.
    pub fn session<T: Toolchain>(&self, options: BuildOptions) -> BuildSession<T> {
        let mut session = BuildSession::new(self.descriptor::<T>())
            .with_project_root(self.root().to_path_buf())
            .with_options(options);

        for target in &self.targets {
            match TargetDeclaration::new(target.name.clone(), target.sources.iter().cloned()) {
                // Rejections are recorded by the session itself.
                Ok(declaration) => {
                    let _ = session.declare(declaration);
                }
                Err(err) => session.reject(target.name.clone(), err),
            }
        }
        session
    }
}

impl TargetConfig {
    /// Create a new target.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sources: Vec::new(),
        }
    }

    /// Add source files.
    pub fn with_sources(mut self, sources: &[&str]) -> Self {
        self.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }
}
