//! Toolchain descriptors.
//!
//! Each supported compiler family is a zero-sized type implementing
//! [`Toolchain`]; its invocation conventions are associated constants.
//! A [`ToolchainDescriptor`] pairs one family with the per-session settings
//! (output directories and extra flags) and turns sources and objects into
//! command lines. Nothing here touches the filesystem or spawns processes.

use crate::target::{SourceNode, TargetDeclaration};
use crate::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Invocation conventions of one compiler family.
pub trait Toolchain {
    /// Runtime identity of this family.
    const KIND: ToolchainKind;
    /// Compiler (and linker driver) executable.
    const CXX: &'static str;
    /// Flag requesting compilation without linking.
    const COMPILE_ONLY: &'static str;
    /// Prefix glued to the object path in a compile command.
    const OBJ_PREFIX: &'static str;
    /// Extension of object files, without the dot.
    const OBJ_EXTENSION: &'static str;
    /// Prefix glued to the artifact path in a link command.
    const BIN_PREFIX: &'static str;
    /// Suffix appended to artifact names.
    const BIN_POSTFIX: &'static str;
    /// Flags every compile command carries.
    const CXXFLAGS: &'static [&'static str];
    /// Flags every link command carries.
    const LDFLAGS: &'static [&'static str];
}

/// GNU `g++`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gnu;

impl Toolchain for Gnu {
    const KIND: ToolchainKind = ToolchainKind::Gnu;
    const CXX: &'static str = "g++";
    const COMPILE_ONLY: &'static str = "-c";
    const OBJ_PREFIX: &'static str = "-o ";
    const OBJ_EXTENSION: &'static str = "o";
    const BIN_PREFIX: &'static str = "-o ";
    const BIN_POSTFIX: &'static str = "";
    const CXXFLAGS: &'static [&'static str] = &[];
    const LDFLAGS: &'static [&'static str] = &[];
}

/// LLVM `clang++`. Same driver conventions as GNU.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clang;

impl Toolchain for Clang {
    const KIND: ToolchainKind = ToolchainKind::Clang;
    const CXX: &'static str = "clang++";
    const COMPILE_ONLY: &'static str = "-c";
    const OBJ_PREFIX: &'static str = "-o ";
    const OBJ_EXTENSION: &'static str = "o";
    const BIN_PREFIX: &'static str = "-o ";
    const BIN_POSTFIX: &'static str = "";
    const CXXFLAGS: &'static [&'static str] = &[];
    const LDFLAGS: &'static [&'static str] = &[];
}

/// Microsoft `cl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Msvc;

impl Toolchain for Msvc {
    const KIND: ToolchainKind = ToolchainKind::Msvc;
    const CXX: &'static str = "cl";
    const COMPILE_ONLY: &'static str = "/c";
    const OBJ_PREFIX: &'static str = "/Fo:";
    const OBJ_EXTENSION: &'static str = "obj";
    const BIN_PREFIX: &'static str = "/Fe:";
    const BIN_POSTFIX: &'static str = ".exe";
    const CXXFLAGS: &'static [&'static str] = &["/std:c++17"];
    const LDFLAGS: &'static [&'static str] = &[];
}

/// Runtime identifier of a compiler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainKind {
    Gnu,
    Clang,
    Msvc,
}

impl ToolchainKind {
    /// Compiler executable of this family.
    pub fn executable(self) -> &'static str {
        match self {
            ToolchainKind::Gnu => Gnu::CXX,
            ToolchainKind::Clang => Clang::CXX,
            ToolchainKind::Msvc => Msvc::CXX,
        }
    }

    /// Pick the toolchain for this host.
    ///
    /// Windows hosts look for `cl` first. Everywhere the search continues
    /// with `g++`, then `clang++` on `PATH`.
    pub fn detect() -> Result<Self> {
        Self::detect_with(|executable| find_on_path(executable).is_some())
    }

    fn search_order() -> &'static [ToolchainKind] {
        if cfg!(windows) {
            &[ToolchainKind::Msvc, ToolchainKind::Gnu, ToolchainKind::Clang]
        } else {
            &[ToolchainKind::Gnu, ToolchainKind::Clang]
        }
    }

    fn detect_with(installed: impl Fn(&str) -> bool) -> Result<Self> {
        Self::search_order()
            .iter()
            .copied()
            .find(|kind| installed(kind.executable()))
            .ok_or(BuildError::NoToolchainFound)
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolchainKind::Gnu => "gnu",
            ToolchainKind::Clang => "clang",
            ToolchainKind::Msvc => "msvc",
        };
        f.write_str(name)
    }
}

impl FromStr for ToolchainKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gnu" | "gcc" | "g++" => Ok(ToolchainKind::Gnu),
            "clang" | "clang++" => Ok(ToolchainKind::Clang),
            "msvc" | "cl" => Ok(ToolchainKind::Msvc),
            _ => Err(BuildError::UnknownToolchain(s.to_string())),
        }
    }
}

/// Toolchain as written in a manifest or on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainChoice {
    /// Detect from the host.
    #[default]
    Auto,
    Gnu,
    Clang,
    Msvc,
}

impl ToolchainChoice {
    /// Resolve to a concrete family, detecting when `Auto`.
    pub fn resolve(self) -> Result<ToolchainKind> {
        match self {
            ToolchainChoice::Auto => ToolchainKind::detect(),
            ToolchainChoice::Gnu => Ok(ToolchainKind::Gnu),
            ToolchainChoice::Clang => Ok(ToolchainKind::Clang),
            ToolchainChoice::Msvc => Ok(ToolchainKind::Msvc),
        }
    }
}

impl FromStr for ToolchainChoice {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ToolchainChoice::Auto);
        }
        Ok(match s.parse::<ToolchainKind>()? {
            ToolchainKind::Gnu => ToolchainChoice::Gnu,
            ToolchainKind::Clang => ToolchainChoice::Clang,
            ToolchainKind::Msvc => ToolchainChoice::Msvc,
        })
    }
}

/// One compiler family plus the settings of the current build session.
///
/// Built once, then only read.
#[derive(Debug, Clone)]
pub struct ToolchainDescriptor<T: Toolchain> {
    build_dir: PathBuf,
    artifact_dir: PathBuf,
    compile_flags: Vec<String>,
    link_flags: Vec<String>,
    _toolchain: PhantomData<T>,
}

impl<T: Toolchain> Default for ToolchainDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Toolchain> ToolchainDescriptor<T> {
    /// Descriptor with the family's mandatory flags, objects under `build/`
    /// and artifacts in the project root.
    pub fn new() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            artifact_dir: PathBuf::new(),
            compile_flags: T::CXXFLAGS.iter().map(|s| s.to_string()).collect(),
            link_flags: T::LDFLAGS.iter().map(|s| s.to_string()).collect(),
            _toolchain: PhantomData,
        }
    }

    /// Set the build-output directory.
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    /// Set the directory final artifacts are written to.
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Append compile flags after the mandatory ones.
    pub fn with_compile_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compile_flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Append link flags after the mandatory ones.
    pub fn with_link_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.link_flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> ToolchainKind {
        T::KIND
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn compile_flags(&self) -> &[String] {
        &self.compile_flags
    }

    pub fn link_flags(&self) -> &[String] {
        &self.link_flags
    }

    /// Object path for a source, beneath the build-output directory.
    ///
    /// Root and prefix components are dropped and `..` becomes `__` so the
    /// object never escapes the build directory.
    pub fn object_path_for(&self, source: &SourceNode) -> PathBuf {
        let mut relative = PathBuf::new();
        for component in source.path().components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::ParentDir => relative.push("__"),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        self.build_dir
            .join(relative)
            .with_extension(T::OBJ_EXTENSION)
    }

    /// Object paths for every source of `target`, in declaration order.
    ///
    /// Fails with `InvalidDeclaration` when two sources map to the same
    /// object, e.g. `util.cpp` and `util.c`.
    pub fn object_paths(&self, target: &TargetDeclaration) -> Result<Vec<PathBuf>> {
        let mut objects: Vec<PathBuf> = Vec::with_capacity(target.sources().len());
        for source in target.sources() {
            let object = self.object_path_for(source);
            if let Some(index) = objects.iter().position(|o| *o == object) {
                let reason = format!(
                    "sources {} and {} both compile to {}",
                    target.sources()[index],
                    source,
                    object.display()
                );
                return Err(BuildError::invalid_declaration(target.name(), reason));
            }
            objects.push(object);
        }
        Ok(objects)
    }

    /// Final artifact path for a target name.
    pub fn artifact_path_for(&self, artifact_name: &str) -> PathBuf {
        self.artifact_dir
            .join(format!("{}{}", artifact_name, T::BIN_POSTFIX))
    }

    /// Compiler invocation producing the object for one source.
    pub fn compile_command(&self, source: &SourceNode) -> String {
        let object = self.object_path_for(source);
        let mut parts: Vec<String> = Vec::with_capacity(self.compile_flags.len() + 4);
        parts.push(T::CXX.to_string());
        parts.extend(self.compile_flags.iter().cloned());
        parts.push(T::COMPILE_ONLY.to_string());
        parts.push(quote(source.path()));
        parts.push(format!("{}{}", T::OBJ_PREFIX, quote(&object)));
        parts.join(" ")
    }

    /// Linker invocation combining `objects`, in order, into one artifact.
    pub fn link_command(&self, objects: &[PathBuf], artifact_name: &str) -> String {
        let artifact = self.artifact_path_for(artifact_name);
        let mut parts: Vec<String> = Vec::with_capacity(objects.len() + self.link_flags.len() + 2);
        parts.push(T::CXX.to_string());
        parts.extend(objects.iter().map(|obj| quote(obj)));
        parts.push(format!("{}{}", T::BIN_PREFIX, quote(&artifact)));
        parts.extend(self.link_flags.iter().cloned());
        parts.join(" ")
    }
}

/// Render a path as one word for the platform shell.
///
/// Plain paths pass through as is. Anything else is single-quoted for `sh`
/// (an embedded `'` becomes `'\''`) or double-quoted for `cmd`.
fn quote(path: &Path) -> String {
    let text = path.display().to_string();
    if !text.is_empty() && text.chars().all(is_plain) {
        return text;
    }
    if cfg!(windows) {
        format!("\"{}\"", text)
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '/' | '.' | '_' | '-' | '+' | ',' | ':' | '@' | '=')
        || (cfg!(windows) && c == '\\')
}

/// Drop `.` components so `app` and `./app` compare equal.
pub(crate) fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Look for an executable on `PATH`.
pub fn find_on_path(executable: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(executable);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let candidate = dir.join(format!("{}.exe", executable));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    })
}
