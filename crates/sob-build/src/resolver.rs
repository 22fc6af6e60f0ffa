//! Build graph resolution: compile every source of a target, then link.

use crate::runner::CommandRunner;
use crate::target::{SourceNode, TargetDeclaration};
use crate::toolchain::{Toolchain, ToolchainDescriptor};
use crate::{BuildError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

/// Where a target's build stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Rejected before building (see `InvalidDeclaration`).
    Declaration,
    /// Creating output directories.
    Prepare,
    /// Compiling the source at this index.
    Compile(usize),
    Link,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Declaration => f.write_str("declaration"),
            Phase::Prepare => f.write_str("prepare"),
            Phase::Compile(i) => write!(f, "compile #{}", i + 1),
            Phase::Link => f.write_str("link"),
        }
    }
}

/// Progress of one target.
///
/// `Pending -> Compiling(0..n) -> Linking -> Succeeded | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Pending,
    Compiling(usize),
    Linking,
    Succeeded,
    Failed(Phase),
}

impl TargetState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TargetState::Succeeded | TargetState::Failed(_))
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Pending => f.write_str("pending"),
            TargetState::Compiling(i) => write!(f, "compiling #{}", i + 1),
            TargetState::Linking => f.write_str("linking"),
            TargetState::Succeeded => f.write_str("succeeded"),
            TargetState::Failed(phase) => write!(f, "failed during {}", phase),
        }
    }
}

/// Knobs for a resolver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Skip sources whose object is not older than the source.
    pub incremental: bool,
    /// Issue commands without touching the filesystem.
    pub dry_run: bool,
}

/// A successfully built target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTarget {
    pub artifact: PathBuf,
    /// Objects in source declaration order.
    pub objects: Vec<PathBuf>,
    /// Sources actually compiled (fewer than `objects` on incremental runs).
    pub compiled: usize,
}

/// Builds targets with one toolchain.
pub struct Resolver<'d, T: Toolchain> {
    descriptor: &'d ToolchainDescriptor<T>,
    project_root: PathBuf,
    options: BuildOptions,
}

impl<'d, T: Toolchain> Resolver<'d, T> {
    pub fn new(descriptor: &'d ToolchainDescriptor<T>) -> Self {
        Self {
            descriptor,
            project_root: PathBuf::new(),
            options: BuildOptions::default(),
        }
    }

    /// Directory that relative source and output paths are resolved from.
    ///
    /// Commands themselves use the relative paths; the runner is expected
    /// to run them from this same directory.
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn descriptor(&self) -> &ToolchainDescriptor<T> {
        self.descriptor
    }

    /// Build one target.
    pub fn build<R>(&self, target: &TargetDeclaration, runner: &mut R) -> Result<BuiltTarget>
    where
        R: CommandRunner + ?Sized,
    {
        let mut state = TargetState::Pending;
        self.build_tracked(target, runner, &mut state)
    }

    /// Build one target, leaving its final state in `state`.
    pub fn build_tracked<R>(
        &self,
        target: &TargetDeclaration,
        runner: &mut R,
        state: &mut TargetState,
    ) -> Result<BuiltTarget>
    where
        R: CommandRunner + ?Sized,
    {
        let span = info_span!("target", name = %target.name(), toolchain = %T::KIND);
        let _enter = span.enter();

        let result = self.run_phases(target, runner, state);
        *state = match (&result, *state) {
            (Ok(_), _) => TargetState::Succeeded,
            (Err(_), TargetState::Compiling(i)) => TargetState::Failed(Phase::Compile(i)),
            (Err(_), TargetState::Linking) => TargetState::Failed(Phase::Link),
            (Err(err), TargetState::Pending) if err.is_declaration_error() => {
                TargetState::Failed(Phase::Declaration)
            }
            (Err(_), _) => TargetState::Failed(Phase::Prepare),
        };

        match &result {
            Ok(built) => info!(artifact = %built.artifact.display(), "target built"),
            Err(err) => warn!(state = %state, "{}", err),
        }
        result
    }

    fn run_phases<R>(
        &self,
        target: &TargetDeclaration,
        runner: &mut R,
        state: &mut TargetState,
    ) -> Result<BuiltTarget>
    where
        R: CommandRunner + ?Sized,
    {
        let planned = self.descriptor.object_paths(target)?;

        if !self.options.dry_run {
            self.ensure_dir(self.descriptor.build_dir())?;
            self.ensure_dir(self.descriptor.artifact_dir())?;
        }

        let mut objects = Vec::with_capacity(target.sources().len());
        let mut compiled = 0;

        for (index, (source, object)) in target.sources().iter().zip(planned).enumerate() {
            *state = TargetState::Compiling(index);

            if self.is_up_to_date(source, &object) {
                debug!(source = %source, "object is up to date");
                objects.push(object);
                continue;
            }

            if !self.options.dry_run {
                if let Some(parent) = object.parent() {
                    self.ensure_dir(parent)?;
                }
            }

            let command = self.descriptor.compile_command(source);
            info!(source = %source, "compiling");
            debug!(command = %command);

            let output = runner.run(&command)?;
            if !output.success() {
                return Err(BuildError::CompileFailure {
                    source_path: source.path().to_path_buf(),
                    status: output.status,
                    diagnostics: output.diagnostics(),
                });
            }
            if let Some(text) = output.diagnostics() {
                debug!(source = %source, "{}", text);
            }

            objects.push(object);
            compiled += 1;
        }

        *state = TargetState::Linking;
        let command = self.descriptor.link_command(&objects, target.name());
        info!(objects = objects.len(), "linking");
        debug!(command = %command);

        let output = runner.run(&command)?;
        if !output.success() {
            return Err(BuildError::LinkFailure {
                target: target.name().to_string(),
                status: output.status,
                diagnostics: output.diagnostics(),
            });
        }

        Ok(BuiltTarget {
            artifact: self.descriptor.artifact_path_for(target.name()),
            objects,
            compiled,
        })
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if dir.as_os_str().is_empty() {
            return Ok(());
        }
        let path = self.project_root.join(dir);
        std::fs::create_dir_all(&path).map_err(|source| BuildError::CreateDir { path, source })
    }

    fn is_up_to_date(&self, source: &SourceNode, object: &Path) -> bool {
        if !self.options.incremental || self.options.dry_run {
            return false;
        }
        let modified = |path: &Path| {
            std::fs::metadata(self.project_root.join(path))
                .and_then(|meta| meta.modified())
                .ok()
        };
        match (modified(source.path()), modified(object)) {
            (Some(source_time), Some(object_time)) => object_time >= source_time,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use crate::toolchain::{Gnu, Msvc};
    use tempfile::TempDir;

    fn app() -> TargetDeclaration {
        TargetDeclaration::new("app", ["a.cpp", "b.cpp"]).unwrap()
    }

    #[test]
    fn test_compiles_then_links_in_order() {
        let gnu = ToolchainDescriptor::<Gnu>::new();
        let resolver = Resolver::new(&gnu).options(BuildOptions {
            dry_run: true,
            ..Default::default()
        });
        let mut runner = RecordingRunner::new();

        let built = resolver.build(&app(), &mut runner).unwrap();

        assert_eq!(
            runner.commands(),
            &[
                "g++ -c a.cpp -o build/a.o",
                "g++ -c b.cpp -o build/b.o",
                "g++ build/a.o build/b.o -o app",
            ]
        );
        assert_eq!(built.artifact, PathBuf::from("app"));
        assert_eq!(built.compiled, 2);
    }

    #[test]
    fn test_msvc_keeps_source_order() {
        let cl = ToolchainDescriptor::<Msvc>::new();
        let resolver = Resolver::new(&cl).options(BuildOptions {
            dry_run: true,
            ..Default::default()
        });
        let mut runner = RecordingRunner::new();

        resolver.build(&app(), &mut runner).unwrap();

        assert_eq!(
            runner.commands(),
            &[
                "cl /std:c++17 /c a.cpp /Fo:build/a.obj",
                "cl /std:c++17 /c b.cpp /Fo:build/b.obj",
                "cl build/a.obj build/b.obj /Fe:app.exe",
            ]
        );
    }

    #[test]
    fn test_compile_failure_stops_target() {
        let gnu = ToolchainDescriptor::<Gnu>::new();
        let resolver = Resolver::new(&gnu).options(BuildOptions {
            dry_run: true,
            ..Default::default()
        });
        let target = TargetDeclaration::new("app", ["a.cpp", "b.cpp", "c.cpp"]).unwrap();
        let mut runner = RecordingRunner::new().fail_on("b.cpp");
        let mut state = TargetState::Pending;

        let err = resolver
            .build_tracked(&target, &mut runner, &mut state)
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::CompileFailure { ref source_path, status: Some(1), .. }
                if source_path == Path::new("b.cpp")
        ));
        assert_eq!(state, TargetState::Failed(Phase::Compile(1)));
        assert_eq!(runner.commands().len(), 2);
        assert!(runner.commands().iter().all(|c| c.contains(" -c ")));
    }

    #[test]
    fn test_link_failure() {
        let gnu = ToolchainDescriptor::<Gnu>::new();
        let resolver = Resolver::new(&gnu).options(BuildOptions {
            dry_run: true,
            ..Default::default()
        });
        let mut runner = RecordingRunner::new().fail_on("-o app");
        let mut state = TargetState::Pending;

        let err = resolver
            .build_tracked(&app(), &mut runner, &mut state)
            .unwrap_err();

        assert!(matches!(err, BuildError::LinkFailure { ref target, .. } if target == "app"));
        assert_eq!(state, TargetState::Failed(Phase::Link));
        assert_eq!(runner.commands().len(), 3);
    }

    #[test]
    fn test_spawn_failure_is_distinct() {
        let gnu = ToolchainDescriptor::<Gnu>::new();
        let resolver = Resolver::new(&gnu).options(BuildOptions {
            dry_run: true,
            ..Default::default()
        });
        let mut runner = RecordingRunner::new().fail_to_spawn("g++");
        let mut state = TargetState::Pending;

        let err = resolver
            .build_tracked(&app(), &mut runner, &mut state)
            .unwrap_err();

        assert!(matches!(err, BuildError::ProcessSpawnFailure { .. }));
        assert_eq!(state, TargetState::Failed(Phase::Compile(0)));
    }

    #[test]
    fn test_shared_object_path_fails_before_compiling() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let gnu = ToolchainDescriptor::<Gnu>::new();
        let resolver = Resolver::new(&gnu).project_root(dir.path());
        let target = TargetDeclaration::new("app", ["util.cpp", "util.c"]).unwrap();
        let mut runner = RecordingRunner::new();
        let mut state = TargetState::Pending;

        let err = resolver
            .build_tracked(&target, &mut runner, &mut state)
            .unwrap_err();

        assert!(err.is_declaration_error());
        assert_eq!(state, TargetState::Failed(Phase::Declaration));
        assert!(runner.commands().is_empty());
        assert!(!dir.path().join("build").exists());
    }

    #[test]
    fn test_creates_nested_object_dirs() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let gnu = ToolchainDescriptor::<Gnu>::new().with_artifact_dir("bin");
        let resolver = Resolver::new(&gnu).project_root(dir.path());
        let target = TargetDeclaration::new("tool", ["src/net/socket.cpp"]).unwrap();
        let mut runner = RecordingRunner::new();

        resolver.build(&target, &mut runner).unwrap();
        // Idempotent.
        resolver.build(&target, &mut runner).unwrap();

        assert!(dir.path().join("build/src/net").is_dir());
        assert!(dir.path().join("bin").is_dir());
    }

    #[test]
    fn test_incremental_skips_fresh_objects() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("a.cpp"), "int a() { return 1; }").unwrap();
        std::fs::write(dir.path().join("b.cpp"), "int b() { return 2; }").unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        // Written after the sources, so it is at least as new.
        std::fs::write(dir.path().join("build/a.o"), "").unwrap();

        let gnu = ToolchainDescriptor::<Gnu>::new();
        let resolver = Resolver::new(&gnu)
            .project_root(dir.path())
            .options(BuildOptions {
                incremental: true,
                ..Default::default()
            });
        let mut runner = RecordingRunner::new();

        let built = resolver.build(&app(), &mut runner).unwrap();

        assert_eq!(built.compiled, 1);
        assert_eq!(built.objects.len(), 2);
        assert_eq!(
            runner.commands(),
            &["g++ -c b.cpp -o build/b.o", "g++ build/a.o build/b.o -o app"]
        );
    }

    #[test]
    fn test_full_rebuild_by_default() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("a.cpp"), "").unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        std::fs::write(dir.path().join("build/a.o"), "").unwrap();

        let gnu = ToolchainDescriptor::<Gnu>::new();
        let resolver = Resolver::new(&gnu).project_root(dir.path());
        let target = TargetDeclaration::new("a", ["a.cpp"]).unwrap();
        let mut runner = RecordingRunner::new();

        let built = resolver.build(&target, &mut runner).unwrap();
        assert_eq!(built.compiled, 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TargetState::Compiling(0).to_string(), "compiling #1");
        assert_eq!(
            TargetState::Failed(Phase::Link).to_string(),
            "failed during link"
        );
        assert!(TargetState::Succeeded.is_terminal());
        assert!(!TargetState::Linking.is_terminal());
    }
}
