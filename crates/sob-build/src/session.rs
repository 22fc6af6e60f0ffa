//! Build sessions: every target declared for one run with one toolchain.

use crate::resolver::{BuildOptions, BuiltTarget, Phase, Resolver, TargetState};
use crate::runner::{CommandRunner, RecordingRunner};
use crate::target::TargetDeclaration;
use crate::toolchain::{normalized, Toolchain, ToolchainDescriptor};
use crate::{BuildError, Result};
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Declared targets plus the active toolchain.
///
/// Targets are isolated: building them is sequential, and one failing
/// never stops the next.
pub struct BuildSession<T: Toolchain> {
    descriptor: ToolchainDescriptor<T>,
    project_root: PathBuf,
    options: BuildOptions,
    declarations: Vec<Declared>,
    claims: Claims,
}

enum Declared {
    Accepted(TargetDeclaration),
    Rejected { name: String, error: BuildError },
}

impl Declared {
    fn name(&self) -> &str {
        match self {
            Declared::Accepted(target) => target.name(),
            Declared::Rejected { name, .. } => name,
        }
    }
}

/// Output paths owned by accepted targets.
#[derive(Default)]
struct Claims {
    /// Artifact path (without `.` components) to target name.
    artifacts: IndexMap<PathBuf, String>,
    /// Object path to the source compiled into it and its target.
    objects: IndexMap<PathBuf, (PathBuf, String)>,
}

impl Claims {
    /// Fails when `target` would write an artifact or object another
    /// target already writes. Two targets sharing a source share its object.
    fn check<T: Toolchain>(
        &self,
        descriptor: &ToolchainDescriptor<T>,
        target: &TargetDeclaration,
    ) -> Result<()> {
        let artifact = normalized(&descriptor.artifact_path_for(target.name()));
        if let Some(owner) = self.artifacts.get(&artifact) {
            let reason = if owner == target.name() {
                "artifact name already declared in this session".to_string()
            } else {
                format!(
                    "artifact {} is already produced by target {}",
                    artifact.display(),
                    owner
                )
            };
            return Err(BuildError::invalid_declaration(target.name(), reason));
        }

        let objects = descriptor.object_paths(target)?;
        for (source, object) in target.sources().iter().zip(&objects) {
            if let Some((other, owner)) = self.objects.get(object) {
                if *other != normalized(source.path()) {
                    let reason = format!(
                        "{} compiles to {}, which target {} builds from {}",
                        source,
                        object.display(),
                        owner,
                        other.display()
                    );
                    return Err(BuildError::invalid_declaration(target.name(), reason));
                }
            }
        }
        Ok(())
    }

    fn claim<T: Toolchain>(
        &mut self,
        descriptor: &ToolchainDescriptor<T>,
        target: &TargetDeclaration,
    ) {
        let name = target.name().to_string();
        self.artifacts
            .insert(normalized(&descriptor.artifact_path_for(&name)), name.clone());
        for source in target.sources() {
            self.objects
                .entry(descriptor.object_path_for(source))
                .or_insert_with(|| (normalized(source.path()), name.clone()));
        }
    }
}

impl<T: Toolchain> BuildSession<T> {
    pub fn new(descriptor: ToolchainDescriptor<T>) -> Self {
        Self {
            descriptor,
            project_root: PathBuf::new(),
            options: BuildOptions::default(),
            declarations: Vec::new(),
            claims: Claims::default(),
        }
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn descriptor(&self) -> &ToolchainDescriptor<T> {
        &self.descriptor
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Accepted targets in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = &TargetDeclaration> {
        self.declarations.iter().filter_map(|d| match d {
            Declared::Accepted(target) => Some(target),
            Declared::Rejected { .. } => None,
        })
    }

    /// Declarations that were rejected, with the reason.
    pub fn rejected(&self) -> impl Iterator<Item = (&str, &BuildError)> {
        self.declarations.iter().filter_map(|d| match d {
            Declared::Rejected { name, error } => Some((name.as_str(), error)),
            Declared::Accepted(_) => None,
        })
    }

    /// Add a target.
    ///
    /// Rejected when its artifact path is already taken (`app` and `./app`
    /// collide), or when one of its objects would overwrite an object built
    /// from a different source. The earlier declaration stays.
    pub fn declare(&mut self, target: TargetDeclaration) -> Result<()> {
        if let Err(error) = self.claims.check(&self.descriptor, &target) {
            let name = target.name().to_string();
            let reason = declaration_reason(&error);
            self.declarations.push(Declared::Rejected {
                name: name.clone(),
                error,
            });
            return Err(BuildError::invalid_declaration(&name, reason));
        }
        self.claims.claim(&self.descriptor, &target);
        self.declarations.push(Declared::Accepted(target));
        Ok(())
    }

    /// Record a declaration that failed before reaching the session, so it
    /// shows up as a failed target in the report.
    pub fn reject(&mut self, name: impl Into<String>, error: BuildError) {
        self.declarations.push(Declared::Rejected {
            name: name.into(),
            error,
        });
    }

    /// Keep only the named targets. Unknown names are an error and leave
    /// the session untouched.
    pub fn select<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = names.iter().map(|n| AsRef::<str>::as_ref(n)).collect();
        if let Some(missing) = names
            .iter()
            .find(|n| !self.declarations.iter().any(|d| d.name() == **n))
        {
            return Err(BuildError::TargetNotFound(missing.to_string()));
        }

        self.declarations.retain(|d| names.contains(&d.name()));

        let mut claims = Claims::default();
        for target in self.targets() {
            claims.claim(&self.descriptor, target);
        }
        self.claims = claims;
        Ok(())
    }

    /// Build every declaration in order. Rejected ones are reported as
    /// failed without spawning anything.
    pub fn run<R>(&self, runner: &mut R) -> SessionReport
    where
        R: CommandRunner + ?Sized,
    {
        let resolver = self.resolver(self.options);
        let mut outcomes = Vec::with_capacity(self.declarations.len());

        for declared in &self.declarations {
            let outcome = match declared {
                Declared::Rejected { name, error } => {
                    warn!(target_name = %name, "{}", error);
                    TargetOutcome {
                        name: name.clone(),
                        state: TargetState::Failed(Phase::Declaration),
                        result: Err(BuildError::invalid_declaration(
                            name,
                            declaration_reason(error),
                        )),
                    }
                }
                Declared::Accepted(target) => {
                    let mut state = TargetState::Pending;
                    let result = resolver.build_tracked(target, runner, &mut state);
                    TargetOutcome {
                        name: target.name().to_string(),
                        state,
                        result,
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = SessionReport { outcomes };
        info!("{}", report);
        report
    }

    /// The command lines a build would issue, per accepted target, without
    /// running anything or touching the filesystem.
    pub fn plan(&self) -> Result<Vec<(String, Vec<String>)>> {
        let options = BuildOptions {
            dry_run: true,
            incremental: false,
        };
        let resolver = self.resolver(options);

        self.targets()
            .map(|target| {
                let mut runner = RecordingRunner::new();
                resolver.build(target, &mut runner)?;
                Ok((target.name().to_string(), runner.take_commands()))
            })
            .collect()
    }

    fn resolver(&self, options: BuildOptions) -> Resolver<'_, T> {
        Resolver::new(&self.descriptor)
            .project_root(self.project_root.clone())
            .options(options)
    }
}

fn declaration_reason(error: &BuildError) -> String {
    match error {
        BuildError::InvalidDeclaration { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// Result of building one target.
#[derive(Debug)]
pub struct TargetOutcome {
    pub name: String,
    /// Always terminal.
    pub state: TargetState,
    pub result: Result<BuiltTarget>,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-target outcomes of a session.
#[derive(Debug)]
pub struct SessionReport {
    outcomes: Vec<TargetOutcome>,
}

impl SessionReport {
    pub fn outcomes(&self) -> &[TargetOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, name: &str) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True when every target built.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &BuildError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }

    pub fn into_outcomes(self) -> Vec<TargetOutcome> {
        self.outcomes
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.outcomes.len();
        write!(
            f,
            "{} target{}: {} succeeded, {} failed",
            total,
            if total == 1 { "" } else { "s" },
            self.succeeded(),
            self.failed()
        )
    }
}
