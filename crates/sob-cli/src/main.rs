use clap::{ArgAction, Args, Parser, Subcommand};
use miette::{miette, IntoDiagnostic, Result, WrapErr};
use sob_build::{
    BuildManifest, BuildOptions, BuildSession, Clang, CompileCommands, Gnu, Msvc, ShellRunner,
    Toolchain, ToolchainChoice, ToolchainKind,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sob")]
#[command(author, version, about = "A small build system for statically declared C++ targets")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and link targets
    Build {
        #[command(flatten)]
        project: ProjectArgs,

        /// Skip sources whose object file is newer than the source
        #[arg(long)]
        incremental: bool,

        /// Targets to build (default: all)
        targets: Vec<String>,
    },

    /// Print the commands a build would run, without running them
    Plan {
        #[command(flatten)]
        project: ProjectArgs,

        /// Targets to plan (default: all)
        targets: Vec<String>,
    },

    /// Write compile_commands.json
    Compdb {
        #[command(flatten)]
        project: ProjectArgs,

        /// Output file path (default: <project root>/compile_commands.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Path to the build manifest
    #[arg(short, long, default_value = "sob.toml")]
    manifest: PathBuf,

    /// Toolchain to use: auto, gnu, clang or msvc (overrides the manifest)
    #[arg(short, long)]
    toolchain: Option<ToolchainChoice>,
}

impl ProjectArgs {
    fn load(&self) -> Result<(BuildManifest, ToolchainKind)> {
        let mut manifest = BuildManifest::from_file(&self.manifest)?;

        let root = manifest.root();
        let root = if root.as_os_str().is_empty() {
            Path::new(".")
        } else {
            root
        };
        let root = std::fs::canonicalize(root)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to resolve project root {}", root.display()))?;
        manifest.project.root = Some(root);

        let choice = self.toolchain.unwrap_or(manifest.toolchain.kind);
        let kind = choice.resolve()?;
        tracing::info!(toolchain = %kind, project = %manifest.project.name, "configured");
        Ok((manifest, kind))
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            project,
            incremental,
            targets,
        } => {
            let (manifest, kind) = project.load()?;
            let options = BuildOptions {
                incremental,
                ..Default::default()
            };
            match kind {
                ToolchainKind::Gnu => cmd_build::<Gnu>(&manifest, options, &targets),
                ToolchainKind::Clang => cmd_build::<Clang>(&manifest, options, &targets),
                ToolchainKind::Msvc => cmd_build::<Msvc>(&manifest, options, &targets),
            }
        }

        Commands::Plan { project, targets } => {
            let (manifest, kind) = project.load()?;
            match kind {
                ToolchainKind::Gnu => cmd_plan::<Gnu>(&manifest, &targets),
                ToolchainKind::Clang => cmd_plan::<Clang>(&manifest, &targets),
                ToolchainKind::Msvc => cmd_plan::<Msvc>(&manifest, &targets),
            }
        }

        Commands::Compdb { project, output } => {
            let (manifest, kind) = project.load()?;
            let output =
                output.unwrap_or_else(|| manifest.root().join("compile_commands.json"));
            match kind {
                ToolchainKind::Gnu => cmd_compdb::<Gnu>(&manifest, &output),
                ToolchainKind::Clang => cmd_compdb::<Clang>(&manifest, &output),
                ToolchainKind::Msvc => cmd_compdb::<Msvc>(&manifest, &output),
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("SOB_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn session<T: Toolchain>(
    manifest: &BuildManifest,
    options: BuildOptions,
    targets: &[String],
) -> Result<BuildSession<T>> {
    let mut session = manifest.session::<T>(options);
    session.select(targets)?;
    Ok(session)
}

fn cmd_build<T: Toolchain>(
    manifest: &BuildManifest,
    options: BuildOptions,
    targets: &[String],
) -> Result<()> {
    let session = session::<T>(manifest, options, targets)?;
    let mut runner = ShellRunner::new().working_dir(manifest.root());

    let report = session.run(&mut runner);
    let summary = report.to_string();

    let mut failed = false;
    for outcome in report.into_outcomes() {
        match outcome.result {
            Ok(built) => println!("{}: OK -> {}", outcome.name, built.artifact.display()),
            Err(err) => {
                failed = true;
                eprintln!("{}: {}", outcome.name, outcome.state);
                eprintln!("{:?}", miette::Report::new(err));
            }
        }
    }

    if failed {
        return Err(miette!("{}", summary));
    }
    println!("{}", summary);
    Ok(())
}

fn cmd_plan<T: Toolchain>(manifest: &BuildManifest, targets: &[String]) -> Result<()> {
    let session = session::<T>(manifest, BuildOptions::default(), targets)?;

    for (name, error) in session.rejected() {
        eprintln!("# {} (rejected: {})", name, error);
    }
    for (name, commands) in session.plan()? {
        println!("# {}", name);
        for command in commands {
            println!("{}", command);
        }
    }
    Ok(())
}

fn cmd_compdb<T: Toolchain>(manifest: &BuildManifest, output: &Path) -> Result<()> {
    let session = session::<T>(manifest, BuildOptions::default(), &[])?;
    let commands = CompileCommands::from_session(&session);
    commands.write_to(output)?;
    println!(
        "Wrote {} entries to {}",
        commands.commands().len(),
        output.display()
    );
    Ok(())
}
