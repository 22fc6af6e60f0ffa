//! End-to-end scenarios for sessions and toolchains.

use sob_build::{
    find_on_path, BuildError, BuildManifest, BuildOptions, BuildSession, Clang, Gnu, Msvc, Phase,
    RecordingRunner, ShellRunner, TargetDeclaration, TargetState, Toolchain, ToolchainDescriptor,
};
use tempfile::TempDir;

fn dry_run() -> BuildOptions {
    BuildOptions {
        dry_run: true,
        ..Default::default()
    }
}

fn app_session<T: Toolchain>() -> BuildSession<T> {
    let mut session = BuildSession::new(ToolchainDescriptor::<T>::new()).with_options(dry_run());
    session
        .declare(TargetDeclaration::new("app", ["a.cpp", "b.cpp"]).unwrap())
        .unwrap();
    session
}

fn issued<T: Toolchain>(session: &BuildSession<T>) -> String {
    let mut runner = RecordingRunner::new();
    let report = session.run(&mut runner);
    assert!(report.is_success());
    runner.commands().join("\n")
}

#[test]
fn test_gnu_app_scenario() {
    insta::assert_snapshot!(issued(&app_session::<Gnu>()), @r"
    g++ -c a.cpp -o build/a.o
    g++ -c b.cpp -o build/b.o
    g++ build/a.o build/b.o -o app
    ");
}

#[test]
fn test_msvc_app_scenario() {
    insta::assert_snapshot!(issued(&app_session::<Msvc>()), @r"
    cl /std:c++17 /c a.cpp /Fo:build/a.obj
    cl /std:c++17 /c b.cpp /Fo:build/b.obj
    cl build/a.obj build/b.obj /Fe:app.exe
    ");
}

/// Same sequence shape whichever toolchain is active.
#[test]
fn test_control_flow_is_toolchain_independent() {
    fn shape<T: Toolchain>() -> Vec<(bool, usize)> {
        let mut session =
            BuildSession::new(ToolchainDescriptor::<T>::new()).with_options(dry_run());
        session
            .declare(TargetDeclaration::new("lib", ["x.cpp", "y.cpp", "z.cpp"]).unwrap())
            .unwrap();
        let mut runner = RecordingRunner::new();
        session.run(&mut runner);
        runner
            .commands()
            .iter()
            .map(|c| {
                let is_link = !c.contains(" -c ") && !c.contains(" /c ");
                let position = ["x.", "y.", "z."]
                    .iter()
                    .position(|s| c.contains(s))
                    .unwrap_or(usize::MAX);
                (is_link, position)
            })
            .collect()
    }

    let gnu = shape::<Gnu>();
    assert_eq!(gnu, vec![(false, 0), (false, 1), (false, 2), (true, 0)]);
    assert_eq!(gnu, shape::<Clang>());
    assert_eq!(gnu, shape::<Msvc>());
}

#[test]
fn test_n_compiles_then_one_link() {
    for n in 1..=5 {
        let sources: Vec<String> = (0..n).map(|i| format!("src/s{}.cpp", i)).collect();
        let mut session =
            BuildSession::new(ToolchainDescriptor::<Gnu>::new()).with_options(dry_run());
        session
            .declare(TargetDeclaration::new("t", sources).unwrap())
            .unwrap();
        let mut runner = RecordingRunner::new();

        session.run(&mut runner);

        let commands = runner.commands();
        assert_eq!(commands.len(), n + 1);
        assert!(commands[..n].iter().all(|c| c.starts_with("g++ -c ")));
        assert!(commands[n].ends_with("-o t"));
    }
}

#[test]
fn test_zero_sources_never_reaches_runner() {
    let manifest = BuildManifest::parse(
        r#"
[project]
name = "p"

[[target]]
name = "nothing"
        "#,
    )
    .unwrap();
    let session = manifest.session::<Gnu>(dry_run());
    let mut runner = RecordingRunner::new();

    let report = session.run(&mut runner);

    assert!(runner.commands().is_empty());
    let outcome = report.outcome("nothing").unwrap();
    assert_eq!(outcome.state, TargetState::Failed(Phase::Declaration));
    assert!(matches!(
        outcome.result,
        Err(BuildError::InvalidDeclaration { ref reason, .. }) if reason == "no sources declared"
    ));
}

#[test]
fn test_first_target_fails_second_succeeds() {
    let mut session = BuildSession::new(ToolchainDescriptor::<Gnu>::new()).with_options(dry_run());
    session
        .declare(TargetDeclaration::new("first", ["broken.cpp", "never.cpp"]).unwrap())
        .unwrap();
    session
        .declare(TargetDeclaration::new("second", ["ok.cpp"]).unwrap())
        .unwrap();
    let mut runner = RecordingRunner::new().fail_on("broken.cpp");

    let report = session.run(&mut runner);

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    let failures: Vec<_> = report.failures().map(|(name, _)| name).collect();
    assert_eq!(failures, vec!["first"]);
    assert!(runner.commands().iter().all(|c| !c.contains("never.cpp")));
    assert!(runner.commands().iter().all(|c| !c.contains("-o first")));
}

/// Builds with the real `g++` when it is installed.
#[test]
fn test_real_gnu_build() {
    if find_on_path("g++").is_none() {
        eprintln!("Skipping test (no g++ on PATH)");
        return;
    }

    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("add.cpp"),
        "int add(int a, int b) { return a + b; }\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("main.cpp"),
        "int add(int, int);\nint main() { return add(2, -2); }\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("bad.cpp"), "int main( {\n").unwrap();

    let mut session = BuildSession::new(ToolchainDescriptor::<Gnu>::new())
        .with_project_root(dir.path());
    session
        .declare(TargetDeclaration::new("calc", ["add.cpp", "main.cpp"]).unwrap())
        .unwrap();
    session
        .declare(TargetDeclaration::new("bad", ["bad.cpp"]).unwrap())
        .unwrap();
    session
        .declare(TargetDeclaration::new("ghost", ["missing.cpp"]).unwrap())
        .unwrap();
    let mut runner = ShellRunner::new().working_dir(dir.path());

    let report = session.run(&mut runner);

    assert!(report.outcome("calc").unwrap().succeeded());
    assert!(dir.path().join("build/add.o").is_file());
    assert!(dir.path().join("calc").is_file());

    let bad = report.outcome("bad").unwrap();
    assert!(matches!(
        bad.result,
        Err(BuildError::CompileFailure { diagnostics: Some(_), .. })
    ));

    // Missing sources are reported by the compiler, not pre-checked.
    let ghost = report.outcome("ghost").unwrap();
    assert!(matches!(ghost.result, Err(BuildError::CompileFailure { .. })));
    assert_eq!(report.failed(), 2);
}
