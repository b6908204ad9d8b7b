//! Integration tests for the command-line interface
//!
//! Drives the built binary through extract, status, write-back, search,
//! show and reset inside a temporary directory.

use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const EXPORT: &str = r#"Exportfile for AOT version 1.0 or later
Formatversion: 1

***Element: CLS

; Microsoft Dynamics AX Class: Greeter unloaded
; --------------------------------------------------------------------------------
  CLSVERSION 1

  CLASS #Greeter
    PROPERTIES
      Name                #Greeter
    ENDPROPERTIES

    METHODS
      Version: 3
      SOURCE #classDeclaration
        #class Greeter
        #{
        #}
      ENDSOURCE
      SOURCE #hello
        #void hello()
        #{
        #    info("Hello");
        #}
      ENDSOURCE
    ENDMETHODS
  ENDCLASS

***Element: JOB

; Microsoft Dynamics AX Job: greetJob unloaded
; --------------------------------------------------------------------------------
  JOBVERSION 1

  SOURCE #greetJob
    #static void greetJob(Args _args)
    #{
    #    new Greeter().hello();
    #}
  ENDSOURCE

***Element: END
"#;

/// Helper to create a directory holding an export pinned to a fixed time
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("export.xpo");
    fs::write(&input, EXPORT).unwrap();
    filetime::set_file_mtime(&input, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xpo-patcher"))
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn edit(dir: &Path, relative: &str, body: &str) {
    let path = dir.join(relative);
    fs::write(&path, body).unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_600, 0)).unwrap();
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["extract", "write-back", "status", "show", "search", "reset"] {
        assert!(text.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_extract_creates_tree_and_index() {
    let dir = setup_workspace();
    let output = run(dir.path(), &["extract", "export.xpo"]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("Summary:"));
    assert!(text.contains("2 parsed"));
    assert!(dir.path().join("parserXPO/Greeter/hello.xpp").is_file());
    assert!(dir.path().join("parserXPO/greetJob/greetJob.xpp").is_file());
    assert!(dir.path().join("xpo_index.json").is_file());

    let again = run(dir.path(), &["extract", "export.xpo"]);
    assert!(again.status.success());
    let text = stdout(&again);
    assert!(text.contains("0 parsed"));
    assert!(text.contains("2 skipped"));
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["extract", "absent.xpo"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.xpo"));
}

#[test]
fn test_write_back_without_edits() {
    let dir = setup_workspace();
    run(dir.path(), &["extract", "export.xpo"]);

    let output = run(dir.path(), &["write-back", "export.xpo"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No method files changed"));
    assert!(!dir.path().join("export_WR.xpo").exists());
}

#[test]
fn test_status_and_write_back() {
    let dir = setup_workspace();
    run(dir.path(), &["extract", "export.xpo"]);
    edit(
        dir.path(),
        "parserXPO/Greeter/hello.xpp",
        "void hello()\n{\n    info(\"Hello, world\");\n}",
    );

    let status = run(dir.path(), &["status", "export.xpo"]);
    assert!(status.status.success());
    let text = stdout(&status);
    assert!(text.contains("EDITED"));
    assert!(text.contains("Greeter.hello"));

    let dry = run(dir.path(), &["write-back", "export.xpo", "--dry-run", "--diff"]);
    assert!(dry.status.success());
    let text = stdout(&dry);
    assert!(text.contains("DRY RUN"));
    assert!(text.contains("+    #    info(\"Hello, world\");"));
    assert!(!dir.path().join("export_WR.xpo").exists());

    let output = run(dir.path(), &["write-back", "export.xpo"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Greeter.hello: Updated"));
    assert!(text.contains("1 updated"));

    let written = fs::read_to_string(dir.path().join("export_WR.xpo")).unwrap();
    assert!(written.contains("    #    info(\"Hello, world\");\n"));
    assert_eq!(fs::read_to_string(dir.path().join("export.xpo")).unwrap(), EXPORT);
}

#[test]
fn test_write_back_reports_missing_method() {
    let dir = setup_workspace();
    run(dir.path(), &["extract", "export.xpo"]);
    edit(dir.path(), "parserXPO/Greeter/goodbye.xpp", "void goodbye()\n{\n}");

    let output = run(dir.path(), &["write-back", "export.xpo"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[method not found] Greeter.goodbye"));
    assert!(stdout(&output).contains("not written"));
    assert!(!dir.path().join("export_WR.xpo").exists());
}

#[test]
fn test_search_and_show() {
    let dir = setup_workspace();
    run(dir.path(), &["extract", "export.xpo"]);

    let search = run(dir.path(), &["search", "greet"]);
    assert!(search.status.success());
    let text = stdout(&search);
    assert!(text.contains("Greeter"));
    assert!(text.contains("greetJob"));

    let show = run(dir.path(), &["show", "export.xpo", "Greeter", "--method", "hello"]);
    assert!(show.status.success());
    assert_eq!(stdout(&show), "void hello()\n{\n    info(\"Hello\");\n}\n");

    let outline = run(dir.path(), &["show", "export.xpo", "greetJob", "--kind", "JOB"]);
    assert!(outline.status.success());
    assert!(stdout(&outline).contains("greetJob (4 lines)"));
}

#[test]
fn test_config_file_is_honored() {
    let dir = setup_workspace();
    fs::write(
        dir.path().join("xpo-patcher.toml"),
        "[tree]\ndir = \"work\"\n\n[write]\noutput_suffix = \"_out\"\n",
    )
    .unwrap();

    let output = run(dir.path(), &["extract", "export.xpo", "--no-index"]);
    assert!(output.status.success());
    assert!(dir.path().join("work/Greeter/hello.xpp").is_file());
    assert!(!dir.path().join("xpo_index.json").exists());

    edit(dir.path(), "work/greetJob/greetJob.xpp", "static void greetJob(Args _args)\n{\n}");
    let output = run(dir.path(), &["write-back", "export.xpo"]);
    assert!(output.status.success());
    assert!(dir.path().join("export_out.xpo").is_file());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = setup_workspace();
    fs::write(
        dir.path().join("xpo-patcher.toml"),
        "[encoding]\nfallback = \"klingon\"\n",
    )
    .unwrap();

    let output = run(dir.path(), &["extract", "export.xpo"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown fallback encoding"));
}

#[test]
fn test_reset() {
    let dir = setup_workspace();
    run(dir.path(), &["extract", "export.xpo"]);
    assert!(dir.path().join("parserXPO/Greeter").is_dir());

    let output = run(dir.path(), &["reset", "--yes"]);
    assert!(output.status.success());
    assert!(dir.path().join("parserXPO").is_dir());
    assert!(!dir.path().join("parserXPO/Greeter").exists());
}
