//! Integration tests for the cardbox CLI
//!
//! These exercise the binary end-to-end in temporary directories.

use std::process::Command;
use tempfile::TempDir;

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_cardbox"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("cardbox"));
    assert!(out.contains("flashcards"));
    assert!(out.contains("serve"));
    assert!(out.contains("init"));
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_cardbox"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("cardbox"));
}

#[test]
fn test_no_subcommand_is_an_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_cardbox"))
        .output()
        .expect("Failed to execute");

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Usage"));
}

// =============================================================================
// Shell Completion Tests
// =============================================================================

#[test]
fn test_completion_zsh() {
    let output = Command::new(env!("CARGO_BIN_EXE_cardbox"))
        .args(["completion", "zsh"])
        .output()
        .expect("Failed to execute");

    assert!(
        output.status.success(),
        "completion zsh failed: {}",
        stderr(&output)
    );
    assert!(
        stdout(&output).contains("#compdef cardbox"),
        "zsh completion should contain #compdef"
    );
}

#[test]
fn test_completion_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_cardbox"))
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("cardbox"));
}

#[test]
fn test_completion_invalid_shell() {
    let output = Command::new(env!("CARGO_BIN_EXE_cardbox"))
        .args(["completion", "powershell9000"])
        .output()
        .expect("Failed to execute");

    assert!(!output.status.success());
}

// =============================================================================
// Init Tests
// =============================================================================

#[test]
fn test_init_creates_project_files() {
    let temp = TempDir::new().expect("create temp dir");

    let output = Command::new(env!("CARGO_BIN_EXE_cardbox"))
        .arg("init")
        .current_dir(temp.path())
        .output()
        .expect("Failed to execute");

    assert!(output.status.success(), "init failed: {}", stderr(&output));

    assert!(temp.path().join(".cardbox").is_dir());
    assert!(temp.path().join(".cardbox/cardbox.db").is_file());
    assert!(temp.path().join(".cardbox/config.toml").is_file());

    let config = std::fs::read_to_string(temp.path().join(".cardbox/config.toml")).unwrap();
    assert!(config.contains("[llm]"));
    assert!(config.contains("openrouter"));

    let gitignore = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l.trim() == ".cardbox/"));
}

#[test]
fn test_init_twice_keeps_existing_config() {
    let temp = TempDir::new().expect("create temp dir");

    let run = || {
        Command::new(env!("CARGO_BIN_EXE_cardbox"))
            .arg("init")
            .current_dir(temp.path())
            .output()
            .expect("Failed to execute")
    };

    assert!(run().status.success());

    // Scribble on the config, then re-init; the file must survive
    let config_path = temp.path().join(".cardbox/config.toml");
    std::fs::write(&config_path, "# customized\n").unwrap();

    let output = run();
    assert!(output.status.success());
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "# customized\n");

    // .gitignore is not duplicated
    let gitignore = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches(".cardbox/").count(), 1);
}
