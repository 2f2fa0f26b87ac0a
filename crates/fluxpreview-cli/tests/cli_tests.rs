//! Integration tests for CLI commands
//!
//! Every case here fails before a cluster connection is attempted, so no
//! kubeconfig is needed.

use std::path::Path;
use std::process::{Command, Output};

/// Helper to run fluxpreview in an empty working directory
fn fluxpreview(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fluxpreview"))
        .args(args)
        .current_dir(dir)
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("FLUXPREVIEW_NAMESPACE")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute fluxpreview")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = fluxpreview(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["apply", "wait", "teardown", "cleanup", "status", "check"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

mod wait_command {
    use super::*;

    #[test]
    fn test_unsupported_type() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["wait", "pods/x"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("pods"));
    }

    #[test]
    fn test_malformed_reference() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["wait", "bad-format"]);

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_nothing_to_wait_for() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["wait"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("nothing to wait for"));
    }

    #[test]
    fn test_reference_conflicts_with_all() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["wait", "ks/pr-1", "--all"]);

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_bad_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["wait", "ks/pr-1", "--timeout", "soon"]);

        assert_eq!(output.status.code(), Some(2));
    }
}

mod cleanup_command {
    use super::*;

    #[test]
    fn test_requires_repository() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["cleanup", "--dry-run"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("GITHUB_REPOSITORY"));
    }

    #[test]
    fn test_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(
            dir.path(),
            &["cleanup", "--repository", "acme/shop", "--older-than", "old"],
        );

        assert_eq!(output.status.code(), Some(2));
    }
}

mod status_command {
    use super::*;

    #[test]
    fn test_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("body.md"), "Preview ready").unwrap();
        let output = fluxpreview(
            dir.path(),
            &[
                "status",
                "--pr",
                "42",
                "--workflow",
                "preview",
                "--revision",
                "abc123",
                "--body-file",
                "body.md",
            ],
        );

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("GITHUB_TOKEN"));
    }
}

mod apply_command {
    use super::*;

    #[test]
    fn test_missing_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["apply", "-f", "missing.yaml"]);

        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_rejects_foreign_kinds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("deploy.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
        )
        .unwrap();
        let output = fluxpreview(dir.path(), &["apply", "-f", "deploy.yaml"]);

        assert_eq!(output.status.code(), Some(2));
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = fluxpreview(dir.path(), &["--config", "/nonexistent/fluxpreview.yaml", "check"]);

        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fluxpreview.yaml"), "namespace: \"\"\n").unwrap();
        let output = fluxpreview(dir.path(), &["check"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("namespace"));
    }
}
