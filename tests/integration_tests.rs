//! Integration tests for solcover
//!
//! These run the real binary against throwaway projects whose stages and
//! instrumenter are small shell scripts.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a solcover Command
fn solcover() -> Command {
    let mut cmd = cargo_bin_cmd!("solcover");
    cmd.env_remove("SOLCOVER_INSTRUMENTER")
        .env_remove("SOLCOVER_STAGE_TIMEOUT")
        .env_remove("SOLCOVER_LOG");
    cmd
}

/// A project with the standard layout:
///
/// ```text
/// contracts/Foo.sol
/// contracts/random/PRNG.sol   (skipped)
/// tests/Bar.sol
/// ```
fn create_temp_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("contracts/random")).unwrap();
    fs::create_dir_all(dir.path().join("tests")).unwrap();
    fs::write(dir.path().join("contracts/Foo.sol"), "contract Foo {}").unwrap();
    fs::write(
        dir.path().join("contracts/random/PRNG.sol"),
        "library PRNG {}",
    )
    .unwrap();
    fs::write(dir.path().join("tests/Bar.sol"), "contract Bar {}").unwrap();
    dir
}

fn write_config(dir: &Path, content: &str) {
    fs::create_dir_all(dir.join(".solcover")).unwrap();
    fs::write(dir.join(".solcover/solcover.toml"), content).unwrap();
}

/// Write a canned instrumenter response for the two instrumentable files.
///
/// The instrumenter command discards its request and prints this file.
fn write_instrumenter_response(dir: &Path) {
    let root = dir.canonicalize().unwrap();
    let response = json!({
        "files": [
            {
                "path": root.join("contracts/Foo.sol"),
                "source": "// probe\ncontract Foo {}",
                "sites": {"0xf00": {"line": 1}, "0xf01": {"line": 2}}
            },
            {
                "path": root.join("tests/Bar.sol"),
                "source": "// probe\ncontract Bar {}",
                "sites": {"0xba2": {"line": 1}}
            }
        ]
    });
    fs::write(dir.join("response.json"), response.to_string()).unwrap();
}

const RUNNABLE_CONFIG: &str = r#"
[[roots]]
path = "./contracts"
skip = ["random/PRNG.sol"]

[[roots]]
path = "./tests"

[stages]
generate = ["sh", "generate.sh"]
test = ["sh", "test.sh"]

[instrumenter]
command = "cat > /dev/null; cat response.json"
"#;

fn create_runnable_project(generate: &str, test: &str) -> TempDir {
    let dir = create_temp_project();
    write_config(dir.path(), RUNNABLE_CONFIG);
    write_instrumenter_response(dir.path());
    fs::write(dir.path().join("generate.sh"), generate).unwrap();
    fs::write(dir.path().join("test.sh"), test).unwrap();
    dir
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_solcover_help() {
        solcover()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("select"))
            .stdout(predicate::str::contains("clean"));
    }

    #[test]
    fn test_solcover_version() {
        solcover().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        solcover().arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Init Tests
// =============================================================================

mod init {
    use super::*;

    #[test]
    fn test_init_creates_config() {
        let dir = create_temp_project();

        solcover()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized solcover"));

        let config = fs::read_to_string(dir.path().join(".solcover/solcover.toml")).unwrap();
        assert!(config.contains("random/PRNG.sol"));
        assert!(config.contains("testverbose"));
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();

        solcover()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success();

        solcover()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_init_with_project_dir_flag() {
        let dir = create_temp_project();

        solcover()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("init")
            .assert()
            .success();

        assert!(dir.path().join(".solcover/solcover.toml").exists());
    }
}

// =============================================================================
// Select Tests
// =============================================================================

mod select {
    use super::*;

    #[test]
    fn test_select_uses_default_layout_without_config() {
        let dir = create_temp_project();

        solcover()
            .current_dir(dir.path())
            .arg("select")
            .assert()
            .success()
            .stdout(predicate::str::contains("Foo.sol"))
            .stdout(predicate::str::contains("Bar.sol"))
            .stdout(predicate::str::contains("random/PRNG.sol (skipped)"))
            .stdout(predicate::str::contains("2 to instrument, 1 passed through"));
    }

    #[test]
    fn test_select_writes_nothing() {
        let dir = create_temp_project();

        solcover()
            .current_dir(dir.path())
            .arg("select")
            .assert()
            .success();

        assert!(!dir.path().join("contracts/.Foo.cover.sol").exists());
        assert!(!dir.path().join(".solcover").exists());
    }

    #[test]
    fn test_select_missing_root_fails() {
        let dir = create_temp_project();
        fs::remove_dir_all(dir.path().join("tests")).unwrap();

        solcover()
            .current_dir(dir.path())
            .arg("select")
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not exist"));
    }

    #[test]
    fn test_select_rejects_invalid_config() {
        let dir = create_temp_project();
        write_config(
            dir.path(),
            "[[roots]]\npath = \"contracts\"\nskip = [\"../escape.sol\"]\n",
        );

        solcover()
            .current_dir(dir.path())
            .arg("select")
            .assert()
            .failure()
            .stderr(predicate::str::contains("must be a relative path inside the root"));
    }

    #[test]
    fn test_select_with_explicit_config_file() {
        let dir = create_temp_project();
        let config = dir.path().join("alt.toml");
        fs::write(&config, "[[roots]]\npath = \"tests\"\n").unwrap();

        solcover()
            .current_dir(dir.path())
            .arg("--config")
            .arg(&config)
            .arg("select")
            .assert()
            .success()
            .stdout(predicate::str::contains("Bar.sol"))
            .stdout(predicate::str::contains("Foo.sol").not())
            .stdout(predicate::str::contains("1 to instrument, 0 passed through"));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = create_temp_project();

        solcover()
            .current_dir(dir.path())
            .args(["--config", "nope.toml", "select"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }
}

// =============================================================================
// Run Tests
// =============================================================================

mod run {
    use super::*;

    const PAYLOAD_TEST: &str = r#"
[ "$ETHIER_COVERAGE" = "true" ] || exit 7
echo '=== RUN   TestFoo'
echo '[ETHIER_COVERAGE]{"0xf00":{"hits":1}}[ETHIER_COVERAGE]'
echo 'noise [ETHIER_COVERAGE]{"0xf00":{"hits":2},"0xdead":{"hits":9}}[ETHIER_COVERAGE]' >&2
echo '--- PASS: TestFoo'
"#;

    #[test]
    fn test_run_merges_coverage_and_writes_report() {
        let dir = create_runnable_project("test -f contracts/.Foo.cover.sol", PAYLOAD_TEST);

        solcover()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("=== RUN   TestFoo"))
            .stdout(predicate::str::contains("Coverage run complete"))
            .stdout(predicate::str::contains("2 instrumented, 1 passed through"))
            .stdout(predicate::str::contains("1/3 sites hit (3 hits)"))
            .stdout(predicate::str::contains("%").not());

        let report: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join(".solcover/coverage.json")).unwrap(),
        )
        .unwrap();
        assert!(report["generatedAt"].is_string());
        assert_eq!(report["sites"]["0xf00"]["hits"], 3);
        assert_eq!(report["sites"]["0xf00"]["line"], 1);
        assert_eq!(report["sites"]["0xf01"]["hits"], 0);
        assert_eq!(report["sites"]["0xba2"]["hits"], 0);
        assert!(report["sites"].get("0xdead").is_none());

        assert_eq!(
            fs::read_to_string(dir.path().join("contracts/.Foo.cover.sol")).unwrap(),
            "// probe\ncontract Foo {}"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("contracts/random/.PRNG.cover.sol")).unwrap(),
            "library PRNG {}"
        );
        assert!(dir.path().join("tests/.Bar.cover.sol").exists());
    }

    #[test]
    fn test_run_output_flag() {
        let dir = create_runnable_project("true", PAYLOAD_TEST);

        solcover()
            .current_dir(dir.path())
            .args(["run", "--output", "out/cov.json"])
            .assert()
            .success();

        assert!(dir.path().join("out/cov.json").exists());
        assert!(!dir.path().join(".solcover/coverage.json").exists());
    }

    #[test]
    fn test_generate_failure_skips_test_stage() {
        let dir = create_runnable_project(
            "echo 'compile error' >&2; exit 3",
            "touch test-ran",
        );

        solcover()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("compile error"))
            .stderr(predicate::str::contains(
                "generate stage failed with exit status 3",
            ));

        assert!(!dir.path().join("test-ran").exists());
        assert!(!dir.path().join(".solcover/coverage.json").exists());
    }

    #[test]
    fn test_test_failure_fails_run() {
        let dir = create_runnable_project("true", "echo 'FAIL'; exit 1");

        solcover()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("test stage failed with exit status 1"));
    }

    #[test]
    fn test_run_without_instrumenter_fails() {
        let dir = create_temp_project();

        solcover()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No instrumenter configured"));
    }

    #[test]
    fn test_instrumenter_env_override() {
        let dir = create_runnable_project("true", "true");
        write_config(
            dir.path(),
            &RUNNABLE_CONFIG.replace("cat > /dev/null; cat response.json", "exit 42"),
        );

        solcover()
            .current_dir(dir.path())
            .env("SOLCOVER_INSTRUMENTER", "cat > /dev/null; cat response.json")
            .arg("run")
            .assert()
            .success();
    }

    #[test]
    fn test_instrumenter_failure_is_reported() {
        let dir = create_runnable_project("true", "true");

        solcover()
            .current_dir(dir.path())
            .args(["run", "--instrumenter", "echo boom >&2; exit 5"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Instrumenter exited with code 5: boom"));

        assert!(!dir.path().join("contracts/.Foo.cover.sol").exists());
    }

    #[test]
    fn test_stage_timeout() {
        let dir = create_runnable_project("sleep 10", "true");

        solcover()
            .current_dir(dir.path())
            .args(["run", "--timeout", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("generate stage timed out after 1 seconds"));
    }
}

// =============================================================================
// Clean Tests
// =============================================================================

mod clean {
    use super::*;

    fn plant_shadows(dir: &Path) {
        fs::write(dir.join("contracts/.Foo.cover.sol"), "x").unwrap();
        fs::write(dir.join("contracts/random/.PRNG.cover.sol"), "x").unwrap();
    }

    #[test]
    fn test_clean_force_removes_shadow_files() {
        let dir = create_temp_project();
        plant_shadows(dir.path());

        solcover()
            .current_dir(dir.path())
            .args(["clean", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 2 shadow file(s)"));

        assert!(!dir.path().join("contracts/.Foo.cover.sol").exists());
        assert!(!dir.path().join("contracts/random/.PRNG.cover.sol").exists());
        assert!(dir.path().join("contracts/Foo.sol").exists());
    }

    #[test]
    fn test_clean_without_terminal_cancels() {
        let dir = create_temp_project();
        plant_shadows(dir.path());

        solcover()
            .current_dir(dir.path())
            .arg("clean")
            .assert()
            .success()
            .stdout(predicate::str::contains("Clean cancelled"));

        assert!(dir.path().join("contracts/.Foo.cover.sol").exists());
    }

    #[test]
    fn test_clean_with_nothing_to_do() {
        let dir = create_temp_project();

        solcover()
            .current_dir(dir.path())
            .args(["clean", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No shadow files found"));
    }
}
