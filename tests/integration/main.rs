//! Integration tests for cacher

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::os::unix::fs::symlink;
    use std::path::Path;
    use tempfile::TempDir;

    const DIGEST_OF_X: &str = "2d711642b726b04401627ca9fbac32f5c8530fb1903cc4db02258717921a4881";

    /// Run cacher in `dir`, isolated from any user configuration
    fn cacher(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("cacher");
        cmd.current_dir(dir)
            .env("CACHER_CONFIG", dir.join("no-such-config.toml"))
            .env_remove("CACHER_BUCKET")
            .env_remove("CACHER_BACKEND")
            .env_remove("CACHER_STORE_DIR")
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let tmp = TempDir::new().unwrap();
        cacher(tmp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("artifact cache"));
    }

    #[test]
    fn version_displays() {
        let tmp = TempDir::new().unwrap();
        cacher(tmp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cacher"));
    }

    #[test]
    fn key_from_literal() {
        let tmp = TempDir::new().unwrap();
        cacher(tmp.path())
            .args(["key", "--cache-key", "v1"])
            .assert()
            .success()
            .stdout("v1\n");
    }

    #[test]
    fn key_from_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("package-lock.json"), "x").unwrap();

        cacher(tmp.path())
            .args(["key", "--cache-key", "v1", "--cache-key-files", "package-lock.json"])
            .assert()
            .success()
            .stdout(format!("v1-{}\n", DIGEST_OF_X));

        cacher(tmp.path())
            .args(["key", "--cache-key-files", "*.json"])
            .assert()
            .success()
            .stdout(format!("{}\n", DIGEST_OF_X));
    }

    #[test]
    fn key_requires_an_input() {
        let tmp = TempDir::new().unwrap();
        cacher(tmp.path())
            .arg("key")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--cache-key"));
    }

    #[test]
    fn store_requires_file_patterns() {
        let tmp = TempDir::new().unwrap();
        cacher(tmp.path())
            .args(["store", "--cache-key", "v1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--file-patterns"));
    }

    #[test]
    fn gcs_store_requires_bucket() {
        let tmp = TempDir::new().unwrap();
        cacher(tmp.path())
            .args(["store", "--file-patterns", "out", "--cache-key", "v1"])
            .args(["--backend", "gcs"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--bucket"));
    }

    #[test]
    fn restore_miss_writes_marker() {
        let tmp = TempDir::new().unwrap();
        let work = tmp.path().join("work");
        fs::create_dir(&work).unwrap();
        let store_dir = tmp.path().join("store");

        cacher(&work)
            .args(["restore", "--cache-key", "never-stored"])
            .args(["--backend", "filesystem", "--store-dir"])
            .arg(&store_dir)
            .args(["--result-file", "result"])
            .assert()
            .success()
            .stdout("never-stored\n");

        assert_eq!(fs::read_to_string(work.join("result")).unwrap(), "miss");
        let entries: Vec<_> = fs::read_dir(&work).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn store_then_restore_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().join("store");

        let work = tmp.path().join("work");
        fs::create_dir_all(work.join("node_modules").join("left-pad")).unwrap();
        fs::create_dir_all(work.join("node_modules").join("empty")).unwrap();
        fs::write(
            work.join("node_modules").join("left-pad").join("index.js"),
            "module.exports = pad;",
        )
        .unwrap();
        symlink("left-pad/index.js", work.join("node_modules").join("pad.js")).unwrap();
        fs::write(work.join("package-lock.json"), "x").unwrap();

        let expected_key = format!("npm-{}", DIGEST_OF_X);

        cacher(&work)
            .args(["store", "--file-patterns", "node_modules"])
            .args(["--cache-key", "npm", "--cache-key-files", "package-lock.json"])
            .args(["--backend", "filesystem", "--store-dir"])
            .arg(&store_dir)
            .assert()
            .success()
            .stdout(format!("{}\n", expected_key));

        let fresh = tmp.path().join("fresh");
        fs::create_dir(&fresh).unwrap();
        fs::write(fresh.join("package-lock.json"), "x").unwrap();

        cacher(&fresh)
            .args(["restore", "--cache-key", "npm", "--cache-key-files", "package-lock.json"])
            .args(["--backend", "filesystem", "--store-dir"])
            .arg(&store_dir)
            .args(["--result-file", "result"])
            .assert()
            .success()
            .stdout(format!("{}\n", expected_key));

        assert_eq!(fs::read_to_string(fresh.join("result")).unwrap(), "hit");
        assert_eq!(
            fs::read_to_string(fresh.join("node_modules").join("left-pad").join("index.js"))
                .unwrap(),
            "module.exports = pad;"
        );
        assert!(fresh.join("node_modules").join("empty").is_dir());
        assert_eq!(
            fs::read_link(fresh.join("node_modules").join("pad.js")).unwrap(),
            Path::new("left-pad/index.js")
        );
    }

    #[test]
    fn store_names_roots_outside_working_dir() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().join("store");
        let work = tmp.path().join("work");
        fs::create_dir_all(work.join("out")).unwrap();
        fs::write(work.join("out").join("bin"), "binary").unwrap();
        fs::create_dir_all(tmp.path().join("shared")).unwrap();
        fs::write(tmp.path().join("shared").join("lib.a"), "lib").unwrap();

        cacher(&work)
            .args(["store", "--file-patterns", "out,../shared", "--cache-key", "v1"])
            .args(["--backend", "filesystem", "--store-dir"])
            .arg(&store_dir)
            .assert()
            .success()
            .stderr(predicate::str::contains("Not archived"))
            .stderr(predicate::str::contains("../shared"));
    }

    #[test]
    fn different_inputs_miss() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().join("store");
        let work = tmp.path().join("work");
        fs::create_dir_all(work.join("out")).unwrap();
        fs::write(work.join("out").join("bin"), "binary").unwrap();
        fs::write(work.join("Cargo.lock"), "v1").unwrap();

        cacher(&work)
            .args(["store", "--file-patterns", "out", "--cache-key-files", "Cargo.lock"])
            .args(["--backend", "filesystem", "--store-dir"])
            .arg(&store_dir)
            .assert()
            .success();

        fs::write(work.join("Cargo.lock"), "v2").unwrap();

        cacher(&work)
            .args(["restore", "--cache-key-files", "Cargo.lock"])
            .args(["--backend", "filesystem", "--store-dir"])
            .arg(&store_dir)
            .args(["--result-file", "result"])
            .assert()
            .success();

        assert_eq!(fs::read_to_string(work.join("result")).unwrap(), "miss");
    }

    #[test]
    fn invalid_config_is_reported() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("config.toml");
        fs::write(&config, "[store]\nbackend = \"s3\"\n").unwrap();

        cacher(tmp.path())
            .env("CACHER_CONFIG", &config)
            .args(["key", "--cache-key", "v1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }
}
