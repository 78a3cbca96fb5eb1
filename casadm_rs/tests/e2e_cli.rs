//! End-to-End CLI Tests for casadm
//!
//! Every test runs the real binary against a simulated engine whose state
//! lives in a temp dir, so consecutive invocations observe each other.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory holding engine state, config and fake block devices.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Sparse file standing in for a block device.
    fn device(&self, name: &str, bytes: u64) -> PathBuf {
        let path = self.path(name);
        File::create(&path)
            .expect("create device")
            .set_len(bytes)
            .expect("size device");
        path
    }

    fn casadm(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("casadm");
        cmd.env("CASADM_STATE", self.path("engine.json"))
            .env("CASADM_CONFIG", self.path("casadm.toml"))
            .env("CASADM_SKIP_ROOT_CHECK", "1")
            .env("COLUMNS", "120")
            .env_remove("CASADM_COLORS")
            .env_remove("CASADM_LOG");
        cmd
    }

    /// Start cache 1 on a 64 MiB device and attach one 16 MiB core.
    fn running_cache(&self, mode: &str) -> (PathBuf, PathBuf) {
        let ssd = self.device("ssd", 64 << 20);
        let hdd = self.device("hdd", 16 << 20);
        self.casadm()
            .args(["-S", "-d", s(&ssd), "-c", mode])
            .assert()
            .success()
            .stdout("Successfully added cache instance 1\n");
        self.casadm()
            .args(["-A", "-i", "1", "-d", s(&hdd)])
            .assert()
            .success();
        (ssd, hdd)
    }
}

fn s(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

const HINT: &str = "Try `casadm --help | -H' for more information.\n";

// ============================================
// Grammar
// ============================================

mod grammar {
    use super::*;

    #[test]
    fn no_command_prints_hint() {
        let sb = Sandbox::new();
        sb.casadm()
            .assert()
            .code(1)
            .stderr("No command given.\n")
            .stdout(HINT);
    }

    #[test]
    fn bare_word_is_not_a_command() {
        let sb = Sandbox::new();
        sb.casadm()
            .arg("list")
            .assert()
            .code(1)
            .stderr("Unrecognized command list\n");
    }

    #[test]
    fn typo_gets_a_suggestion() {
        let sb = Sandbox::new();
        sb.casadm()
            .arg("--lst-caches")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Unrecognized command --lst-caches"))
            .stderr(predicate::str::contains("Did you mean '--list-caches'?"));
    }

    #[test]
    fn missing_required_option() {
        let sb = Sandbox::new();
        sb.casadm()
            .arg("--start-cache")
            .assert()
            .code(1)
            .stderr("Missing required option -d/--cache-device\n")
            .stdout(HINT);
    }

    #[test]
    fn option_given_twice() {
        let sb = Sandbox::new();
        sb.casadm()
            .args(["-P", "-i", "1", "-i", "2"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Option supplied more than once -i/--cache-id"));
    }

    #[test]
    fn invalid_value_reports_handler_error() {
        let sb = Sandbox::new();
        sb.casadm()
            .args(["-L", "-o", "xml"])
            .assert()
            .code(1)
            .stderr("Invalid output format\nError during options handling\n");
    }

    #[test]
    fn namespace_needs_a_name() {
        let sb = Sandbox::new();
        sb.casadm()
            .arg("-X")
            .assert()
            .code(1)
            .stderr("Missing namespace option.\n");
        sb.casadm()
            .args(["-X", "-i", "1"])
            .assert()
            .code(1)
            .stderr("Unrecognized option.\n");
        sb.casadm()
            .args(["-G", "-n", "bogus"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Unrecognized namespace entry."));
    }
}

// ============================================
// Help and version
// ============================================

mod help_and_version {
    use super::*;

    #[test]
    fn full_help_lists_commands() {
        let sb = Sandbox::new();
        sb.casadm()
            .arg("-H")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Open CAS Management Utility\n"))
            .stdout(predicate::str::contains("--start-cache"))
            .stdout(predicate::str::contains("--zero-metadata"));
    }

    #[test]
    fn command_help_substitutes_ranges() {
        let sb = Sandbox::new();
        sb.casadm()
            .args(["--set-param", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid values of NAME are:"))
            .stdout(predicate::str::contains("<2-1000>"));
    }

    #[test]
    fn io_class_has_custom_help() {
        let sb = Sandbox::new();
        sb.casadm()
            .args(["--io-class", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Usage: casadm --io-class {--load-config|--list}"));
    }

    #[test]
    fn version_csv() {
        let sb = Sandbox::new();
        sb.casadm()
            .args(["-V", "-o", "csv"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Name,Version\n"))
            .stdout(predicate::str::contains(format!(
                "Open CAS CLI Utility,{}",
                env!("CARGO_PKG_VERSION")
            )));
    }
}

// ============================================
// Cache lifecycle
// ============================================

mod lifecycle {
    use super::*;

    #[test]
    fn empty_engine() {
        let sb = Sandbox::new();
        sb.casadm().arg("-L").assert().success().stdout("No caches running\n");
    }

    #[test]
    fn start_add_list_stop() {
        let sb = Sandbox::new();
        let (ssd, hdd) = sb.running_cache("wt");

        sb.casadm()
            .args(["--list-caches", "--output-format", "csv"])
            .assert()
            .success()
            .stdout(format!(
                "type,id,disk,status,write policy,device\n\
                 cache,1,{},Running,wt,-\n\
                 core,0,{},Active,-,/dev/cas1-0\n",
                ssd.display(),
                hdd.display()
            ));

        sb.casadm().args(["-T", "-i", "1"]).assert().success();
        sb.casadm().arg("-L").assert().success().stdout("No caches running\n");
    }

    #[test]
    fn starting_on_used_metadata_needs_force() {
        let sb = Sandbox::new();
        let (ssd, _) = sb.running_cache("wt");
        sb.casadm().args(["-T", "-i", "1"]).assert().success();

        sb.casadm()
            .args(["-S", "-d", s(&ssd)])
            .assert()
            .code(1);
        sb.casadm()
            .args(["-S", "-d", s(&ssd), "--force"])
            .assert()
            .success();
    }

    #[test]
    fn zero_metadata_after_stop() {
        let sb = Sandbox::new();
        let (ssd, _) = sb.running_cache("wt");
        sb.casadm().args(["-T", "-i", "1"]).assert().success();
        sb.casadm()
            .args(["--zero-metadata", "-d", s(&ssd)])
            .assert()
            .success()
            .stdout(predicate::str::contains("metadata wiped succesfully"));
    }
}

// ============================================
// Statistics and parameters
// ============================================

mod statistics {
    use super::*;

    #[test]
    fn cache_stats_csv_has_header_and_values() {
        let sb = Sandbox::new();
        sb.running_cache("wb");
        let output = sb
            .casadm()
            .args(["-P", "-i", "1", "-o", "csv"])
            .output()
            .expect("run stats");
        assert!(output.status.success());
        let text = String::from_utf8(output.stdout).expect("utf-8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2, "{text}");
        assert!(lines[0].starts_with("Cache Id,Cache Size [4KiB Blocks],Cache Size [GiB]"));
        assert!(lines[1].starts_with("1,16384,0.06"));
    }

    #[test]
    fn stats_text_for_missing_cache() {
        let sb = Sandbox::new();
        sb.casadm()
            .args(["-P", "-i", "9"])
            .assert()
            .code(1)
            .stderr("Cache Id 9 not running\n");
    }

    #[test]
    fn filtered_core_stats() {
        let sb = Sandbox::new();
        sb.running_cache("wt");
        sb.casadm()
            .args(["--stats", "-i", "1", "-j", "0", "-f", "conf"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Core Id"))
            .stdout(predicate::str::contains("Exported Object"))
            .stdout(predicate::str::contains("Usage statistics").not());
    }

    #[test]
    fn params_round_trip() {
        let sb = Sandbox::new();
        sb.running_cache("wb");
        sb.casadm()
            .args(["-X", "-n", "cleaning", "-i", "1", "-p", "acp"])
            .assert()
            .success();
        sb.casadm()
            .args(["-G", "-n", "cleaning", "-i", "1", "-o", "csv"])
            .assert()
            .success()
            .stdout("Parameter name,Value\nCleaning policy type,acp\n");
    }

    #[test]
    fn io_class_from_stdin() {
        let sb = Sandbox::new();
        sb.running_cache("wt");
        sb.casadm()
            .args(["-C", "-C", "-i", "1", "-f", "-"])
            .write_stdin(
                "IO class id,IO class name,Eviction priority,Occupancy\n\
                 0,unclassified,22,1.00\n\
                 1,direct,,0.50\n",
            )
            .assert()
            .success();
        sb.casadm()
            .args(["-C", "-L", "-i", "1", "-o", "csv"])
            .assert()
            .success()
            .stdout(
                "IO class id,IO class name,Eviction priority,Occupancy\n\
                 0,unclassified,22,16384\n\
                 1,direct,,8192\n",
            );
    }
}

// ============================================
// Configuration and audit
// ============================================

mod ambient {
    use super::*;

    #[test]
    fn audit_log_records_invocations() {
        let sb = Sandbox::new();
        let audit = sb.path("audit.log");
        std::fs::write(
            sb.path("casadm.toml"),
            format!("audit_log = \"{}\"\nsystem_logs = []\n", audit.display()),
        )
        .expect("write config");

        sb.casadm().arg("-L").assert().success();
        sb.casadm().arg("-V").assert().success();

        let log = std::fs::read_to_string(&audit).expect("audit log");
        assert_eq!(log.lines().count(), 1, "{log}");
        assert!(log.contains("Casadm invoked with: \""));
        assert!(log.contains("Exit status is 0 (success)."));
    }

    #[test]
    fn broken_config_is_ignored() {
        let sb = Sandbox::new();
        std::fs::write(sb.path("casadm.toml"), "require_root = [").expect("write config");
        sb.casadm()
            .arg("-L")
            .assert()
            .success()
            .stdout("No caches running\n")
            .stderr(predicate::str::contains("[casadm][warn] Failed to parse"));
    }
}
