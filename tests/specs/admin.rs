//! Spec: spec.md §6 (administrative command-line interface).

use crate::prelude::*;

#[test]
fn show_config_and_get_config_round_trip() {
    let project = Project::empty();

    project
        .ccwrap_admin()
        .args(["--set-config", "max_files=123"])
        .assert()
        .success();

    project
        .ccwrap_admin()
        .args(["--get-config", "max_files"])
        .assert()
        .success()
        .stdout(predicates::str::contains("123"));

    project
        .ccwrap_admin()
        .arg("--show-config")
        .assert()
        .success()
        .stdout(predicates::str::contains("max_files = 123"));
}

#[test]
fn get_config_rejects_unknown_key() {
    let project = Project::empty();
    project
        .ccwrap_admin()
        .args(["--get-config", "not_a_real_key"])
        .assert()
        .failure();
}

#[test]
fn zero_stats_resets_counters_to_zero() {
    let project = Project::empty();
    project.file("a.c", "int main(void) { return 0; }\n");

    project.ccwrap().args(["-c", "a.c", "-o", "a.o"]).assert().success();

    project
        .ccwrap_admin()
        .arg("--print-stats")
        .assert()
        .success()
        .stdout(predicates::str::contains("cache_miss\t1"));

    project.ccwrap_admin().arg("--zero-stats").assert().success();

    project
        .ccwrap_admin()
        .arg("--print-stats")
        .assert()
        .success()
        .stdout(predicates::str::contains("cache_miss\t0"));
}

#[test]
fn hash_file_prints_a_stable_digest() {
    let project = Project::empty();
    project.file("a.c", "int main(void) { return 0; }\n");

    let a_c = project.path("a.c");
    let a_c = a_c.to_str().expect("utf8 path");

    let first = project.ccwrap_admin().args(["--hash-file", a_c]).output().expect("run ccwrap");
    let second = project.ccwrap_admin().args(["--hash-file", a_c]).output().expect("run ccwrap");

    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    assert!(!first.stdout.is_empty());
}

#[test]
fn clear_removes_cached_objects_and_resets_the_hit_count() {
    let project = Project::empty();
    project.file("a.c", "int main(void) { return 0; }\n");

    project.ccwrap().args(["-c", "a.c", "-o", "a.o"]).assert().success();
    std::fs::remove_file(project.path("a.o")).expect("remove first object");

    project.ccwrap_admin().arg("--clear").assert().success();

    project.ccwrap().args(["-c", "a.c", "-o", "a.o"]).assert().success();
    assert!(project.path("a.o").exists());

    project
        .ccwrap_admin()
        .arg("--print-stats")
        .assert()
        .success()
        .stdout(predicates::str::contains("cache_miss\t1"));
}
