//! Spec: spec.md §8, S1 (trivial hit) and S4 (link detected).

use crate::prelude::*;

#[test]
fn first_invocation_misses_second_invocation_hits() {
    let project = Project::empty();
    project.file("a.c", "int main(void) { return 0; }\n");

    project
        .ccwrap()
        .args(["-c", "a.c", "-o", "a.o"])
        .assert()
        .success();
    assert!(project.path("a.o").exists());
    std::fs::remove_file(project.path("a.o")).expect("remove first object");

    project
        .ccwrap()
        .args(["-c", "a.c", "-o", "a.o"])
        .assert()
        .success();
    let installed = std::fs::read(project.path("a.o")).expect("read cached object");
    assert_eq!(installed, b"OBJ");

    project
        .ccwrap_admin()
        .arg("--print-stats")
        .assert()
        .success()
        .stdout(predicates::str::contains("cache_hit_direct\t1"));
}

#[test]
fn link_invocation_is_passed_through_to_the_real_compiler() {
    let project = Project::empty();
    project.file("a.o", "obj-a");
    project.file("b.o", "obj-b");

    project
        .ccwrap()
        .args(["a.o", "b.o", "-o", "prog"])
        .assert()
        .success();
    assert!(project.path("prog").exists());

    project
        .ccwrap_admin()
        .arg("--print-stats")
        .assert()
        .success()
        .stdout(predicates::str::contains("called_for_link\t1"));
}
