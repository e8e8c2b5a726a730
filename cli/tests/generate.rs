//! CLI surface tests.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const TS_URL: &str = "https://xschema.dev/schemas/ts.jsonc";
const PY_URL: &str = "https://xschema.dev/schemas/py.jsonc";

fn xschema() -> Command {
    Command::cargo_bin("xschema").unwrap()
}

fn write(dir: &TempDir, name: &str, content: &str) {
    fs::write(dir.path().join(name), content).unwrap();
}

#[test]
fn help_lists_generate() {
    xschema()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"));
}

#[test]
fn version_prints() {
    xschema()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("xschema"));
}

#[test]
fn dry_run_prints_the_plan() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "users.jsonc",
        &format!(
            r#"{{"$schema": "{TS_URL}", "schemas": [
                {{"id": "User", "sourceType": "json", "source": {{"type": "string"}}, "adapter": "@xschema/zod"}}
            ]}}"#
        ),
    );

    xschema()
        .args(["generate", "--dry-run"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("users:User"))
        .stdout(predicate::str::contains("@xschema/zod"));

    assert!(!dir.path().join(".xschema").exists());
}

#[test]
fn duplicate_ids_fail_with_both_paths() {
    let dir = TempDir::new().unwrap();
    let entry = r#"{"id": "User", "sourceType": "json", "source": {}, "adapter": "zod"}"#;
    write(
        &dir,
        "a.jsonc",
        &format!(r#"{{"$schema": "{TS_URL}", "namespace": "shared", "schemas": [{entry}]}}"#),
    );
    write(
        &dir,
        "b.jsonc",
        &format!(r#"{{"$schema": "{TS_URL}", "namespace": "shared", "schemas": [{entry}]}}"#),
    );

    xschema()
        .args(["generate", "--dry-run"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate schema id"))
        .stderr(predicate::str::contains("a.jsonc"))
        .stderr(predicate::str::contains("b.jsonc"));
}

#[test]
fn mixed_languages_fail_without_lang_flag() {
    let dir = TempDir::new().unwrap();
    write(&dir, "ts.jsonc", &format!(r#"{{"$schema": "{TS_URL}", "schemas": []}}"#));
    write(&dir, "py.jsonc", &format!(r#"{{"$schema": "{PY_URL}", "schemas": []}}"#));

    xschema()
        .args(["generate", "--dry-run"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("multiple languages"))
        .stderr(predicate::str::contains("python"))
        .stderr(predicate::str::contains("typescript"));
}

#[test]
fn lang_flag_resolves_the_ambiguity() {
    let dir = TempDir::new().unwrap();
    write(&dir, "ts.jsonc", &format!(r#"{{"$schema": "{TS_URL}", "schemas": []}}"#));
    write(&dir, "py.jsonc", &format!(r#"{{"$schema": "{PY_URL}", "schemas": []}}"#));

    xschema()
        .args(["generate", "--dry-run", "--lang", "typescript"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn exclude_pattern_narrows_the_plan() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "users.jsonc",
        &format!(
            r#"{{"$schema": "{TS_URL}", "schemas": [
                {{"id": "User", "sourceType": "json", "source": {{"type": "string"}}, "adapter": "zod"}}
            ]}}"#
        ),
    );
    write(
        &dir,
        "posts.jsonc",
        &format!(
            r#"{{"$schema": "{TS_URL}", "schemas": [
                {{"id": "Post", "sourceType": "json", "source": {{"type": "number"}}, "adapter": "zod"}}
            ]}}"#
        ),
    );

    xschema()
        .args(["generate", "--dry-run", "--exclude", r"posts\.jsonc$"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("users:User"))
        .stdout(predicate::str::contains("posts:Post").not());
}

#[test]
fn invalid_include_regex_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    xschema()
        .args(["generate", "--dry-run", "--include", "[unclosed"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid --include regex"));
}

#[test]
fn invalid_exclude_regex_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    xschema()
        .args(["generate", "--dry-run", "--exclude", "(dangling"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid --exclude regex"));
}

#[test]
fn unknown_lang_is_rejected() {
    let dir = TempDir::new().unwrap();
    xschema()
        .args(["generate", "--lang", "cobol"])
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown language"))
        .stderr(predicate::str::contains("typescript"));
}

#[test]
fn empty_project_reports_no_declarations() {
    let dir = TempDir::new().unwrap();
    xschema()
        .arg("generate")
        .args(["--project", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("no xschema declarations found"));
}
