use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn docrag(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("docrag").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_status_without_index() {
    let dir = TempDir::new().unwrap();
    docrag(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No index found"));
}

#[test]
fn test_index_empty_directory_fails() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("data")).unwrap();
    docrag(&dir)
        .args(["index", "--no-check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no documents"));
}

#[test]
fn test_index_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    docrag(&dir)
        .args(["index", "--data-dir", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_search_without_index_fails() {
    let dir = TempDir::new().unwrap();
    docrag(&dir)
        .args(["search", "library hours"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No search index found"));
}

#[test]
fn test_unknown_profile_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("docrag.toml"),
        "[profiles.books]\ndata_dir = \"books\"\n",
    )
    .unwrap();
    docrag(&dir)
        .args(["--profile", "news", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("available: books"));
}

#[test]
fn test_page_lookup_with_adjacent() {
    let dir = TempDir::new().unwrap();
    let books = dir.path().join("books");
    fs::create_dir(&books).unwrap();
    fs::write(
        books.join("science.json"),
        r#"[{"pageNo": 1, "contents": ["atoms"]}, {"pageNo": 2, "contents": ["molecules"]}, {"pageNo": 3, "contents": ["cells"]}]"#,
    )
    .unwrap();

    docrag(&dir)
        .args(["page", "science", "2", "--dir", "books", "--adjacent"])
        .assert()
        .success()
        .stdout(predicate::str::contains("molecules"))
        .stdout(predicate::str::contains("atoms"))
        .stdout(predicate::str::contains("cells"));
}

#[test]
fn test_missing_page_fails() {
    let dir = TempDir::new().unwrap();
    docrag(&dir)
        .args(["page", "science", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No page 9"));
}
