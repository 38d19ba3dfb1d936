//! Basic CLI integration tests.

#![allow(deprecated)] // Command::cargo_bin deprecated for custom build-dir; still works for default

use assert_cmd::Command;

const FB2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0">
  <description>
    <title-info>
      <book-title>Test Volume</book-title>
      <author><first-name>Ann</first-name><last-name>Lee</last-name></author>
      <lang>en</lang>
    </title-info>
  </description>
  <body>
    <section id="ch1"><p>One</p></section>
    <section id="ch2"><p>Two</p></section>
  </body>
</FictionBook>"#;

#[test]
fn help_prints_and_exits_success() {
    Command::cargo_bin("folio")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn config_show_runs() {
    Command::cargo_bin("folio")
        .unwrap()
        .args(["config", "show"])
        .assert()
        .success();
}

#[test]
fn config_show_json_valid() {
    let out = Command::cargo_bin("folio")
        .unwrap()
        .args(["config", "show", "--json"])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let _: serde_json::Value = serde_json::from_str(stdout).expect("config show --json should output valid JSON");
}

#[test]
fn import_book_nonexistent_file_fails() {
    Command::cargo_bin("folio")
        .unwrap()
        .args(["import-book", "/nonexistent/file.fb2"])
        .assert()
        .failure();
}

#[test]
fn import_book_lists_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vol.fb2");
    std::fs::write(&path, FB2).unwrap();

    let out = Command::cargo_bin("folio")
        .unwrap()
        .args(["import-book", path.to_str().unwrap(), "--json"])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let info: serde_json::Value = serde_json::from_str(stdout).unwrap();
    assert_eq!(info["metadata"]["title"], "Test Volume");
    assert_eq!(info["sections"].as_array().unwrap().len(), 2);
}

#[test]
fn import_book_prints_one_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vol.fb2");
    std::fs::write(&path, FB2).unwrap();

    let out = Command::cargo_bin("folio")
        .unwrap()
        .args(["import-book", path.to_str().unwrap(), "--section", "1"])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    assert!(stdout.contains("Two"));
    assert!(!stdout.contains("One"));
}

#[test]
fn import_book_malformed_xml_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.fb2");
    std::fs::write(&path, "<FictionBook><body>").unwrap();

    let out = Command::cargo_bin("folio")
        .unwrap()
        .args(["import-book", path.to_str().unwrap()])
        .assert()
        .failure();
    let stderr = std::str::from_utf8(&out.get_output().stderr).unwrap();
    assert!(stderr.contains("Error:"));
}

#[test]
fn import_html_then_render_roundtrips() {
    let imported = Command::cargo_bin("folio")
        .unwrap()
        .args(["import-html", "-"])
        .write_stdin("<p>Hello <b>world</b></p>")
        .assert()
        .success();
    let json = imported.get_output().stdout.clone();
    let nodes: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(nodes[0]["type"], "paragraph");

    let rendered = Command::cargo_bin("folio")
        .unwrap()
        .args(["render", "-"])
        .write_stdin(json)
        .assert()
        .success();
    let html = std::str::from_utf8(&rendered.get_output().stdout).unwrap();
    assert!(html.contains("<strong><span>world</span></strong>"));
}

#[test]
fn render_rejects_invalid_json() {
    Command::cargo_bin("folio")
        .unwrap()
        .args(["render", "-"])
        .write_stdin("not json")
        .assert()
        .failure();
}

#[test]
fn cache_list_on_empty_dir() {
    let dir = tempfile::tempdir().unwrap();
    let out = Command::cargo_bin("folio")
        .unwrap()
        .args(["cache", "list", "--json", "--cache-dir", dir.path().to_str().unwrap()])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let entries: serde_json::Value = serde_json::from_str(stdout).unwrap();
    assert!(entries.as_object().unwrap().is_empty());
}
