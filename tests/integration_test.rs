// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! CLI round-trips against the built binary: init, status, and the
//! models verbs, each confined to a temp workspace via an explicit config.

use std::path::Path;
use std::process::Command;

fn adytum() -> Command {
    Command::new(env!("CARGO_BIN_EXE_adytum"))
}

/// Write a config whose data dir and soul live under `root`.
fn write_config(root: &Path) -> std::path::PathBuf {
    let config_path = root.join("config.yaml");
    let text = format!(
        "data_dir: {}\nsoul:\n  path: {}\n",
        root.join("data").display(),
        root.join("SOUL.md").display(),
    );
    std::fs::write(&config_path, text).unwrap();
    config_path
}

#[test]
fn init_bootstraps_workspace_and_root_agent() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());

    let out = adytum()
        .args(["-c", config.to_str().unwrap(), "init"])
        .output()
        .unwrap();
    assert!(out.status.success(), "init failed: {}", String::from_utf8_lossy(&out.stderr));

    assert!(tmp.path().join("data/hierarchy/agents.json").exists());
    assert!(tmp.path().join("data/skills").is_dir());
    assert!(tmp.path().join("SOUL.md").exists());

    // Second init is idempotent (root already exists).
    let again = adytum()
        .args(["-c", config.to_str().unwrap(), "init"])
        .output()
        .unwrap();
    assert!(again.status.success());
}

#[test]
fn status_reports_the_root_agent() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    adytum()
        .args(["-c", config.to_str().unwrap(), "init"])
        .status()
        .unwrap();

    let out = adytum()
        .args(["-c", config.to_str().unwrap(), "status"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("Overseer"), "status output: {text}");
    assert!(text.contains("1 active"));
}

#[test]
fn reset_refuses_without_yes() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    adytum()
        .args(["-c", config.to_str().unwrap(), "init"])
        .status()
        .unwrap();

    let out = adytum()
        .args(["-c", config.to_str().unwrap(), "reset"])
        .output()
        .unwrap();
    assert!(!out.status.success(), "reset without --yes must fail");
    assert!(tmp.path().join("data").exists());

    let out = adytum()
        .args(["-c", config.to_str().unwrap(), "reset", "--yes"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn models_add_list_remove_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let cfg = config.to_str().unwrap();

    let out = adytum()
        .args(["-c", cfg, "models", "add", "groq/my-test-model"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let list = adytum().args(["-c", cfg, "models", "list"]).output().unwrap();
    let text = String::from_utf8_lossy(&list.stdout);
    assert!(text.contains("groq/my-test-model"));
    // Builtin catalog entries are still listed alongside the override.
    assert!(text.contains("anthropic/"));

    let rm = adytum()
        .args(["-c", cfg, "models", "remove", "groq/my-test-model"])
        .output()
        .unwrap();
    assert!(rm.status.success());

    let rm_again = adytum()
        .args(["-c", cfg, "models", "remove", "groq/my-test-model"])
        .output()
        .unwrap();
    assert!(!rm_again.status.success(), "removing twice must fail");
}

#[test]
fn skill_list_reports_discovered_packages() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let cfg = config.to_str().unwrap();
    adytum().args(["-c", cfg, "init"]).status().unwrap();

    let skill_dir = tmp.path().join("data/skills/web-search");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(
        skill_dir.join("manifest.yaml"),
        "id: web-search\ndescription: Search the web.\n",
    )
    .unwrap();

    let out = adytum().args(["-c", cfg, "skill", "list"]).output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("web-search"));
}
