//! Integration tests for the storyline CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to get a storyline command isolated from the caller's environment
fn storyline() -> Command {
    let mut cmd = Command::cargo_bin("storyline").unwrap();
    cmd.env_remove("STORYLINE_USER")
        .env_remove("STORYLINE_DB")
        .env_remove("STORYLINE_ADMIN")
        .env("NO_COLOR", "1");
    cmd
}

/// Helper to create an installation administered by `alice`
fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    storyline()
        .current_dir(tmp.path())
        .args(["init", "--admin", "alice"])
        .assert()
        .success();
    tmp
}

/// Helper to run a command as `alice`
fn as_alice(tmp: &TempDir, args: &[&str]) -> assert_cmd::assert::Assert {
    storyline()
        .current_dir(tmp.path())
        .arg("--as")
        .arg("alice")
        .args(args)
        .assert()
}

/// Helper to build EP-001 > US-001 > (AC-001, REQ-001) and US-002 > REQ-002
fn create_test_hierarchy(tmp: &TempDir) {
    as_alice(tmp, &["epic", "new", "Checkout"]).success();
    as_alice(tmp, &["story", "new", "EP-001", "Pay by card"]).success();
    as_alice(tmp, &["story", "new", "EP-001", "Pay by invoice"]).success();
    as_alice(
        tmp,
        &["ac", "new", "US-001", "WHEN the card is declined THE SYSTEM SHALL offer a retry"],
    )
    .success();
    as_alice(tmp, &["req", "new", "US-001", "Card form", "--type", "functional"]).success();
    as_alice(tmp, &["req", "new", "US-002", "Invoice PDF", "--type", "functional"]).success();
    as_alice(tmp, &["link", "add", "REQ-001", "depends_on", "REQ-002"]).success();
}

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_init_creates_installation() {
    let tmp = TempDir::new().unwrap();
    storyline()
        .current_dir(tmp.path())
        .args(["init", "--admin", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized storyline installation"))
        .stdout(predicate::str::contains("Created administrator"));

    assert!(tmp.path().join(".storyline").is_dir());
    assert!(tmp.path().join(".storyline/config.yaml").exists());
}

#[test]
fn test_init_twice_reseeds_without_error() {
    let tmp = setup_test_project();
    storyline()
        .current_dir(tmp.path())
        .args(["init", "--admin", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_command_outside_installation_fails() {
    let tmp = TempDir::new().unwrap();
    storyline()
        .current_dir(tmp.path())
        .args(["--as", "alice", "epic", "list"])
        .assert()
        .failure();
}

// ============================================================================
// Users and roles
// ============================================================================

#[test]
fn test_missing_user_is_rejected() {
    let tmp = setup_test_project();
    storyline()
        .current_dir(tmp.path())
        .args(["epic", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--as"));
}

#[test]
fn test_user_from_environment() {
    let tmp = setup_test_project();
    storyline()
        .current_dir(tmp.path())
        .env("STORYLINE_USER", "alice")
        .args(["user", "whoami"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice"));
}

#[test]
fn test_commenter_cannot_create_epics() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["user", "add", "carol", "--role", "commenter"]).success();
    storyline()
        .current_dir(tmp.path())
        .args(["--as", "carol", "epic", "new", "Nope"])
        .assert()
        .failure();
}

// ============================================================================
// Epics and stories
// ============================================================================

#[test]
fn test_epic_new_and_list() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["epic", "new", "Checkout", "-p", "high"])
        .success()
        .stdout(predicate::str::contains("Created EP-001"));
    as_alice(&tmp, &["epic", "new", "Reporting"])
        .success()
        .stdout(predicate::str::contains("Created EP-002"));

    as_alice(&tmp, &["epic", "list"])
        .success()
        .stdout(predicate::str::contains("EP-001"))
        .stdout(predicate::str::contains("Checkout"))
        .stdout(predicate::str::contains("EP-002"));
}

#[test]
fn test_epic_json_output() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["epic", "new", "Checkout"]).success();

    let output = storyline()
        .current_dir(tmp.path())
        .args(["--as", "alice", "-f", "json", "epic", "show", "EP-001"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["reference_id"], "EP-001");
    assert_eq!(json["status"], "Backlog");
}

#[test]
fn test_epic_list_id_format() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["epic", "new", "One"]).success();
    as_alice(&tmp, &["epic", "new", "Two"]).success();
    as_alice(&tmp, &["-f", "id", "epic", "list"])
        .success()
        .stdout("EP-001\nEP-002\n");
}

#[test]
fn test_story_requires_existing_epic() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["story", "new", "EP-404", "Orphan"]).failure();
}

#[test]
fn test_epic_tree_shows_descendants() {
    let tmp = setup_test_project();
    create_test_hierarchy(&tmp);
    as_alice(&tmp, &["epic", "tree", "EP-001"])
        .success()
        .stdout(predicate::str::contains("US-001"))
        .stdout(predicate::str::contains("AC-001"))
        .stdout(predicate::str::contains("REQ-002"));
}

// ============================================================================
// Workflow
// ============================================================================

#[test]
fn test_invalid_status_transition() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["epic", "new", "Release"]).success();
    as_alice(&tmp, &["epic", "status", "EP-001", "Done"])
        .failure()
        .stderr(predicate::str::contains("Backlog→Done"));
    as_alice(&tmp, &["epic", "status", "EP-001", "InProgress"])
        .success()
        .stdout(predicate::str::contains("EP-001 is now InProgress"));
}

#[test]
fn test_workflow_show_lists_statuses() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["workflow", "show", "requirement"])
        .success()
        .stdout(predicate::str::contains("Draft"))
        .stdout(predicate::str::contains("Obsolete"));
}

// ============================================================================
// Relationships
// ============================================================================

#[test]
fn test_link_cycle_is_rejected() {
    let tmp = setup_test_project();
    create_test_hierarchy(&tmp);
    as_alice(&tmp, &["link", "add", "REQ-002", "depends_on", "REQ-001"])
        .failure()
        .stderr(predicate::str::contains("cycle"));
    as_alice(&tmp, &["link", "add", "REQ-002", "relates_to", "REQ-001"]).success();
    as_alice(&tmp, &["link", "list", "REQ-001"])
        .success()
        .stdout(predicate::str::contains("depends_on"))
        .stdout(predicate::str::contains("relates_to"));
}

// ============================================================================
// Comments
// ============================================================================

#[test]
fn test_comment_add_and_list() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["epic", "new", "Checkout"]).success();
    as_alice(&tmp, &["comment", "add", "epic", "EP-001", "Needs a security review"]).success();
    as_alice(&tmp, &["comment", "list", "epic", "EP-001"])
        .success()
        .stdout(predicate::str::contains("Needs a security review"));
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_delete_dry_run_then_cascade() {
    let tmp = setup_test_project();
    create_test_hierarchy(&tmp);

    as_alice(&tmp, &["impact", "EP-001"])
        .success()
        .stdout(predicate::str::contains("6 dependent record(s)"));

    as_alice(&tmp, &["delete", "EP-001", "--cascade", "--dry-run"])
        .success()
        .stdout(predicate::str::contains("dry run"));
    as_alice(&tmp, &["epic", "show", "EP-001"]).success();

    as_alice(&tmp, &["delete", "EP-001", "--yes"]).failure();

    as_alice(&tmp, &["delete", "EP-001", "--cascade", "--yes"])
        .success()
        .stdout(predicate::str::contains("Deleted"))
        .stdout(predicate::str::contains("EP-001"));
    as_alice(&tmp, &["epic", "show", "EP-001"]).failure();
    as_alice(&tmp, &["req", "show", "REQ-002"]).failure();
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_search_finds_matches() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["epic", "new", "Authentication"]).success();
    as_alice(&tmp, &["epic", "new", "Reporting"]).success();

    as_alice(&tmp, &["search", "authentication"])
        .success()
        .stdout(predicate::str::contains("EP-001"))
        .stdout(predicate::str::contains("EP-002").not());

    let output = storyline()
        .current_dir(tmp.path())
        .args(["--as", "alice", "-f", "json", "search", "authentication"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["total_count"], 1);
}

#[test]
fn test_suggest_rejects_short_prefix() {
    let tmp = setup_test_project();
    as_alice(&tmp, &["suggest", "a"]).failure();
}

// ============================================================================
// Health and completions
// ============================================================================

#[test]
fn test_health_needs_no_user() {
    let tmp = setup_test_project();
    storyline()
        .current_dir(tmp.path())
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("database"));
    storyline()
        .current_dir(tmp.path())
        .args(["health", "--live"])
        .assert()
        .success();
}

#[test]
fn test_completions_bash() {
    storyline()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("storyline"));
}

#[test]
fn test_help_lists_commands() {
    storyline()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("epic"))
        .stdout(predicate::str::contains("search"));
}
