use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn recall_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("recall");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[store]
path = "{}/data/messages.sqlite"

[index]
dir = "{}/data/index"

[embedding]
provider = "ollama"
model = "mistral"

[server]
bind = "127.0.0.1:7371"

[graph]
tenant_id = "tenant-123"
client_id = "client-456"

[[channels]]
team_name = "Support"
team_id = "team-1"
channel_name = "General"
channel_id = "chan-1"

[[channels]]
team_name = "Eng"
team_id = "team-2"
channel_name = "Infra"
channel_id = "chan-2"
"#,
        root.display(),
        root.display()
    );

    let config_path = root.join("recall.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_recall(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = recall_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        // Keep the run hermetic even when the host has credentials set.
        .env_remove("GRAPH_CLIENT_SECRET")
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run recall binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_recall(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("messages.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_recall(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_recall(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_channels_lists_configured_channels() {
    let (_tmp, config_path) = setup_test_env();

    run_recall(&config_path, &["init"]);
    let (stdout, stderr, success) = run_recall(&config_path, &["channels"]);
    assert!(
        success,
        "channels failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("CHANNEL"));
    assert!(stdout.contains("Support / General"));
    assert!(stdout.contains("Support:General"));
    assert!(stdout.contains("Eng:Infra"));
    assert!(stdout.contains("total"));
}

#[test]
fn test_query_empty_store_reports_no_matches() {
    let (_tmp, config_path) = setup_test_env();

    run_recall(&config_path, &["init"]);
    let (stdout, stderr, success) = run_recall(&config_path, &["query", "vpn reset"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("No matches found"),
        "Expected the no-matches answer, got: {}",
        stdout
    );
}

#[test]
fn test_query_blank_text_is_harmless() {
    let (_tmp, config_path) = setup_test_env();

    run_recall(&config_path, &["init"]);
    let (stdout, _, success) = run_recall(&config_path, &["query", "   "]);
    assert!(success, "Blank query should not panic");
    assert!(stdout.contains("No results"));
}

#[test]
fn test_reindex_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_recall(&config_path, &["init"]);
    let (stdout, _, success) = run_recall(&config_path, &["reindex"]);
    assert!(success);
    assert!(stdout.contains("nothing to index"));
}

#[test]
fn test_sync_requires_graph_section() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let config_content = format!(
        r#"[store]
path = "{}/data/messages.sqlite"

[[channels]]
team_name = "Support"
team_id = "team-1"
channel_name = "General"
channel_id = "chan-1"
"#,
        root.display()
    );
    let config_path = root.join("recall.toml");
    fs::write(&config_path, config_content).unwrap();

    let (_, stderr, success) = run_recall(&config_path, &["sync"]);
    assert!(!success, "sync without [graph] should fail");
    assert!(
        stderr.contains("[graph]"),
        "Should mention the missing section, got: {}",
        stderr
    );
}

#[test]
fn test_sync_requires_client_secret() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_recall(&config_path, &["sync"]);
    assert!(!success, "sync without GRAPH_CLIENT_SECRET should fail");
    assert!(
        stderr.contains("GRAPH_CLIENT_SECRET"),
        "Should name the missing variable, got: {}",
        stderr
    );
}

#[test]
fn test_sync_unknown_channel_label() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_recall(&config_path, &["sync", "--channel", "Nope:Nowhere"]);
    assert!(!success, "Unknown channel label should fail");
    assert!(
        stderr.contains("Unknown channel label"),
        "Should report the label, got: {}",
        stderr
    );
}

#[test]
fn test_config_rejects_unknown_provider() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let config_content = format!(
        r#"[store]
path = "{}/data/messages.sqlite"

[embedding]
provider = "word2vec"
"#,
        root.display()
    );
    let config_path = root.join("recall.toml");
    fs::write(&config_path, config_content).unwrap();

    let (_, stderr, success) = run_recall(&config_path, &["init"]);
    assert!(!success, "Unknown provider should fail validation");
    assert!(
        stderr.contains("Unknown embedding provider"),
        "Should mention the provider, got: {}",
        stderr
    );
}

#[test]
fn test_config_rejects_duplicate_channel_labels() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let config_content = format!(
        r#"[store]
path = "{}/data/messages.sqlite"

[[channels]]
team_name = "Support"
team_id = "team-1"
channel_name = "General"
channel_id = "chan-1"

[[channels]]
team_name = "Support"
team_id = "team-9"
channel_name = "General"
channel_id = "chan-9"
"#,
        root.display()
    );
    let config_path = root.join("recall.toml");
    fs::write(&config_path, config_content).unwrap();

    let (_, stderr, success) = run_recall(&config_path, &["init"]);
    assert!(!success, "Duplicate labels should fail validation");
    assert!(
        stderr.contains("Duplicate channel label"),
        "Should report the duplicate, got: {}",
        stderr
    );
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("does-not-exist.toml");

    let (_, stderr, success) = run_recall(&config_path, &["init"]);
    assert!(!success, "Missing config file should fail");
    assert!(
        stderr.contains("Failed to read config"),
        "Should report the unreadable config, got: {}",
        stderr
    );
}
