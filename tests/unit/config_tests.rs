use std::time::Duration;

use z5bot::{config::GlobalConfig, AppError};

fn sample_toml(save_root: &str) -> String {
    format!(
        r#"
ipc_name = "z5bot-test"
story_root = "/srv/stories"

[interpreter]
binary = "dfrotz"
args = ["-m", "-p"]
idle_window_ms = 300
reply_timeout_seconds = 5
max_reply_bytes = 4096

[sessions]
save_root = '{save_root}'
max_concurrent_sessions = 8
idle_eviction_seconds = 600
reaper_interval_seconds = 30

[saves]
suffix = ".sav"
success_tokens = ["ok", "done"]
failure_tokens = ["failed"]
overwrite_token = "overwrite"

[[stories]]
name = "Zork I"
abbrev = "zork1"
filename = "zork1.z5"

[[stories]]
name = "Absolute Tale"
abbrev = "ABS"
filename = "/opt/tales/abs.z8"
"#
    )
}

fn minimal_toml(save_root: &str) -> String {
    format!(
        r#"
[interpreter]
binary = "dfrotz"

[sessions]
save_root = '{save_root}'
"#
    )
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(&sample_toml("/tmp/saves")).expect("valid config");

    assert_eq!(config.ipc_name, "z5bot-test");
    assert_eq!(config.interpreter.args, vec!["-m", "-p"]);
    assert_eq!(config.interpreter.idle_window(), Duration::from_millis(300));
    assert_eq!(config.interpreter.reply_timeout(), Duration::from_secs(5));
    assert_eq!(config.interpreter.max_reply_bytes, 4096);
    assert_eq!(config.sessions.max_concurrent_sessions, 8);
    assert_eq!(config.idle_eviction(), Some(Duration::from_secs(600)));
    assert_eq!(config.saves.suffix, ".sav");
    assert_eq!(config.saves.success_tokens, vec!["ok", "done"]);
    assert_eq!(config.stories.len(), 2);
}

#[test]
fn applies_defaults() {
    let config = GlobalConfig::from_toml_str(&minimal_toml("/tmp/saves")).expect("valid config");

    assert_eq!(config.ipc_name, "z5bot");
    assert!(config.story_root.is_none());
    assert!(config.interpreter.args.is_empty());
    assert_eq!(config.interpreter.idle_window_ms, 250);
    assert_eq!(config.interpreter.reply_timeout_seconds, 10);
    assert_eq!(config.interpreter.max_reply_bytes, 65_536);
    assert_eq!(config.sessions.max_concurrent_sessions, 64);
    assert_eq!(config.sessions.idle_eviction_seconds, 21_600);
    assert_eq!(config.sessions.reaper_interval_seconds, 60);
    assert_eq!(config.saves.suffix, ".qzl");
    assert_eq!(config.saves.success_tokens, vec!["ok"]);
    assert_eq!(config.saves.failure_tokens, vec!["failed"]);
    assert_eq!(config.saves.overwrite_token, "overwrite");
    assert!(config.stories.is_empty());
}

#[test]
fn zero_idle_eviction_disables_eviction() {
    let toml = minimal_toml("/tmp/saves").replace(
        "[sessions]\n",
        "[sessions]\nidle_eviction_seconds = 0\n",
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");
    assert_eq!(config.idle_eviction(), None);
}

#[test]
fn catalog_resolves_relative_paths_against_story_root() {
    let config = GlobalConfig::from_toml_str(&sample_toml("/tmp/saves")).expect("valid config");
    let catalog = config.catalog();

    assert_eq!(catalog.len(), 2);
    let zork = catalog.by_abbrev("zork1").expect("zork1 present");
    assert_eq!(zork.path(), std::path::Path::new("/srv/stories/zork1.z5"));

    let abs = catalog.by_abbrev("abs").expect("abbrev lowercased");
    assert_eq!(abs.path(), std::path::Path::new("/opt/tales/abs.z8"));
    assert_eq!(abs.abbrev(), "abs");
}

#[test]
fn catalog_preserves_order() {
    let config = GlobalConfig::from_toml_str(&sample_toml("/tmp/saves")).expect("valid config");
    let names: Vec<String> = config.catalog().iter().map(|s| s.name().to_owned()).collect();
    assert_eq!(names, vec!["Zork I", "Absolute Tale"]);
}

fn expect_config_error(toml: &str, needle: &str) {
    match GlobalConfig::from_toml_str(toml) {
        Err(AppError::Config(msg)) => {
            assert!(msg.contains(needle), "message '{msg}' should mention '{needle}'");
        }
        other => panic!("expected config error mentioning '{needle}', got {other:?}"),
    }
}

#[test]
fn rejects_empty_binary() {
    let toml = minimal_toml("/tmp/saves").replace(r#"binary = "dfrotz""#, r#"binary = "  ""#);
    expect_config_error(&toml, "interpreter.binary");
}

#[test]
fn rejects_idle_window_not_shorter_than_timeout() {
    let toml = minimal_toml("/tmp/saves").replace(
        "[sessions]",
        "idle_window_ms = 2000\nreply_timeout_seconds = 2\n\n[sessions]",
    );
    expect_config_error(&toml, "idle_window_ms");
}

#[test]
fn rejects_zero_timeout() {
    let toml = minimal_toml("/tmp/saves")
        .replace("[sessions]", "reply_timeout_seconds = 0\n\n[sessions]");
    expect_config_error(&toml, "reply_timeout_seconds");
}

#[test]
fn rejects_zero_process_limit() {
    let toml = minimal_toml("/tmp/saves").replace(
        "[sessions]\n",
        "[sessions]\nmax_concurrent_sessions = 0\n",
    );
    expect_config_error(&toml, "max_concurrent_sessions");
}

#[test]
fn rejects_suffix_without_dot() {
    let toml = format!("{}\n[saves]\nsuffix = \"qzl\"\n", minimal_toml("/tmp/saves"));
    expect_config_error(&toml, "saves.suffix");
}

#[test]
fn rejects_blank_success_tokens() {
    let toml = format!("{}\n[saves]\nsuccess_tokens = [\" \"]\n", minimal_toml("/tmp/saves"));
    expect_config_error(&toml, "success_tokens");
}

#[test]
fn rejects_duplicate_abbreviations() {
    let toml = format!(
        "{}\n[[stories]]\nname = \"A\"\nabbrev = \"x\"\nfilename = \"a.z5\"\n\n[[stories]]\nname = \"B\"\nabbrev = \"X\"\nfilename = \"b.z5\"\n",
        minimal_toml("/tmp/saves")
    );
    expect_config_error(&toml, "duplicate story abbreviation");
}

#[test]
fn rejects_multi_word_abbreviation() {
    let toml = format!(
        "{}\n[[stories]]\nname = \"A\"\nabbrev = \"two words\"\nfilename = \"a.z5\"\n",
        minimal_toml("/tmp/saves")
    );
    expect_config_error(&toml, "single-word abbreviation");
}

#[test]
fn rejects_missing_sections() {
    expect_config_error("ipc_name = \"x\"\n", "invalid config");
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, minimal_toml("/tmp/saves")).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load config");
    assert_eq!(config.interpreter.binary, "dfrotz");
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
