//! Unit tests for `AppError` display format and conversions.

use z5bot::AppError;

fn all_variants(msg: &str) -> Vec<(AppError, &'static str)> {
    vec![
        (AppError::Config(msg.into()), "config:"),
        (AppError::Spawn(msg.into()), "spawn:"),
        (AppError::Io(msg.into()), "io:"),
        (AppError::SessionDead(msg.into()), "session dead:"),
        (AppError::AlreadyPlaying(msg.into()), "already playing:"),
        (AppError::NoStory(msg.into()), "no story:"),
        (AppError::Capacity(msg.into()), "capacity:"),
        (AppError::Save(msg.into()), "save:"),
        (AppError::Restore(msg.into()), "restore:"),
        (AppError::PathEscape(msg.into()), "path escape:"),
        (AppError::NotFound(msg.into()), "not found:"),
        (AppError::Ipc(msg.into()), "ipc:"),
    ]
}

#[test]
fn every_variant_has_its_prefix() {
    for (err, prefix) in all_variants("boom") {
        let text = err.to_string();
        assert!(text.starts_with(prefix), "{text} should start with {prefix}");
        assert!(text.ends_with("boom"), "{text} should carry the message");
    }
}

#[test]
fn prefixes_are_distinct() {
    let rendered: Vec<String> = all_variants("same")
        .into_iter()
        .map(|(err, _)| err.to_string())
        .collect();
    let unique: std::collections::HashSet<&String> = rendered.iter().collect();
    assert_eq!(unique.len(), rendered.len());
}

#[test]
fn session_dead_display() {
    let err = AppError::SessionDead("the interpreter for 'Zork' is no longer running".into());
    assert_eq!(
        err.to_string(),
        "session dead: the interpreter for 'Zork' is no longer running"
    );
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("pipe closed")));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse: Result<toml::Value, _> = toml::from_str("not = [valid");
    let err: AppError = parse.expect_err("invalid toml").into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn implements_std_error() {
    fn takes_error(_: &dyn std::error::Error) {}
    takes_error(&AppError::Capacity("full".into()));
}
