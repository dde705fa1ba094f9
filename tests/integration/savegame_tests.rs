//! Integration tests for the save/restore dialog against the fake
//! interpreter.

use std::time::Duration;

use chrono::Local;
use z5bot::config::SaveConfig;
use z5bot::models::key::SessionKey;
use z5bot::savegame::{AckMatcher, SaveProtocol};
use z5bot::AppError;

use super::test_helpers::Fixture;

#[tokio::test]
async fn save_then_restore_round_trips_game_state() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("42")).await;
    session.select_story(fx.cave()).await.expect("select");
    session.send("light lamp").await.expect("send");

    let file = saves.save(&session).await.expect("save");
    assert!(file.file_name.ends_with(".qzl"));
    assert!(file.path.starts_with(session.save_dir()));
    assert_eq!(
        std::fs::read_to_string(&file.path).expect("save written").trim(),
        "lit"
    );
    assert!(session.save_dir().ends_with("chat-42"));

    session.select_story(fx.cave()).await.expect("restart");
    let reply = session.send("look").await.expect("send");
    assert_eq!(reply.display_text(), "It is pitch dark.");

    let restored = saves.restore(&session, &file.file_name).await.expect("restore");
    assert!(restored.text.contains("Ok."));
    let reply = session.send("look").await.expect("send");
    assert!(reply.text.contains("A lit room."));

    registry.shutdown().await;
}

#[tokio::test]
async fn save_without_story_is_no_story() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let session = registry.get_or_create(&SessionKey::new("1")).await;

    let result = fx.saves().save(&session).await;
    assert!(matches!(result, Err(AppError::NoStory(_))));
    assert!(!session.save_dir().exists(), "nothing created without a story");
}

#[tokio::test]
async fn restore_without_story_is_no_story() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    std::fs::create_dir_all(session.save_dir()).expect("mkdir");
    std::fs::write(session.save_dir().join("a.qzl"), "lit\n").expect("write");

    let result = fx.saves().restore(&session, "a.qzl").await;
    assert!(matches!(result, Err(AppError::NoStory(_))));
}

#[tokio::test]
async fn escaping_restore_is_rejected_before_the_interpreter() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");
    saves.save(&session).await.expect("save");

    for name in ["../../etc/passwd", "../chat-2/x.qzl", "/etc/passwd", ".."] {
        let result = saves.restore(&session, name).await;
        assert!(matches!(result, Err(AppError::PathEscape(_))), "{name}: {result:?}");
    }

    let reply = session.send("look").await.expect("send");
    assert_eq!(
        reply.display_text(),
        "It is pitch dark.",
        "no dialog was started for rejected names"
    );

    registry.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_out_of_save_dir_is_rejected() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");

    let outside = fx.dir.path().join("outside.qzl");
    std::fs::write(&outside, "lit\n").expect("write");
    std::fs::create_dir_all(session.save_dir()).expect("mkdir");
    std::os::unix::fs::symlink(&outside, session.save_dir().join("link.qzl")).expect("symlink");

    let result = saves.restore(&session, "link.qzl").await;
    assert!(matches!(result, Err(AppError::PathEscape(_))), "{result:?}");

    registry.shutdown().await;
}

#[tokio::test]
async fn restore_of_missing_file_is_not_found() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");

    let result = fx.saves().restore(&session, "nope.qzl").await;
    assert!(matches!(result, Err(AppError::NotFound(_))), "{result:?}");

    registry.shutdown().await;
}

#[tokio::test]
async fn list_saves_is_newest_first_and_filtered_by_suffix() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;

    assert!(saves.list_saves(&session).expect("list").is_empty());

    let dir = session.save_dir().to_path_buf();
    std::fs::create_dir_all(&dir).expect("mkdir");
    for name in ["old.qzl", "notes.txt", "new.qzl"] {
        std::fs::write(dir.join(name), "dark\n").expect("write");
        std::thread::sleep(Duration::from_millis(30));
    }
    let old = std::fs::File::options()
        .write(true)
        .open(dir.join("old.qzl"))
        .expect("open");
    old.set_modified(std::time::SystemTime::now() - Duration::from_secs(3600))
        .expect("set mtime");

    let listed = saves.list_saves(&session).expect("list");
    assert_eq!(listed, vec!["new.qzl".to_owned(), "old.qzl".to_owned()]);
}

#[tokio::test]
async fn save_never_replaces_an_existing_file() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");
    session.send("light lamp").await.expect("send");

    std::fs::create_dir_all(session.save_dir()).expect("mkdir");
    let now = Local::now();
    let mut taken = Vec::new();
    for offset in 0..4 {
        let name = saves.save_file_name(now + chrono::Duration::seconds(offset));
        std::fs::write(session.save_dir().join(&name), "old\n").expect("write");
        taken.push(name);
    }

    let file = saves.save(&session).await.expect("save");
    assert!(!taken.contains(&file.file_name), "{} reused", file.file_name);
    assert_eq!(
        std::fs::read_to_string(&file.path).expect("read").trim(),
        "lit"
    );
    for name in &taken {
        let old = std::fs::read_to_string(session.save_dir().join(name)).expect("read");
        assert_eq!(old.trim(), "old", "{name} left untouched");
    }

    let reply = session.send("look").await.expect("send");
    assert!(reply.text.contains("A lit room."), "dialog fully consumed");

    registry.shutdown().await;
}

#[tokio::test]
async fn saves_within_one_second_get_distinct_names() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");

    let first = saves.save(&session).await.expect("first save");
    session.send("light lamp").await.expect("send");
    let second = saves.save(&session).await.expect("second save");

    assert_ne!(first.file_name, second.file_name);
    assert_eq!(std::fs::read_to_string(&first.path).expect("read").trim(), "dark");
    assert_eq!(std::fs::read_to_string(&second.path).expect("read").trim(), "lit");
    assert_eq!(saves.list_saves(&session).expect("list").len(), 2);

    registry.shutdown().await;
}

#[test]
fn unused_save_file_name_counts_up_within_a_second() {
    let dir = tempfile::tempdir().expect("tempdir");
    let saves = SaveProtocol::from_config(&SaveConfig::default()).expect("protocol");
    let now = Local::now();
    let base = saves.save_file_name(now);
    let stem = base.strip_suffix(".qzl").expect("suffix");

    assert_eq!(saves.unused_save_file_name(dir.path(), now), base);
    std::fs::write(dir.path().join(&base), "x").expect("write");
    assert_eq!(saves.unused_save_file_name(dir.path(), now), format!("{stem}-2.qzl"));
    std::fs::write(dir.path().join(format!("{stem}-2.qzl")), "x").expect("write");
    assert_eq!(saves.unused_save_file_name(dir.path(), now), format!("{stem}-3.qzl"));
}

#[tokio::test]
async fn unacknowledged_save_is_save_error() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let matcher = AckMatcher::new(&["saved".to_owned()], &["failed".to_owned()], "overwrite")
        .expect("matcher");
    let saves = SaveProtocol::new(matcher, ".qzl");
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");

    let result = saves.save(&session).await;
    assert!(matches!(result, Err(AppError::Save(_))), "{result:?}");

    registry.shutdown().await;
}

#[tokio::test]
async fn restore_with_inner_parent_segment_never_reaches_interpreter() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");
    session.send("light lamp").await.expect("send");
    let file = saves.save(&session).await.expect("save");
    std::fs::create_dir_all(session.save_dir().join("sub")).expect("mkdir");
    session.select_story(fx.cave()).await.expect("restart");

    let name = format!("sub/../{}", file.file_name);
    let result = saves.restore(&session, &name).await;
    assert!(matches!(result, Err(AppError::PathEscape(_))), "{result:?}");

    let reply = session.send("look").await.expect("send");
    assert_eq!(reply.display_text(), "It is pitch dark.", "state not restored");

    registry.shutdown().await;
}

#[tokio::test]
async fn save_after_crash_is_session_dead() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");
    session.send("crash").await.expect("reply");

    assert!(matches!(saves.save(&session).await, Err(AppError::SessionDead(_))));
}

#[tokio::test]
async fn late_output_does_not_confuse_the_dialog() {
    let fx = Fixture::new();
    let registry = fx.registry(1);
    let saves = fx.saves();
    let session = registry.get_or_create(&SessionKey::new("1")).await;
    session.select_story(fx.cave()).await.expect("select");

    session.send("gap").await.expect("send");
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let file = saves.save(&session).await.expect("save");
    assert!(file.path.exists());

    registry.shutdown().await;
}
