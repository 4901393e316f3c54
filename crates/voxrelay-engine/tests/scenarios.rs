// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end engine scenarios over mock collaborators.

use std::path::{Path, PathBuf};
use std::time::Duration;

use voxrelay_core::SettingsStore;
use voxrelay_core::error::RelayError;
use voxrelay_core::types::{
    AssistantId, ChatId, MediaSource, PlaybackItem, SpeedFactor, StatusTemplate, StatusUpdate,
    StreamKind, TimeWindow, TransportEvent,
};
use voxrelay_engine::session::{CallState, EnqueueOutcome, SkipOutcome, StreamEndOutcome};
use voxrelay_engine::shutdown::drain_sessions;
use voxrelay_test_utils::{ResolverScript, ScriptedFailure, TestHarness};

fn harness() -> TestHarness {
    TestHarness::builder().build().unwrap()
}

/// Polls `check` every 10ms for up to five seconds.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn downloaded(chat: ChatId, id: &str) -> PlaybackItem {
    PlaybackItem::new(
        MediaSource::DownloadResolve(id.to_string()),
        id,
        "tester",
        chat,
        StreamKind::Audio,
        120,
    )
}

// --- join / advance / leave ---

#[tokio::test]
async fn single_item_plays_out_and_leaves() {
    let h = harness();
    let chat = ChatId(42);
    let a = h.item(chat, "a");
    h.engine.enqueue(chat, a.clone()).unwrap();

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    assert_eq!(session.state(), CallState::Live { paused: false });
    assert!(h.store.is_active(chat).await);
    assert!(h.store.music_on(chat).await);

    let transport = h.transport_for(chat).await.unwrap();
    let outcome = session.advance_on_stream_end().await;
    assert!(matches!(outcome, StreamEndOutcome::Ended));

    assert_eq!(transport.leave_count(chat).await, 1);
    assert!(!h.store.is_active(chat).await);
    assert!(!h.store.music_on(chat).await);
    assert_eq!(session.state(), CallState::Idle);
    assert!(h.engine.pool().bound(chat).await.is_none());
    assert!(h.engine.queues().is_empty(chat));
}

#[tokio::test]
async fn loop_repeats_head_before_moving_on() {
    let h = harness();
    let chat = ChatId(7);
    let x = h.item(chat, "x");
    let y = h.item(chat, "y");
    h.engine.enqueue(chat, x.clone()).unwrap();
    h.engine.enqueue(chat, y.clone()).unwrap();

    let session = h.session(chat);
    session.join(x.clone(), false).await.unwrap();
    session.set_loop(2).await.unwrap();
    assert_eq!(h.store.stored_loop(chat).await, 2);

    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Repeated(id) if id == x.id
    ));
    assert_eq!(h.store.stored_loop(chat).await, 1);
    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Repeated(id) if id == x.id
    ));
    assert_eq!(h.store.stored_loop(chat).await, 0);
    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Continued(id) if id == y.id
    ));
    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Ended
    ));
    assert_eq!(
        h.notifier.now_playing_titles().await,
        vec!["x".to_string(), "x".to_string(), "y".to_string()]
    );
}

#[tokio::test]
async fn loop_counter_is_seeded_from_store_on_join() {
    let h = harness();
    let chat = ChatId(8);
    h.store.set_loop(chat, 1).await.unwrap();

    let a = h.item(chat, "a");
    let session = h.session(chat);
    session.join(a.clone(), false).await.unwrap();
    assert_eq!(h.engine.queues().loop_count(chat), 1);
    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Repeated(id) if id == a.id
    ));
}

#[tokio::test]
async fn malformed_entries_are_skipped() {
    let h = harness();
    let chat = ChatId(11);
    let a = h.item(chat, "a");
    let broken = PlaybackItem::new(
        MediaSource::LocalFile(PathBuf::new()),
        "broken",
        "tester",
        chat,
        StreamKind::Audio,
        10,
    );
    let b = h.item(chat, "b");
    h.engine.queues().enqueue(chat, a.clone());
    h.engine.queues().enqueue(chat, broken);
    h.engine.queues().enqueue(chat, b.clone());

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Continued(id) if id == b.id
    ));
    assert_eq!(h.engine.queues().len(chat), 1);
}

#[tokio::test]
async fn advance_resets_elapsed_offset() {
    let h = harness();
    let chat = ChatId(12);
    let a = h.item(chat, "a");
    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    session.set_loop(1).await.unwrap();
    h.engine.queues().record_progress(chat, 90).unwrap();

    session.advance_on_stream_end().await;
    assert_eq!(session.current_item().unwrap().played_secs, 0);
    let descriptor = h.transport_for(chat).await.unwrap().last_descriptor(chat).await.unwrap();
    assert_eq!(descriptor.window, None);
}

// --- assistant pool ---

#[tokio::test]
async fn assistant_lookup_is_stable_for_a_chat() {
    let h = harness();
    let chat = ChatId(100);
    let first = h.engine.pool().assistant_for(chat).await.unwrap();
    let second = h.engine.pool().assistant_for(chat).await.unwrap();
    assert_eq!(first.id(), second.id());

    h.session(chat).join(h.item(chat, "a"), false).await.unwrap();
    assert_eq!(h.engine.pool().bound(chat).await.unwrap().id(), first.id());
}

#[tokio::test]
async fn each_assistant_serves_one_chat() {
    let h = TestHarness::builder().with_assistants(2).build().unwrap();
    for n in 1..=2 {
        let chat = ChatId(n);
        h.session(chat).join(h.item(chat, "a"), false).await.unwrap();
    }

    let third = ChatId(3);
    let err = h
        .session(third)
        .join(h.item(third, "a"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::NoAssistantAvailable { chat } if chat == third));
    assert_eq!(h.session(third).state(), CallState::Idle);

    let bindings = h.engine.pool().bindings().await;
    assert_eq!(bindings.len(), 2);
    assert_ne!(bindings[0].1, bindings[1].1);

    h.session(ChatId(1)).stop().await;
    h.session(third).join(h.item(third, "a"), false).await.unwrap();
    assert_eq!(h.engine.pool().bindings().await.len(), 2);
}

#[tokio::test]
async fn unconfigured_identity_never_gets_a_chat() {
    let h = TestHarness::builder()
        .with_assistants(2)
        .with_unconfigured(0)
        .build()
        .unwrap();
    let chat = ChatId(1);
    h.session(chat).join(h.item(chat, "a"), false).await.unwrap();
    assert_eq!(h.engine.pool().bound(chat).await.unwrap().id(), AssistantId(2));
    assert!(h.transports[0].calls().await.is_empty());

    let other = ChatId(2);
    assert!(matches!(
        h.session(other).join(h.item(other, "a"), false).await,
        Err(RelayError::NoAssistantAvailable { .. })
    ));
}

// --- join failures ---

#[tokio::test]
async fn rejected_join_leaves_session_idle() {
    let h = TestHarness::builder().with_assistants(1).build().unwrap();
    let chat = ChatId(5);
    h.transports[0]
        .fail_next_join(ScriptedFailure::NoActiveCallEndpoint)
        .await;

    let session = h.session(chat);
    let err = session.join(h.item(chat, "a"), false).await.unwrap_err();
    assert!(err.is_join_rejection());
    assert_eq!(session.state(), CallState::Idle);
    assert!(h.engine.pool().bound(chat).await.is_none());
    assert!(!h.store.is_active(chat).await);

    session.join(h.item(chat, "a"), false).await.unwrap();
    assert!(session.state().is_live());
}

#[tokio::test]
async fn hung_join_times_out() {
    let h = TestHarness::builder().with_assistants(1).build().unwrap();
    let chat = ChatId(6);
    h.transports[0].fail_next_join(ScriptedFailure::Hang).await;

    let err = h
        .session(chat)
        .join(h.item(chat, "a"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Timeout { .. }));
    assert_eq!(h.session(chat).state(), CallState::Idle);
    assert!(h.engine.pool().bound(chat).await.is_none());
}

#[tokio::test]
async fn join_requires_idle_session() {
    let h = harness();
    let chat = ChatId(9);
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    assert!(matches!(
        session.join(h.item(chat, "b"), false).await,
        Err(RelayError::InvalidState { required: "idle", .. })
    ));
}

#[tokio::test]
async fn store_failures_do_not_block_join() {
    let h = harness();
    h.store.set_failing(true);
    let chat = ChatId(10);
    h.session(chat).join(h.item(chat, "a"), false).await.unwrap();
    assert!(h.session(chat).state().is_live());
}

#[tokio::test]
async fn video_join_marks_video_chat() {
    let h = harness();
    let chat = ChatId(13);
    let session = h.session(chat);
    session.join(h.item(chat, "clip"), true).await.unwrap();

    let descriptor = h.transport_for(chat).await.unwrap().last_descriptor(chat).await.unwrap();
    assert_eq!(descriptor.kind, StreamKind::Video);
    assert!(descriptor.video_quality.is_some());
    assert!(h.store.is_active_video(chat).await);

    session.stop().await;
    assert!(!h.store.is_active_video(chat).await);
}

// --- enqueue_and_continue ---

#[tokio::test]
async fn first_enqueue_starts_the_call() {
    let h = harness();
    let chat = ChatId(20);
    let session = h.session(chat);
    let a = h.item(chat, "a");

    assert_eq!(
        session.enqueue_and_continue(a.clone(), false).await.unwrap(),
        EnqueueOutcome::Started(a.id)
    );
    assert_eq!(
        session
            .enqueue_and_continue(h.item(chat, "b"), false)
            .await
            .unwrap(),
        EnqueueOutcome::Queued { position: 1 }
    );
    assert_eq!(h.engine.queues().len(chat), 2);
}

#[tokio::test]
async fn failed_first_enqueue_clears_queue() {
    let h = TestHarness::builder().with_assistants(1).build().unwrap();
    let chat = ChatId(21);
    h.transports[0]
        .fail_next_join(ScriptedFailure::AlreadyJoined)
        .await;

    let result = h
        .session(chat)
        .enqueue_and_continue(h.item(chat, "a"), false)
        .await;
    assert!(matches!(result, Err(RelayError::AlreadyJoined { .. })));
    assert!(h.engine.queues().is_empty(chat));
}

#[tokio::test]
async fn enqueue_after_failed_join_starts_a_new_call() {
    let h = TestHarness::builder().with_assistants(1).build().unwrap();
    let chat = ChatId(22);
    let session = h.session(chat);
    let a = h.item(chat, "a");
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.transports[0]
        .fail_next_join(ScriptedFailure::NoActiveCallEndpoint)
        .await;

    let err = session.join(a, false).await.unwrap_err();
    assert!(matches!(err, RelayError::NoActiveCallEndpoint { .. }));
    assert!(h.engine.queues().is_empty(chat));

    let b = h.item(chat, "b");
    assert_eq!(
        session.enqueue_and_continue(b.clone(), false).await.unwrap(),
        EnqueueOutcome::Started(b.id)
    );
    assert!(session.state().is_live());
    assert_eq!(session.current_item().unwrap().id, b.id);
    assert_eq!(h.engine.queues().len(chat), 1);
}

#[tokio::test]
async fn enqueue_on_idle_chat_drops_leftover_entries() {
    let h = harness();
    let chat = ChatId(23);
    h.engine.enqueue(chat, h.item(chat, "stale")).unwrap();

    let b = h.item(chat, "b");
    assert_eq!(
        h.session(chat).enqueue_and_continue(b.clone(), false).await.unwrap(),
        EnqueueOutcome::Started(b.id)
    );
    let queued: Vec<_> = h.engine.queues().items(chat).iter().map(|i| i.id).collect();
    assert_eq!(queued, vec![b.id]);
}

// --- stream generations ---

#[tokio::test]
async fn stale_stream_end_is_ignored() {
    let h = harness();
    let chat = ChatId(30);
    let a = h.item(chat, "a");
    let b = h.item(chat, "b");
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, b.clone()).unwrap();

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    let transport = h.transport_for(chat).await.unwrap();
    let generation = transport.last_generation(chat).await.unwrap();

    assert!(matches!(
        session.on_stream_end(generation + 1000).await,
        StreamEndOutcome::Ignored
    ));
    assert!(matches!(
        session.on_stream_end(generation).await,
        StreamEndOutcome::Continued(id) if id == b.id
    ));
    // duplicate delivery of the same event
    assert!(matches!(
        session.on_stream_end(generation).await,
        StreamEndOutcome::Ignored
    ));
    assert_eq!(session.current_item().unwrap().id, b.id);
}

#[tokio::test]
async fn stream_end_on_idle_chat_is_ignored() {
    let h = harness();
    assert!(matches!(
        h.session(ChatId(31)).on_stream_end(1).await,
        StreamEndOutcome::Ignored
    ));
}

// --- resolution and status messages ---

#[tokio::test]
async fn download_is_announced_and_cleaned_up() {
    let h = harness();
    let chat = ChatId(40);
    let a = h.item(chat, "a");
    let b = downloaded(chat, "abc");
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, b.clone()).unwrap();

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Continued(id) if id == b.id
    ));

    let outbox = h.notifier.outbox().await;
    assert!(matches!(&outbox[0], (c, StatusUpdate::Downloading { .. }) if *c == chat));
    assert!(matches!(
        &outbox[1],
        (_, StatusUpdate::NowPlaying { template: StatusTemplate::Stream, .. })
    ));
    assert_eq!(h.notifier.deleted().await.len(), 1);

    let current = session.current_item().unwrap();
    assert_eq!(current.resolved_location.as_deref(), Some("/downloads/abc"));
    assert!(current.status_message.is_some());
    assert_eq!(current.template, Some(StatusTemplate::Stream));
    let descriptor = h.transport_for(chat).await.unwrap().last_descriptor(chat).await.unwrap();
    assert_eq!(descriptor.location, "/downloads/abc");
}

#[tokio::test]
async fn failed_advance_notifies_and_leaves() {
    let h = harness();
    let chat = ChatId(41);
    let a = h.item(chat, "a");
    h.resolver.script("gone", ResolverScript::Unavailable).await;
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, downloaded(chat, "gone")).unwrap();

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    let transport = h.transport_for(chat).await.unwrap();

    let outcome = session.advance_on_stream_end().await;
    assert!(matches!(
        outcome,
        StreamEndOutcome::Failed(RelayError::ResolutionFailed { .. })
    ));
    assert_eq!(session.state(), CallState::Idle);
    assert_eq!(transport.leave_count(chat).await, 1);
    assert!(
        h.notifier
            .outbox()
            .await
            .iter()
            .any(|(_, u)| matches!(u, StatusUpdate::PlaybackFailed { .. }))
    );
}

#[tokio::test]
async fn failed_stream_change_tears_down() {
    let h = TestHarness::builder().with_assistants(1).build().unwrap();
    let chat = ChatId(43);
    let a = h.item(chat, "a");
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, h.item(chat, "b")).unwrap();

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    h.transports[0]
        .fail_next_change(ScriptedFailure::ServerError)
        .await;

    assert!(matches!(
        session.advance_on_stream_end().await,
        StreamEndOutcome::Failed(RelayError::TransportServerError { .. })
    ));
    assert_eq!(session.state(), CallState::Idle);
    assert!(h.engine.queues().is_empty(chat));
}

// --- skip ---

#[tokio::test]
async fn skip_ignores_loop_and_ends_on_empty_queue() {
    let h = harness();
    let chat = ChatId(50);
    let a = h.item(chat, "a");
    let b = h.item(chat, "b");
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, b.clone()).unwrap();

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    session.set_loop(3).await.unwrap();

    assert_eq!(session.skip().await.unwrap(), SkipOutcome::Playing(b.id));
    assert_eq!(h.engine.queues().loop_count(chat), 0);
    assert_eq!(h.store.stored_loop(chat).await, 0);
    assert_eq!(session.skip().await.unwrap(), SkipOutcome::Ended);
    assert_eq!(session.state(), CallState::Idle);
}

#[tokio::test]
async fn skip_surfaces_resolution_errors() {
    let h = harness();
    let chat = ChatId(51);
    let a = h.item(chat, "a");
    h.resolver.script("bad", ResolverScript::Fail).await;
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, downloaded(chat, "bad")).unwrap();

    let session = h.session(chat);
    session.join(a, false).await.unwrap();
    assert!(matches!(
        session.skip().await,
        Err(RelayError::ResolutionFailed { .. })
    ));
    assert_eq!(session.state(), CallState::Idle);
}

// --- pause / resume / seek ---

#[tokio::test]
async fn pause_and_resume_track_music_flag() {
    let h = harness();
    let chat = ChatId(60);
    let session = h.session(chat);

    assert!(matches!(
        session.pause().await,
        Err(RelayError::InvalidState { required: "live", .. })
    ));

    session.join(h.item(chat, "a"), false).await.unwrap();
    session.pause().await.unwrap();
    assert_eq!(session.state(), CallState::Live { paused: true });
    assert!(!h.store.music_on(chat).await);

    session.resume().await.unwrap();
    assert_eq!(session.state(), CallState::Live { paused: false });
    assert!(h.store.music_on(chat).await);
}

#[tokio::test]
async fn seek_restarts_with_window() {
    let h = harness();
    let chat = ChatId(61);
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    let transport = h.transport_for(chat).await.unwrap();

    session.seek(50, 30).await.unwrap();
    let descriptor = transport.last_descriptor(chat).await.unwrap();
    assert_eq!(
        descriptor.window,
        Some(TimeWindow {
            start_secs: 50,
            end_secs: 80
        })
    );
    assert_eq!(descriptor.location, "/media/a.mp3");
    assert_eq!(session.current_item().unwrap().played_secs, 50);

    session.seek(190, 30).await.unwrap();
    assert_eq!(
        transport.last_descriptor(chat).await.unwrap().window,
        Some(TimeWindow {
            start_secs: 190,
            end_secs: 200
        })
    );

    assert!(matches!(
        session.seek(200, 10).await,
        Err(RelayError::SeekOutOfRange {
            offset_secs: 200,
            duration_secs: 200
        })
    ));
}

#[tokio::test]
async fn change_stream_keeps_queue() {
    let h = harness();
    let chat = ChatId(62);
    let a = h.item(chat, "a");
    let session = h.session(chat);
    session.join(a.clone(), false).await.unwrap();

    session.change_stream(h.item(chat, "other")).await.unwrap();
    let descriptor = h.transport_for(chat).await.unwrap().last_descriptor(chat).await.unwrap();
    assert_eq!(descriptor.location, "/media/other.mp3");
    assert_eq!(session.current_item().unwrap().id, a.id);
}

// --- speed ---

#[tokio::test]
async fn speed_change_snapshots_and_restores_timing() {
    let h = harness();
    let chat = ChatId(70);
    h.reencoder.set_duration("/media/a.mp3", 200).await;
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    h.engine.queues().record_progress(chat, 30).unwrap();
    let original = session.current_item().unwrap();

    session
        .speed_change(SpeedFactor::Half, Path::new("/media/a.mp3"))
        .await
        .unwrap();
    let slowed = session.current_item().unwrap();
    assert_eq!(slowed.speed, SpeedFactor::Half);
    assert_eq!(slowed.duration_secs, 400);
    assert_eq!(slowed.played_secs, 60);
    let derived = h
        .engine
        .speed_cache()
        .derived_path(Path::new("/media/a.mp3"), SpeedFactor::Half)
        .unwrap();
    assert!(derived.starts_with(h.cache_root().join("0.5")));
    assert_eq!(slowed.speed_path.as_deref(), Some(derived.as_path()));

    let transport = h.transport_for(chat).await.unwrap();
    let descriptor = transport.last_descriptor(chat).await.unwrap();
    assert_eq!(descriptor.location, derived.display().to_string());
    assert_eq!(
        descriptor.window,
        Some(TimeWindow {
            start_secs: 60,
            end_secs: 400
        })
    );

    session
        .speed_change(SpeedFactor::Normal, Path::new("/media/a.mp3"))
        .await
        .unwrap();
    let restored = session.current_item().unwrap();
    assert_eq!(restored.speed, SpeedFactor::Normal);
    assert_eq!(restored.duration_secs, original.duration_secs);
    assert_eq!(restored.duration_label, original.duration_label);
    assert_eq!(restored.played_secs, 30);
    assert!(restored.speed_path.is_none());
    assert!(restored.pre_speed.is_none());
    assert_eq!(
        transport.last_descriptor(chat).await.unwrap().location,
        "/media/a.mp3"
    );
}

#[tokio::test]
async fn chained_speed_changes_keep_the_first_snapshot() {
    let h = harness();
    let chat = ChatId(71);
    h.reencoder.set_duration("/media/a.mp3", 200).await;
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    h.engine.queues().record_progress(chat, 30).unwrap();

    let path = Path::new("/media/a.mp3");
    session.speed_change(SpeedFactor::Half, path).await.unwrap();
    session.speed_change(SpeedFactor::Double, path).await.unwrap();
    let fast = session.current_item().unwrap();
    assert_eq!(fast.duration_secs, 100);
    assert_eq!(fast.played_secs, 15);
    assert_eq!(fast.pre_speed.as_ref().unwrap().played_secs, 30);

    session.speed_change(SpeedFactor::Normal, path).await.unwrap();
    let restored = session.current_item().unwrap();
    assert_eq!(restored.duration_secs, 200);
    assert_eq!(restored.played_secs, 30);
}

#[tokio::test]
async fn concurrent_speed_requests_share_one_encode() {
    let h = TestHarness::builder().with_assistants(2).build().unwrap();
    h.reencoder.set_delay(Duration::from_millis(50));

    let shared = |chat: ChatId| {
        PlaybackItem::new(
            MediaSource::LocalFile(PathBuf::from("/media/shared.mp3")),
            "shared",
            "tester",
            chat,
            StreamKind::Audio,
            100,
        )
    };
    let sessions = [h.session(ChatId(1)), h.session(ChatId(2))];
    for session in &sessions {
        session.join(shared(session.chat()), false).await.unwrap();
    }

    let tasks: Vec<_> = sessions
        .iter()
        .cloned()
        .map(|session| {
            tokio::spawn(async move {
                session
                    .speed_change(SpeedFactor::Half, Path::new("/media/shared.mp3"))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.reencoder.encode_count(), 1);
    for session in &sessions {
        assert_eq!(session.current_item().unwrap().speed, SpeedFactor::Half);
    }
}

#[tokio::test]
async fn speed_request_for_another_file_is_rejected() {
    let h = harness();
    let chat = ChatId(72);
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();

    assert!(matches!(
        session
            .speed_change(SpeedFactor::Double, Path::new("/media/other.mp3"))
            .await,
        Err(RelayError::AssistantBusy { .. })
    ));
    assert_eq!(h.reencoder.encode_count(), 0);
}

#[tokio::test]
async fn speed_encode_timeout_keeps_current_stream() {
    let h = TestHarness::builder()
        .with_reencode_timeout_secs(1)
        .build()
        .unwrap();
    h.reencoder.set_hang(true);
    let chat = ChatId(73);
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    let transport = h.transport_for(chat).await.unwrap();

    assert!(matches!(
        session
            .speed_change(SpeedFactor::Half, Path::new("/media/a.mp3"))
            .await,
        Err(RelayError::ReencodeTimeout { .. })
    ));
    assert_eq!(transport.change_count(chat).await, 0);
    assert_eq!(session.current_item().unwrap().speed, SpeedFactor::Normal);
    assert!(session.state().is_live());
}

// --- stop / force stop / drain ---

#[tokio::test]
async fn force_stop_leaves_on_every_assistant() {
    let h = harness();
    let chat = ChatId(80);
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();

    assert_eq!(session.force_stop_everywhere().await, 2);
    for transport in &h.transports {
        assert_eq!(transport.leave_count(chat).await, 1);
    }
    assert_eq!(session.state(), CallState::Idle);
    assert!(h.engine.pool().bound(chat).await.is_none());
}

#[tokio::test]
async fn stop_on_idle_chat_is_harmless() {
    let h = harness();
    let session = h.session(ChatId(81));
    session.stop().await;
    assert_eq!(session.state(), CallState::Idle);
}

#[tokio::test]
async fn leave_failure_still_clears_state() {
    let h = TestHarness::builder().with_assistants(1).build().unwrap();
    h.transports[0].fail_leave(true);
    let chat = ChatId(82);
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();

    session.stop().await;
    assert_eq!(session.state(), CallState::Idle);
    assert!(h.engine.pool().bound(chat).await.is_none());
}

#[tokio::test]
async fn drain_leaves_every_live_call() {
    let h = harness();
    for n in 1..=2 {
        let chat = ChatId(n);
        h.session(chat).join(h.item(chat, "a"), false).await.unwrap();
    }
    assert_eq!(h.engine.live_chats(), vec![ChatId(1), ChatId(2)]);

    assert_eq!(drain_sessions(&h.engine, Duration::from_secs(5)).await, 0);
    assert!(h.engine.live_chats().is_empty());
}

// --- auto-end ---

#[tokio::test]
async fn lonely_call_is_left_after_grace() {
    let h = TestHarness::builder().with_grace_secs(1).build().unwrap();
    h.store.set_autoend(true);
    let chat = ChatId(90);
    for transport in &h.transports {
        transport.set_participants(chat, 1).await;
    }

    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    assert!(h.engine.autoend().deadline(chat).is_some());

    let cancel = h.start();
    assert!(eventually(|| session.state() == CallState::Idle).await);
    cancel.cancel();
}

#[tokio::test]
async fn autoend_disabled_never_arms() {
    let h = harness();
    let chat = ChatId(91);
    for transport in &h.transports {
        transport.set_participants(chat, 1).await;
    }
    h.session(chat).join(h.item(chat, "a"), false).await.unwrap();
    assert!(h.engine.autoend().deadline(chat).is_none());
}

#[tokio::test]
async fn returning_listeners_cancel_auto_end_once() {
    let h = harness();
    h.store.set_autoend(true);
    let chat = ChatId(92);
    for transport in &h.transports {
        transport.set_participants(chat, 1).await;
    }
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    assert!(h.engine.autoend().deadline(chat).is_some());

    let cancel = h.start();
    let transport = h.transport_for(chat).await.unwrap();
    transport
        .push_event(TransportEvent::ParticipantsChanged { chat, count: 3 })
        .await;
    assert!(eventually(|| h.engine.autoend().deadline(chat).is_none()).await);

    // armed once per session: dropping back to one listener does not re-arm
    session.on_participants_changed(1).await;
    assert!(h.engine.autoend().deadline(chat).is_none());
    cancel.cancel();
}

// --- event routing ---

#[tokio::test]
async fn router_advances_on_transport_event() {
    let h = harness();
    let chat = ChatId(100);
    let a = h.item(chat, "a");
    let b = h.item(chat, "b");
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, b.clone()).unwrap();
    let session = h.session(chat);
    session.join(a, false).await.unwrap();

    let cancel = h.start();
    let transport = h.transport_for(chat).await.unwrap();
    let generation = transport.last_generation(chat).await.unwrap();
    transport
        .push_event(TransportEvent::StreamEnded { chat, generation })
        .await;

    assert!(eventually(|| session.current_item().map(|i| i.id) == Some(b.id)).await);
    cancel.cancel();
}

#[tokio::test]
async fn router_drops_events_from_unbound_assistant() {
    let h = harness();
    let chat = ChatId(101);
    let a = h.item(chat, "a");
    h.engine.enqueue(chat, a.clone()).unwrap();
    h.engine.enqueue(chat, h.item(chat, "b")).unwrap();
    let session = h.session(chat);
    session.join(a.clone(), false).await.unwrap();

    let bound = h.engine.pool().bound(chat).await.unwrap().id();
    let other = AssistantId(3 - bound.0);
    let generation = h
        .transport_for(chat)
        .await
        .unwrap()
        .last_generation(chat)
        .await
        .unwrap();

    let router = h.engine.router();
    router
        .dispatch(other, TransportEvent::StreamEnded { chat, generation })
        .await;
    assert_eq!(router.active_workers(), 0);
    assert_eq!(session.current_item().unwrap().id, a.id);

    router
        .dispatch(bound, TransportEvent::StreamEnded { chat, generation })
        .await;
    assert!(eventually(|| session.current_item().map(|i| i.id) != Some(a.id)).await);
}

#[tokio::test]
async fn idle_workers_exit() {
    let h = TestHarness::builder().with_worker_idle_secs(1).build().unwrap();
    let chat = ChatId(102);
    let session = h.session(chat);
    session.join(h.item(chat, "a"), false).await.unwrap();
    let bound = h.engine.pool().bound(chat).await.unwrap().id();

    let router = h.engine.router();
    router
        .dispatch(bound, TransportEvent::ParticipantsChanged { chat, count: 4 })
        .await;
    assert_eq!(router.active_workers(), 1);
    assert_eq!(router.tracked_chats(), 1);
    assert!(eventually(|| router.active_workers() == 0).await);
    assert!(eventually(|| router.tracked_chats() == 0).await);
}
