//! Voice turn controller integration tests
//!
//! Drives the state machine with scripted capture, chat and playback
//! engines; no audio hardware or network required.

use voice_dots::controller::{CaptureStatus, Event};
use voice_dots::voice::{CaptureEvent, Utterance};
use voice_dots::{ChatFailure, Command, DisplayMode, ErrorKind, TurnState};

mod common;
use common::{Harness, RecordingPlayback, ScriptedChat};

const RESTING: [u32; 4] = [15; 4];

fn notice_kind(h: &Harness) -> Option<ErrorKind> {
    h.controller.view().notice.map(|n| n.kind)
}

#[tokio::test]
async fn test_successful_turn_is_spoken() {
    let mut h = Harness::new(
        ScriptedChat::new().reply("hi there"),
        RecordingPlayback::gated(),
    );

    h.command(Command::Start);
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.capture.starts(), 1);

    h.capture.utter("hello", 1);
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);
    assert_eq!(h.controller.view().transcript, "hello");

    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Speaking);
    assert_eq!(h.controller.view().reply, "hi there");
    assert_eq!(h.chat.prompts(), vec!["hello"]);

    h.playback.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.playback.spoken(), vec!["hi there"]);

    // Transcript survives the turn
    assert_eq!(h.controller.view().transcript, "hello");
    assert!(h.capture.is_active());
}

#[tokio::test]
async fn test_failed_request_returns_to_listening() {
    let mut h = Harness::new(
        ScriptedChat::new().fail(ChatFailure::Transport("connection refused".to_string())),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("hello", 1);
    h.step().await;
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert!(h.controller.view().reply.is_empty());
    assert_eq!(notice_kind(&h), Some(ErrorKind::ChatRequestFailed));
    assert!(h.capture.is_active());
    assert_eq!(h.capture.stops(), 0);
    assert!(h.playback.spoken().is_empty());
}

#[tokio::test]
async fn test_stop_before_any_utterance() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.command(Command::EditTranscript("draft".to_string()));
    h.command(Command::Stop);

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.controller.capture_status(), CaptureStatus::Idle);
    assert!(h.controller.view().transcript.is_empty());
    assert!(!h.controller.view().listening);
    assert_eq!(h.capture.stops(), 1);
}

#[tokio::test]
async fn test_start_without_capture_capability() {
    let mut h = Harness::without_capture(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(!h.controller.has_capture_session());
    assert_eq!(notice_kind(&h), Some(ErrorKind::CaptureUnavailable));
    assert_eq!(h.capture.opens(), 0);

    // Still interactable
    h.command(Command::Start);
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(!h.controller.view().listening);
}

#[tokio::test]
async fn test_listening_flag_tracks_state() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());
    let script = [
        Command::Start,
        Command::Start,
        Command::Stop,
        Command::Stop,
        Command::Start,
        Command::Stop,
        Command::Start,
        Command::Start,
        Command::Stop,
    ];

    for command in script {
        h.command(command);
        let view = h.controller.view();
        let expected = matches!(
            h.controller.state(),
            TurnState::Listening | TurnState::AwaitingReply | TurnState::Speaking
        );
        assert_eq!(view.listening, expected);
        assert_eq!(view.state, h.controller.state());
    }
}

#[tokio::test]
async fn test_capture_session_reused_across_cycles() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    for _ in 0..3 {
        h.command(Command::Start);
        h.command(Command::Stop);
    }

    assert_eq!(h.capture.opens(), 1);
    assert_eq!(h.capture.starts(), 3);
    assert_eq!(h.capture.stops(), 3);
}

#[tokio::test]
async fn test_start_while_listening_is_ignored() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.command(Command::Start);

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.capture.starts(), 1);
    assert!(h.controller.view().notice.is_none());
}

#[tokio::test]
async fn test_stop_while_idle_does_not_touch_capture() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Stop);

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.capture.stops(), 0);
    assert!(!h.controller.has_capture_session());
}

#[tokio::test]
async fn test_indicator_animates_only_while_listening() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());
    assert_eq!(h.controller.view().activity_levels, RESTING);

    h.command(Command::Start);
    h.run_until(|c| c.view().activity_levels != RESTING).await;

    let levels = h.controller.view().activity_levels;
    assert!(levels.iter().all(|l| (15..25).contains(l)));

    h.command(Command::Stop);
    assert_eq!(h.controller.view().activity_levels, RESTING);

    // Frames already queued by the cancelled timer change nothing
    h.controller.handle_event(Event::Frame {
        generation: 1,
        levels: [24; 4],
    });
    assert_eq!(h.controller.view().activity_levels, RESTING);
}

#[tokio::test]
async fn test_frames_from_earlier_session_are_ignored() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.command(Command::Stop);
    h.command(Command::Start);

    h.controller.handle_event(Event::Frame {
        generation: 1,
        levels: [99; 4],
    });
    assert_ne!(h.controller.view().activity_levels, [99; 4]);
}

#[tokio::test]
async fn test_unsolicited_capture_end_forces_idle() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.run_until(|c| c.view().activity_levels != RESTING).await;

    h.capture.end_unsolicited();
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.controller.capture_status(), CaptureStatus::Idle);
    assert!(!h.controller.view().listening);
    assert_eq!(h.controller.view().activity_levels, RESTING);

    // Restartable afterwards on the same engine
    h.command(Command::Start);
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.capture.opens(), 1);
    assert_eq!(h.capture.starts(), 2);
}

#[tokio::test]
async fn test_reply_after_unsolicited_end_is_still_spoken() {
    let mut h = Harness::new(
        ScriptedChat::gated().reply("late answer"),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("hello", 1);
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);

    h.capture.end_unsolicited();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Idle);

    h.chat.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.controller.view().reply, "late answer");

    h.step().await;
    assert_eq!(h.playback.spoken(), vec!["late answer"]);
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(!h.controller.view().listening);
}

#[tokio::test]
async fn test_reply_after_stop_is_still_spoken() {
    let mut h = Harness::new(
        ScriptedChat::gated().reply("answer"),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("question", 1);
    h.step().await;

    h.command(Command::Stop);
    assert!(h.controller.view().transcript.is_empty());

    // The engine acknowledges the stop
    h.step().await;
    assert_eq!(h.capture.stops(), 1);

    h.chat.release();
    h.step().await;
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.controller.view().reply, "answer");
    assert_eq!(h.playback.spoken(), vec!["answer"]);
    assert_eq!(h.capture.stops(), 1);
}

#[tokio::test]
async fn test_unsolicited_capture_end_while_speaking() {
    let mut h = Harness::new(
        ScriptedChat::new().reply("long answer"),
        RecordingPlayback::gated(),
    );

    h.command(Command::Start);
    h.capture.utter("hello", 1);
    h.step().await;
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Speaking);

    h.capture.end_unsolicited();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(!h.controller.view().listening);
    assert_eq!(h.controller.view().activity_levels, RESTING);

    // Playback still runs to completion without reviving the session
    h.playback.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.playback.spoken(), vec!["long answer"]);
    assert_eq!(h.controller.view().reply, "long answer");
}

#[tokio::test]
async fn test_restart_during_request_queues_behind_it() {
    let mut h = Harness::new(
        ScriptedChat::gated().reply("first"),
        RecordingPlayback::gated(),
    );

    h.command(Command::Start);
    h.capture.utter("one", 1);
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);

    h.command(Command::Stop);
    h.step().await;
    h.command(Command::Start);
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.controller.in_flight().map(|t| t.seq), Some(1));

    // The earlier request is still out, so this one waits
    h.capture.utter("two", 2);
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.controller.view().transcript, "two");

    h.chat.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Speaking);
    assert_eq!(h.controller.view().reply, "first");
    assert!(h.controller.in_flight().is_none());

    h.playback.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);
    assert_eq!(
        h.controller.in_flight().map(|t| t.prompt.as_str()),
        Some("two")
    );

    h.chat.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Speaking);
    assert_eq!(h.chat.prompts(), vec!["one", "two"]);
    assert_eq!(h.controller.view().reply, "echo: two");
}

#[tokio::test]
async fn test_utterance_while_idle_is_ignored() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.command(Command::Stop);
    h.step().await;

    h.capture.utter("too late", 1);
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(h.controller.view().transcript.is_empty());
    assert!(h.controller.in_flight().is_none());
}

#[tokio::test]
async fn test_blank_utterance_is_ignored() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.capture.utter("   ", 1);
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert!(h.controller.in_flight().is_none());
    assert!(h.controller.view().transcript.is_empty());
}

#[tokio::test]
async fn test_untrimmed_blank_utterance_is_ignored() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.capture.emit(CaptureEvent::UtteranceFinalized(Utterance {
        text: " \t\n ".to_string(),
        seq: 1,
    }));
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert!(h.controller.in_flight().is_none());
    assert!(h.controller.view().transcript.is_empty());
}

#[tokio::test]
async fn test_blank_reply_is_never_spoken() {
    let mut h = Harness::new(ScriptedChat::new().reply("  \n "), RecordingPlayback::new());

    h.command(Command::Start);
    h.capture.utter("hello", 1);
    h.step().await;
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(notice_kind(&h), Some(ErrorKind::ChatRequestFailed));
    assert!(h.controller.view().reply.is_empty());

    // Nothing was handed to playback
    tokio::task::yield_now().await;
    assert!(h.playback.spoken().is_empty());
}

#[tokio::test]
async fn test_reply_for_unknown_turn_is_discarded() {
    let mut h = Harness::new(
        ScriptedChat::gated().reply("real"),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("hello", 1);
    h.step().await;

    h.controller.handle_event(Event::ChatCompleted {
        seq: 7,
        result: Ok("bogus".to_string()),
    });
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);
    assert!(h.controller.view().reply.is_empty());
    assert_eq!(h.controller.in_flight().map(|t| t.seq), Some(1));

    h.chat.release();
    h.step().await;
    assert_eq!(h.controller.view().reply, "real");
}

#[tokio::test]
async fn test_older_reply_never_replaces_newer() {
    let mut h = Harness::new(
        ScriptedChat::new().reply("newer").reply("older"),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("second", 5);
    h.step().await;
    h.step().await;
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.controller.view().reply, "newer");

    h.capture.utter("first", 3);
    h.step().await;
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.controller.view().reply, "newer");
    assert_eq!(h.playback.spoken(), vec!["newer"]);
}

#[tokio::test]
async fn test_utterance_during_request_waits_for_turn() {
    let mut h = Harness::new(
        ScriptedChat::gated().reply("first").reply("second"),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("one", 1);
    h.step().await;

    h.capture.utter("two", 2);
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);
    assert_eq!(h.controller.view().transcript, "two");
    assert_eq!(h.controller.in_flight().map(|t| t.seq), Some(1));

    h.chat.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Speaking);
    assert_eq!(h.controller.view().reply, "first");

    // Playback ends, the queued utterance goes out
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);
    assert_eq!(
        h.controller.in_flight().map(|t| t.prompt.as_str()),
        Some("two")
    );

    h.chat.release();
    h.step().await;
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.chat.prompts(), vec!["one", "two"]);
    assert_eq!(h.playback.spoken(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_latest_queued_utterance_wins() {
    let mut h = Harness::new(ScriptedChat::gated(), RecordingPlayback::new());

    h.command(Command::Start);
    h.capture.utter("one", 1);
    h.step().await;
    h.capture.utter("two", 2);
    h.step().await;
    h.capture.utter("three", 3);
    h.step().await;

    h.chat.release();
    h.step().await;
    h.step().await;
    assert_eq!(
        h.controller.in_flight().map(|t| t.prompt.as_str()),
        Some("three")
    );

    h.chat.release();
    h.step().await;
    h.step().await;

    assert_eq!(h.chat.prompts(), vec!["one", "three"]);
    assert_eq!(h.playback.spoken(), vec!["echo: one", "echo: three"]);
}

#[tokio::test]
async fn test_utterance_while_speaking_is_sent_after_playback() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::gated());

    h.command(Command::Start);
    h.capture.utter("hello", 1);
    h.step().await;
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Speaking);

    h.capture.utter("again", 2);
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::Speaking);
    assert!(h.controller.in_flight().is_none());

    h.playback.release();
    h.step().await;
    assert_eq!(h.controller.state(), TurnState::AwaitingReply);
    assert_eq!(h.controller.in_flight().map(|t| t.seq), Some(2));
}

#[tokio::test]
async fn test_failure_dispatches_queued_utterance() {
    let mut h = Harness::new(
        ScriptedChat::gated().fail(ChatFailure::BadStatus(502)),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("one", 1);
    h.step().await;
    h.capture.utter("two", 2);
    h.step().await;

    h.chat.release();
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::AwaitingReply);
    assert_eq!(notice_kind(&h), Some(ErrorKind::ChatRequestFailed));
    assert_eq!(h.controller.in_flight().map(|t| t.seq), Some(2));
}

#[tokio::test]
async fn test_stop_drops_queued_utterance() {
    let mut h = Harness::new(
        ScriptedChat::gated().reply("answer"),
        RecordingPlayback::new(),
    );

    h.command(Command::Start);
    h.capture.utter("one", 1);
    h.step().await;
    h.capture.utter("two", 2);
    h.step().await;

    h.command(Command::Stop);
    h.step().await;
    h.command(Command::Start);

    h.chat.release();
    h.step().await;
    h.step().await;

    // Only the in-flight turn completed
    assert_eq!(h.chat.prompts(), vec!["one"]);
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert!(h.controller.in_flight().is_none());
}

#[tokio::test]
async fn test_playback_unavailable_still_shows_reply() {
    let mut h = Harness::new(
        ScriptedChat::new().reply("hi"),
        RecordingPlayback::unavailable(),
    );

    h.command(Command::Start);
    h.capture.utter("hello", 1);
    h.step().await;
    h.step().await;
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(h.controller.view().reply, "hi");
    assert_eq!(notice_kind(&h), Some(ErrorKind::PlaybackUnavailable));
}

#[tokio::test]
async fn test_capture_error_keeps_listening() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.capture.emit(CaptureEvent::CaptureError("no-speech".to_string()));
    h.step().await;

    assert_eq!(h.controller.state(), TurnState::Listening);
    assert_eq!(notice_kind(&h), Some(ErrorKind::CaptureError));

    // A successful start clears the notice
    h.command(Command::Stop);
    h.command(Command::Start);
    assert!(h.controller.view().notice.is_none());
}

#[tokio::test]
async fn test_edit_transcript_does_not_send() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());

    h.command(Command::Start);
    h.command(Command::EditTranscript("typed by hand".to_string()));

    assert_eq!(h.controller.view().transcript, "typed by hand");
    assert_eq!(h.controller.state(), TurnState::Listening);
    assert!(h.controller.in_flight().is_none());
}

#[tokio::test]
async fn test_display_mode_toggles() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());
    assert_eq!(h.controller.view().display_mode, DisplayMode::Dark);

    h.command(Command::ToggleDisplayMode);
    assert_eq!(h.controller.view().display_mode, DisplayMode::Light);

    h.command(Command::ToggleDisplayMode);
    assert_eq!(h.controller.view().display_mode, DisplayMode::Dark);
}

#[tokio::test]
async fn test_capture_events_are_taken_before_queued_commands() {
    let mut h = Harness::new(ScriptedChat::new(), RecordingPlayback::new());
    h.command(Command::Start);

    let handle = h.controller.handle();
    handle.send(Command::ToggleDisplayMode).unwrap();
    h.capture.utter("hello", 1);

    let first = h.controller.next_event().await;
    assert!(matches!(
        first,
        Some(Event::Capture(CaptureEvent::UtteranceFinalized(_)))
    ));
}

#[tokio::test]
async fn test_handle_drives_running_controller() {
    let h = Harness::new(ScriptedChat::new().reply("hi"), RecordingPlayback::new());
    let handle = h.controller.handle();
    let mut views = handle.subscribe();
    let capture = h.capture;
    let playback = h.playback;

    let task = tokio::spawn(h.controller.run());

    handle.send(Command::Start).unwrap();
    views
        .wait_for(|v| v.state == TurnState::Listening)
        .await
        .unwrap();

    capture.utter("hello", 1);
    views
        .wait_for(|v| v.reply == "hi" && v.state == TurnState::Listening)
        .await
        .unwrap();
    assert_eq!(playback.spoken(), vec!["hi"]);
    assert_eq!(handle.view().transcript, "hello");

    task.abort();
}
