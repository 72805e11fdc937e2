use super::*;
use std::collections::BTreeMap;

use shared::protocol::{
    AnalysisData, Navigate, Question, QuestionIndex, ScrollCommand, ScrollDirection, SessionData,
    SpeakCommand, TranscriptionResult,
};

fn session(count: usize) -> SessionData {
    SessionData {
        topic: "React js".into(),
        difficulty: "Medium".into(),
        questions: (0..count)
            .map(|i| Question {
                question: format!("question {i}"),
                answer: format!("answer {i}"),
            })
            .collect(),
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<(Message, bool)> {
    let mut delivered = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ServerEvent::Delivery { message, replayed } = event {
            delivered.push((message, replayed));
        }
    }
    delivered
}

fn index(i: usize) -> Message {
    Message::QuestionIndex(QuestionIndex { index: i })
}

#[test]
fn attach_announces_instance_and_launches() {
    let mut coordinator = Coordinator::new();
    let mut attachment = coordinator.attach(EndpointId::Display);

    assert_eq!(
        attachment.events.try_recv().expect("attached event"),
        ServerEvent::Attached {
            endpoint: EndpointId::Display,
            instance_id: attachment.instance_id,
        }
    );
    let status = coordinator.status();
    assert_eq!(
        status.endpoints[0].state,
        Some(shared::domain::EndpointState::Launching)
    );
}

#[test]
fn queued_messages_flush_in_send_order() {
    let mut coordinator = Coordinator::new();
    let mut display = coordinator.attach(EndpointId::Display);

    for i in 0..3 {
        let outcome = coordinator.send(EndpointId::Display, index(i));
        assert!(outcome.is_queued());
    }
    assert!(drain(&mut display.events).is_empty());

    assert_eq!(
        coordinator.register_ready(display.instance_id),
        ReadyOutcome::Flushed {
            replayed: 0,
            flushed: 3
        }
    );
    let delivered: Vec<_> = drain(&mut display.events)
        .into_iter()
        .map(|(message, _)| message)
        .collect();
    assert_eq!(delivered, vec![index(0), index(1), index(2)]);
}

#[test]
fn flushed_backlog_precedes_new_messages() {
    let mut coordinator = Coordinator::new();
    let mut display = coordinator.attach(EndpointId::Display);
    coordinator.send(
        EndpointId::Display,
        Message::Scroll(ScrollCommand {
            direction: ScrollDirection::Down,
        }),
    );
    coordinator.register_ready(display.instance_id);
    assert_eq!(
        coordinator.send(
            EndpointId::Display,
            Message::Scroll(ScrollCommand {
                direction: ScrollDirection::Up,
            }),
        ),
        SendOutcome::Delivered
    );

    let directions: Vec<_> = drain(&mut display.events)
        .into_iter()
        .map(|(message, _)| match message {
            Message::Scroll(cmd) => cmd.direction,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(directions, vec![ScrollDirection::Down, ScrollDirection::Up]);
}

#[test]
fn register_ready_is_idempotent() {
    let mut coordinator = Coordinator::new();
    let mut display = coordinator.attach(EndpointId::Display);
    coordinator.send(EndpointId::Display, index(1));

    coordinator.register_ready(display.instance_id);
    assert_eq!(
        coordinator.register_ready(display.instance_id),
        ReadyOutcome::AlreadyReady
    );
    assert_eq!(drain(&mut display.events).len(), 1);
}

#[test]
fn session_sent_while_launching_arrives_exactly_once() {
    let mut coordinator = Coordinator::new();
    let mut display = coordinator.attach(EndpointId::Display);

    let outcome = coordinator.send(EndpointId::Display, Message::SessionStart(session(3)));
    assert_eq!(outcome, SendOutcome::Queued);

    coordinator.register_ready(display.instance_id);
    let delivered = drain(&mut display.events);
    assert_eq!(delivered.len(), 1);
    match &delivered[0] {
        (Message::SessionStart(received), false) => assert_eq!(received.questions.len(), 3),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn reloaded_endpoint_receives_cached_session_on_first_ready() {
    let mut coordinator = Coordinator::new();
    let first = coordinator.attach(EndpointId::Display);
    coordinator.register_ready(first.instance_id);
    coordinator.send(EndpointId::Display, Message::SessionStart(session(3)));
    coordinator.send(EndpointId::Display, index(2));
    coordinator.send(
        EndpointId::Display,
        Message::Navigate(Navigate {
            path: "/interview-practice".into(),
        }),
    );

    // Page reload: new instance, the old one is replaced.
    let mut second = coordinator.attach(EndpointId::Display);
    assert!(!coordinator.close(first.instance_id));
    assert_eq!(
        coordinator.register_ready(second.instance_id),
        ReadyOutcome::Flushed {
            replayed: 2,
            flushed: 0
        }
    );

    let delivered = drain(&mut second.events);
    assert_eq!(delivered.len(), 2);
    assert!(matches!(delivered[0], (Message::SessionStart(_), true)));
    assert_eq!(delivered[1], (index(2), true));
}

fn analysis() -> AnalysisData {
    AnalysisData {
        analysis_results: BTreeMap::new(),
        overall_analysis: Some(serde_json::json!({ "summary": "steady" })),
        overall_score: 7.5,
        topic: "React js".into(),
        difficulty: "Medium".into(),
    }
}

#[test]
fn late_joiner_receives_transcriptions_and_analysis_on_first_ready() {
    let mut coordinator = Coordinator::new();
    coordinator.send(EndpointId::Display, Message::SessionStart(session(3)));
    coordinator.send(EndpointId::Display, index(1));
    coordinator.send(
        EndpointId::Display,
        Message::TranscriptionResult(TranscriptionResult::text(0, "props flow down")),
    );
    coordinator.send(EndpointId::Display, Message::AnalysisData(analysis()));

    let mut display = coordinator.attach(EndpointId::Display);
    assert_eq!(
        coordinator.register_ready(display.instance_id),
        ReadyOutcome::Flushed {
            replayed: 4,
            flushed: 0
        }
    );

    let delivered = drain(&mut display.events);
    let channels: Vec<_> = delivered
        .iter()
        .map(|(message, _)| message.channel().name())
        .collect();
    assert_eq!(
        channels,
        vec![
            "session-start",
            "question-index",
            "transcription-result",
            "analysis-data"
        ]
    );
    assert!(delivered.iter().all(|(_, replayed)| *replayed));
}

#[test]
fn cached_state_also_queued_is_delivered_once() {
    let mut coordinator = Coordinator::new();
    coordinator.send(EndpointId::Display, Message::SessionStart(session(3)));
    let mut display = coordinator.attach(EndpointId::Display);
    let transcript = Message::TranscriptionResult(TranscriptionResult::text(2, "keys matter"));
    coordinator.send(EndpointId::Display, transcript.clone());

    assert_eq!(
        coordinator.register_ready(display.instance_id),
        ReadyOutcome::Flushed {
            replayed: 1,
            flushed: 1
        }
    );
    let delivered = drain(&mut display.events);
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1], (transcript, false));
}

#[test]
fn restarting_identical_session_clears_cached_progress() {
    let mut coordinator = Coordinator::new();
    coordinator.send(EndpointId::Display, Message::SessionStart(session(3)));
    coordinator.send(
        EndpointId::Display,
        Message::TranscriptionResult(TranscriptionResult::text(0, "state lifts up")),
    );
    coordinator.send(EndpointId::Display, Message::AnalysisData(analysis()));

    coordinator.send(EndpointId::Display, Message::SessionStart(session(3)));

    let summary = coordinator.status().cache;
    assert_eq!(summary.question_count, 3);
    assert_eq!(summary.transcriptions, 0);
    assert!(!summary.has_analysis);

    let mut display = coordinator.attach(EndpointId::Display);
    coordinator.register_ready(display.instance_id);
    let channels: Vec<_> = drain(&mut display.events)
        .into_iter()
        .map(|(message, _)| message.channel().name())
        .collect();
    assert_eq!(channels, vec!["session-start"]);
}

#[test]
fn cached_session_replays_ahead_of_queued_commands() {
    let mut coordinator = Coordinator::new();
    coordinator.send(EndpointId::Display, Message::SessionStart(session(2)));

    let mut display = coordinator.attach(EndpointId::Display);
    coordinator.send(
        EndpointId::Display,
        Message::Speak(SpeakCommand {
            index: 0,
            text: "question 0".into(),
        }),
    );
    coordinator.register_ready(display.instance_id);

    let channels: Vec<_> = drain(&mut display.events)
        .into_iter()
        .map(|(message, _)| message.channel().name())
        .collect();
    assert_eq!(channels, vec!["session-start", "speak"]);
}

#[test]
fn resend_with_empty_cache_is_a_no_op() {
    let mut coordinator = Coordinator::new();
    let mut display = coordinator.attach(EndpointId::Display);
    coordinator.register_ready(display.instance_id);

    assert_eq!(coordinator.request_resend(display.instance_id), 0);
    assert!(drain(&mut display.events).is_empty());
}

#[test]
fn resend_replays_state_but_never_commands() {
    let mut coordinator = Coordinator::new();
    let mut controller = coordinator.attach(EndpointId::Controller);
    coordinator.register_ready(controller.instance_id);

    coordinator.send(EndpointId::Controller, Message::SessionStart(session(3)));
    coordinator.send(
        EndpointId::Controller,
        Message::TranscriptionResult(TranscriptionResult::text(2, "useEffect runs after render")),
    );
    coordinator.send(
        EndpointId::Controller,
        Message::Navigate(Navigate {
            path: "/review-answers".into(),
        }),
    );
    drain(&mut controller.events);

    assert_eq!(coordinator.request_resend(controller.instance_id), 2);
    let resent = drain(&mut controller.events);
    assert!(resent.iter().all(|(message, replayed)| {
        *replayed && message.channel().is_state()
    }));
}

#[test]
fn resend_before_ready_is_ignored() {
    let mut coordinator = Coordinator::new();
    coordinator.send(EndpointId::Display, Message::SessionStart(session(1)));
    let mut display = coordinator.attach(EndpointId::Display);

    assert_eq!(coordinator.request_resend(display.instance_id), 0);
    assert!(drain(&mut display.events).is_empty());
}

#[test]
fn invalid_payload_is_dropped_without_touching_cache() {
    let mut coordinator = Coordinator::new();
    let outcome = coordinator.send(EndpointId::Display, Message::SessionStart(session(0)));
    assert!(matches!(outcome, SendOutcome::Rejected(InvalidPayload::EmptySession)));
    assert!(coordinator.cache().is_empty());
}

#[test]
fn commands_without_live_instance_are_dropped_but_state_is_cached() {
    let mut coordinator = Coordinator::new();
    assert_eq!(
        coordinator.send(
            EndpointId::Display,
            Message::Speak(SpeakCommand {
                index: 0,
                text: "hello".into()
            })
        ),
        SendOutcome::NoEndpoint
    );
    assert_eq!(
        coordinator.send(EndpointId::Display, Message::SessionStart(session(2))),
        SendOutcome::NoEndpoint
    );
    assert_eq!(coordinator.status().cache.question_count, 2);
}

#[test]
fn closed_instance_discards_queue_and_cannot_become_ready() {
    let mut coordinator = Coordinator::new();
    let display = coordinator.attach(EndpointId::Display);
    coordinator.send(EndpointId::Display, index(1));

    assert!(coordinator.close(display.instance_id));
    assert_eq!(
        coordinator.register_ready(display.instance_id),
        ReadyOutcome::UnknownInstance
    );
    assert_eq!(coordinator.status().endpoints[0].instance_id, None);
    assert_eq!(coordinator.cache().question_index(), Some(1));
}

#[test]
fn dropped_receiver_evicts_instance_on_delivery() {
    let mut coordinator = Coordinator::new();
    let display = coordinator.attach(EndpointId::Display);
    coordinator.register_ready(display.instance_id);
    drop(display.events);

    assert_eq!(
        coordinator.send(EndpointId::Display, index(0)),
        SendOutcome::NoEndpoint
    );
    assert_eq!(coordinator.status().endpoints[0].state, None);
}

#[test]
fn transcription_before_index_is_retained() {
    let mut coordinator = Coordinator::new();
    coordinator.send(EndpointId::Display, Message::SessionStart(session(3)));
    coordinator.send(
        EndpointId::Display,
        Message::TranscriptionResult(TranscriptionResult::text(2, "third answer")),
    );
    coordinator.send(EndpointId::Display, index(2));

    assert_eq!(
        coordinator
            .cache()
            .transcription(2)
            .and_then(|t| t.text.as_deref()),
        Some("third answer")
    );
}
