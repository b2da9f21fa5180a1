use ams::error::{ErrorKind, HubError};
use ams::hub::{CommunicationHub, SenderRole, SessionStatus, TranscriptOptions};
use serde_json::{Map, Value, json};
use std::thread;

// ─── Helper ───────────────────────────────────────────────────────────

fn meta(pairs: &[(&str, Value)]) -> Option<Map<String, Value>> {
    Some(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

fn open(hub: &CommunicationHub) -> String {
    hub.create_session("Summarize the report", vec!["r1".into(), "w1".into()])
        .expect("session should open")
}

// ============================================================
// Session creation and messages
// ============================================================

#[test]
fn test_create_session_with_no_agents_is_invalid_input() {
    let hub = CommunicationHub::new();
    let err = hub.create_session("task", Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_new_session_has_exactly_the_kickoff() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    let history = hub.get_history(&id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender_role, SenderRole::System);
    assert_eq!(history[0].content, "Session started with task: Summarize the report");
}

#[test]
fn test_sender_role_derivation() {
    let hub = CommunicationHub::new();
    let id = open(&hub);

    let from_agent = hub.send_message(&id, "hello", "r1", "Researcher", None).unwrap();
    let from_system = hub.send_message(&id, "notice", "system", "System", None).unwrap();
    let tagged = hub
        .send_message(&id, "note", "r1", "Researcher", meta(&[("type", json!("system"))]))
        .unwrap();

    assert_eq!(from_agent.sender_role, SenderRole::Agent);
    assert_eq!(from_system.sender_role, SenderRole::System);
    assert_eq!(tagged.sender_role, SenderRole::System);
}

#[test]
fn test_framework_is_taken_from_metadata() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    let msg = hub
        .send_message(&id, "x", "r1", "R", meta(&[("framework", json!("crewai"))]))
        .unwrap();
    assert_eq!(msg.sender_framework.as_deref(), Some("crewai"));
}

#[test]
fn test_history_round_trip_keeps_append_order() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    let sent: Vec<_> = (0..10)
        .map(|i| {
            let sender = if i % 2 == 0 { "r1" } else { "w1" };
            hub.send_message(&id, &format!("message {i}"), sender, sender, None)
                .unwrap()
        })
        .collect();

    let history = hub.get_history(&id).unwrap();
    assert_eq!(history.len(), sent.len() + 1);
    for (stored, original) in history[1..].iter().zip(&sent) {
        assert_eq!(stored.message_id, original.message_id);
        assert_eq!(stored.content, original.content);
        assert_eq!(stored.sender_id, original.sender_id);
    }
}

#[test]
fn test_unknown_session_is_not_found() {
    let hub = CommunicationHub::new();
    assert!(matches!(
        hub.send_message("nope", "x", "a", "A", None),
        Err(HubError::SessionNotFound(_))
    ));
    assert!(matches!(hub.get_history("nope"), Err(HubError::SessionNotFound(_))));
    assert!(matches!(hub.terminate_session("nope"), Err(HubError::SessionNotFound(_))));
}

// ============================================================
// Transcripts
// ============================================================

#[test]
fn test_transcript_excludes_system_and_renders_blocks() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    hub.send_message(&id, "Found three sources.", "r1", "Researcher", meta(&[("framework", json!("llm"))]))
        .unwrap();

    let plain = hub.get_formatted_transcript(&id, &TranscriptOptions::default()).unwrap();
    assert!(plain.starts_with("\n\n### CONVERSATION HISTORY ###\n\n"));
    assert!(plain.contains("## Message from Researcher:\nFound three sources."));
    assert!(!plain.contains("Session started"));

    let tagged = hub
        .get_formatted_transcript(&id, &TranscriptOptions::default().with_framework(true))
        .unwrap();
    assert!(tagged.contains("## Message from Researcher [Framework: llm]:\n"));
}

#[test]
fn test_transcript_truncates_long_messages() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    let long = "x".repeat(120);
    hub.send_message(&id, &long, "r1", "R", None).unwrap();

    let transcript = hub
        .get_formatted_transcript(&id, &TranscriptOptions::default().with_max_chars(50))
        .unwrap();
    let expected = format!("{}...[truncated, 120 chars total]", "x".repeat(50));
    assert!(transcript.contains(&expected));

    // The stored message is untouched.
    assert_eq!(hub.get_history(&id).unwrap()[1].content, long);
}

#[test]
fn test_transcript_keeps_most_recent_messages() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    for i in 0..5 {
        hub.send_message(&id, &format!("turn {i}"), "r1", "R", None).unwrap();
    }
    let transcript = hub
        .get_formatted_transcript(&id, &TranscriptOptions::default().with_max_messages(Some(2)))
        .unwrap();
    assert!(!transcript.contains("turn 2"));
    assert!(transcript.contains("turn 3"));
    assert!(transcript.contains("turn 4"));
}

// ============================================================
// Lifecycle
// ============================================================

#[test]
fn test_terminate_then_list_and_delete() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    hub.terminate_session(&id).unwrap();
    hub.terminate_session(&id).unwrap();

    let info = hub.get_session(&id).unwrap();
    assert_eq!(info.status, SessionStatus::Terminated);
    assert_eq!(info.message_count, 2);
    assert!(hub.list_sessions(false).is_empty());
    assert_eq!(hub.list_sessions(true).len(), 1);

    assert!(hub.delete_session(&id));
    assert!(hub.list_sessions(true).is_empty());
}

#[test]
fn test_session_info_counts_unique_agent_senders() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    hub.send_message(&id, "1", "r1", "R", None).unwrap();
    hub.send_message(&id, "2", "r1", "R", None).unwrap();
    hub.send_message(&id, "3", "w1", "W", None).unwrap();
    assert_eq!(hub.get_session(&id).unwrap().unique_participants, 2);
}

#[test]
fn test_parallel_appends_to_one_session_are_all_kept() {
    let hub = CommunicationHub::new();
    let id = open(&hub);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let hub = hub.clone();
            let id = id.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    hub.send_message(&id, &format!("{t}-{i}"), "r1", "R", None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(hub.get_history(&id).unwrap().len(), 101);
}
