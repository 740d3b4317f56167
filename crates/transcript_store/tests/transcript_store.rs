use std::fs;

use agent_bridge::{
    AssistantMessage, Attachment, ChatMessage, ToolCall, ToolMessage, ToolPhase, UserMessage,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use transcript_store::{
    chat_dir, new_thread_id, TranscriptEntry, TranscriptStore, TranscriptStoreError,
    TranscriptVariant,
};

fn tool_stub(id: &str, phase: ToolPhase) -> ChatMessage {
    ChatMessage::Tool(ToolMessage {
        tool_call_id: id.to_string(),
        content: match phase {
            ToolPhase::Start => "Using tool: compileSketch...".to_string(),
            ToolPhase::End => "Tool compileSketch completed".to_string(),
        },
        tool_name: Some("compileSketch".to_string()),
        phase: Some(phase),
        tool_input: Some("{}".to_string()),
        tool_output: None,
    })
}

fn assistant_calling(id: &str) -> ChatMessage {
    ChatMessage::Assistant(AssistantMessage {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: "compileSketch".to_string(),
            args: json!({}),
        }],
    })
}

#[test]
fn save_persists_full_and_filtered_variants() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    let messages = vec![
        ChatMessage::user("compile please"),
        tool_stub("call-1", ToolPhase::Start),
        tool_stub("call-1", ToolPhase::End),
        ChatMessage::assistant("Compiled."),
    ];

    store.save("thread-1", &messages).expect("save should succeed");

    assert_eq!(store.load_full("thread-1").expect("full should load"), messages);
    assert_eq!(
        store.load_filtered("thread-1").expect("filtered should load"),
        vec![ChatMessage::user("compile please"), ChatMessage::assistant("Compiled.")]
    );
    assert!(chat_dir(temp.path()).join("thread-1.json").is_file());
    assert!(chat_dir(temp.path()).join("thread-1.full.json").is_file());
}

#[test]
fn filtered_variant_keeps_declared_tool_results() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    let messages = vec![
        ChatMessage::user("compile"),
        assistant_calling("call-9"),
        tool_stub("call-9", ToolPhase::End),
    ];

    store.save("t", &messages).expect("save should succeed");

    assert_eq!(
        store
            .load("t", TranscriptVariant::Filtered)
            .expect("filtered should load"),
        messages
    );
}

#[test]
fn missing_thread_loads_empty() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());

    assert!(store.load_full("nobody").expect("load should succeed").is_empty());
    assert!(store.load_filtered("nobody").expect("load should succeed").is_empty());
}

#[test]
fn corrupt_file_loads_empty_and_heals_on_next_save() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    fs::create_dir_all(store.chat_dir()).expect("chat dir should be created");
    fs::write(store.chat_dir().join("t.full.json"), "[{ broken").expect("file should be written");

    assert!(store.load_full("t").expect("load should succeed").is_empty());

    store
        .save("t", &[ChatMessage::user("again")])
        .expect("save should succeed");
    assert_eq!(
        store.load_full("t").expect("load should succeed"),
        vec![ChatMessage::user("again")]
    );
}

#[test]
fn unreadable_entries_are_skipped() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    fs::create_dir_all(store.chat_dir()).expect("chat dir should be created");
    let raw = json!([
        { "role": "user", "content": "first" },
        { "role": "narrator", "content": "unknown role" },
        { "content": "no role" },
        { "role": "assistant", "content": "second" },
    ]);
    fs::write(store.chat_dir().join("t.full.json"), raw.to_string())
        .expect("file should be written");

    assert_eq!(
        store.load_full("t").expect("load should succeed"),
        vec![ChatMessage::user("first"), ChatMessage::assistant("second")]
    );
}

#[test]
fn threads_are_listed_sorted_without_full_duplicates() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    assert!(store.list_threads().expect("list should succeed").is_empty());

    for thread_id in ["beta", "alpha", "gamma"] {
        store
            .save(thread_id, &[ChatMessage::user(thread_id)])
            .expect("save should succeed");
    }

    assert_eq!(
        store.list_threads().expect("list should succeed"),
        vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
    );
}

#[test]
fn delete_thread_removes_both_files() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    store
        .save("t", &[ChatMessage::user("hi")])
        .expect("save should succeed");

    assert!(store.delete_thread("t").expect("delete should succeed"));
    assert!(!store.delete_thread("t").expect("second delete should succeed"));
    assert!(store.list_threads().expect("list should succeed").is_empty());
    assert!(store.load_full("t").expect("load should succeed").is_empty());
}

#[test]
fn path_escaping_thread_ids_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());

    let error = store
        .save("../outside", &[ChatMessage::user("x")])
        .expect_err("escaping id should fail");

    assert!(matches!(error, TranscriptStoreError::InvalidThreadId { .. }));
    assert!(!temp.path().join("outside.json").exists());
    assert!(store.load_full(" ").is_err());
}

#[test]
fn new_thread_ids_are_unique_and_valid() {
    let first = new_thread_id();
    let second = new_thread_id();

    assert_ne!(first, second);
    assert_eq!(first.len(), 36);
    assert!(transcript_store::validate_thread_id(&first).is_ok());
}

#[test]
fn on_disk_field_names_match_transcript_format() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    store
        .save("t", &[tool_stub("call-1", ToolPhase::Start)])
        .expect("save should succeed");

    let raw = fs::read_to_string(store.chat_dir().join("t.full.json"))
        .expect("full transcript should be readable");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid JSON");

    assert_eq!(value[0]["role"], "tool");
    assert_eq!(value[0]["tool_call_id"], "call-1");
    assert_eq!(value[0]["toolName"], "compileSketch");
    assert_eq!(value[0]["toolPhase"], "start");
    assert_eq!(value[0]["toolInput"], "{}");
}

#[test]
fn unrecognized_full_entries_survive_a_resave() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let store = TranscriptStore::for_project(temp.path());
    fs::create_dir_all(store.chat_dir()).expect("chat dir should be created");
    let orphan_tool = json!({ "role": "tool", "content": "Tool uploadSketch completed" });
    let raw = json!([
        {
            "role": "user",
            "content": [
                { "type": "text", "text": "what board is this?" },
                { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } }
            ]
        },
        orphan_tool,
        { "role": "assistant", "content": "An Uno." },
    ]);
    fs::write(store.chat_dir().join("t.full.json"), raw.to_string())
        .expect("file should be written");

    let mut entries = store.load_full_entries("t").expect("entries should load");
    assert_eq!(entries.len(), 3);
    entries.push(TranscriptEntry::from(ChatMessage::user("and the port?")));
    store.save_entries("t", &entries).expect("save should succeed");

    let full_raw = fs::read_to_string(store.chat_dir().join("t.full.json"))
        .expect("full transcript should be readable");
    let rewritten: serde_json::Value = serde_json::from_str(&full_raw).expect("valid JSON");
    assert_eq!(rewritten[0]["content"], "what board is this?");
    assert_eq!(rewritten[0]["attachment"]["data_url"], "data:image/png;base64,AAAA");
    assert_eq!(rewritten[1], orphan_tool);
    assert_eq!(rewritten[2]["content"], "An Uno.");
    assert_eq!(rewritten[3]["content"], "and the port?");

    assert_eq!(
        store.load_filtered("t").expect("filtered should load"),
        vec![
            ChatMessage::User(UserMessage {
                content: "what board is this?".to_string(),
                attachment: Some(Attachment::Image {
                    data_url: "data:image/png;base64,AAAA".to_string(),
                }),
                checkpoint_path: None,
            }),
            ChatMessage::assistant("An Uno."),
            ChatMessage::user("and the port?"),
        ]
    );
}
