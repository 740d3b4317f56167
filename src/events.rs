//! Events forwarded to the GUI layer and the host seam that receives them.

use agent_bridge::TurnId;
use serde::Serialize;
use serde_json::Value;

/// One UI-facing event. Every turn ends with exactly one of `Done`,
/// `Cancelled`, or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    ChunkDelta {
        delta: String,
    },
    ToolStart {
        tool_call_id: String,
        name: String,
        input: Value,
    },
    ToolEnd {
        tool_call_id: String,
        name: String,
        output: Value,
    },
    /// Tool output mirrored to the GUI console panel.
    ConsoleOutput {
        name: String,
        text: String,
    },
    Done {
        content: String,
    },
    Cancelled,
    Error {
        error: String,
    },
}

impl UiEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Cancelled | Self::Error { .. })
    }
}

/// GUI-side collaborator of the stream controller.
///
/// Both methods are called from the thread running the turn and must not
/// block on that turn's completion.
pub trait GuiHost: Send + Sync {
    fn emit(&self, turn_id: TurnId, event: UiEvent);

    /// Asks the GUI to supply a credential via `StreamController::set_credential`.
    fn request_credential(&self);
}

/// Extracts console text from a tool's output: a plain string, or the
/// `content` / `kwargs.content` string of an object.
#[must_use]
pub fn console_text(output: &Value) -> Option<String> {
    match output {
        Value::String(text) => Some(text.clone()),
        Value::Object(object) => object
            .get("content")
            .and_then(Value::as_str)
            .or_else(|| {
                object
                    .get("kwargs")
                    .and_then(|kwargs| kwargs.get("content"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string),
        _ => None,
    }
}

/// Tool whose successful output is reformatted for the console.
pub const COMPILE_TOOL: &str = "compileSketch";

/// Console text for `tool_name`. Successful compiles that embed a JSON
/// `compiler_out` report are rendered like a manual compilation.
#[must_use]
pub fn console_text_for(tool_name: &str, output: &Value) -> Option<String> {
    let text = console_text(output)?;
    if tool_name == COMPILE_TOOL && text.to_lowercase().contains("successful.") {
        if let Some(formatted) = format_compile_output(&text) {
            return Some(formatted);
        }
        tracing::debug!("compile output carried no compiler report, mirroring it raw");
    }
    Some(text)
}

/// Reads the report in `... Output: {json} Errors ...` and formats its
/// `compiler_out`.
fn format_compile_output(text: &str) -> Option<String> {
    let after_label = &text[text.find("Output:")? + "Output:".len()..];
    let report_start = after_label.len() - after_label.trim_start().len();
    let candidate = &after_label[report_start..];
    if !candidate.starts_with('{') {
        return None;
    }

    // The report ends at the first `}` followed by `Errors`.
    let report_end = candidate
        .match_indices('}')
        .map(|(index, _)| index + 1)
        .find(|&end| candidate[end..].trim_start().starts_with("Errors"))?;
    let report: Value = serde_json::from_str(&candidate[..report_end]).ok()?;
    let compiler_out = report.get("compiler_out")?.as_str()?;

    Some(format!(
        "Compiling sketch...\n\nCompilation successful!\n\nCompiler Output:\n{}",
        compiler_out.trim()
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ui_events_serialize_with_type_tag() {
        assert_eq!(
            serde_json::to_value(UiEvent::ChunkDelta {
                delta: "hi".to_string()
            })
            .expect("serializable"),
            json!({ "type": "chunk_delta", "delta": "hi" })
        );
        assert_eq!(
            serde_json::to_value(UiEvent::Cancelled).expect("serializable"),
            json!({ "type": "cancelled" })
        );
        assert_eq!(
            serde_json::to_value(UiEvent::Error {
                error: "boom".to_string()
            })
            .expect("serializable"),
            json!({ "type": "error", "error": "boom" })
        );
    }

    #[test]
    fn only_done_cancelled_and_error_are_terminal() {
        assert!(UiEvent::Cancelled.is_terminal());
        assert!(UiEvent::Done {
            content: String::new()
        }
        .is_terminal());
        assert!(!UiEvent::ConsoleOutput {
            name: "compileSketch".to_string(),
            text: String::new()
        }
        .is_terminal());
    }

    #[test]
    fn console_text_reads_strings_and_message_objects() {
        assert_eq!(console_text(&json!("done")), Some("done".to_string()));
        assert_eq!(
            console_text(&json!({ "content": "from content" })),
            Some("from content".to_string())
        );
        assert_eq!(
            console_text(&json!({ "kwargs": { "content": "from kwargs" } })),
            Some("from kwargs".to_string())
        );
        assert_eq!(console_text(&json!({ "content": 42 })), None);
        assert_eq!(console_text(&json!(null)), None);
    }

    #[test]
    fn successful_compile_report_is_formatted() {
        let output = json!(
            "Compilation successful. Output: {\"compiler_out\": \"Sketch uses 924 bytes.\\n\", \
             \"compiler_err\": \"\"} Errors: none"
        );

        assert_eq!(
            console_text_for(COMPILE_TOOL, &output).as_deref(),
            Some(
                "Compiling sketch...\n\nCompilation successful!\n\n\
                 Compiler Output:\nSketch uses 924 bytes."
            )
        );
    }

    #[test]
    fn compile_output_without_report_is_mirrored_raw() {
        let failed = json!("Compilation failed. Output: {\"compiler_out\": \"x\"} Errors: 1");
        let unreported = json!("Compilation successful.");
        let malformed = json!("Compilation successful. Output: {not json} Errors: none");

        assert_eq!(
            console_text_for(COMPILE_TOOL, &failed).as_deref(),
            Some("Compilation failed. Output: {\"compiler_out\": \"x\"} Errors: 1")
        );
        assert_eq!(
            console_text_for(COMPILE_TOOL, &unreported).as_deref(),
            Some("Compilation successful.")
        );
        assert_eq!(
            console_text_for(COMPILE_TOOL, &malformed).as_deref(),
            Some("Compilation successful. Output: {not json} Errors: none")
        );
    }

    #[test]
    fn other_tools_are_never_reformatted() {
        let output = json!("Upload successful. Output: {\"compiler_out\": \"x\"} Errors: none");

        assert_eq!(console_text_for("uploadSketch", &output).as_deref(), output.as_str());
    }
}
