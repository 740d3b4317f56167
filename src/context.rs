//! Context preamble prepended to the user turn handed to the bridge.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use agent_bridge::ChatMessage;

pub const UNREADABLE_SKETCH: &str = "// Unable to read sketch file content.";

/// Board and port selection owned by the controller and set by the GUI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelection {
    pub board_fqbn: Option<String>,
    pub board_options: BTreeMap<String, String>,
    pub port: Option<String>,
}

impl TargetSelection {
    /// `vendor:arch:board[:key=value,...]`, or `None` without a board.
    #[must_use]
    pub fn full_fqbn(&self) -> Option<String> {
        let base = self.board_fqbn.as_deref().map(str::trim)?;
        if base.is_empty() {
            return None;
        }
        if self.board_options.is_empty() {
            return Some(base.to_string());
        }

        let options = self
            .board_options
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        Some(format!("{base}:{options}"))
    }
}

/// Sketch text shown to the model: the checkpoint snapshot, else the live
/// artifact, else a placeholder comment.
#[must_use]
pub fn sketch_content(checkpoint: Option<&Path>, artifact: Option<&Path>) -> String {
    let source = checkpoint
        .filter(|path| path.is_file())
        .or_else(|| artifact.filter(|path| path.is_file()));
    let Some(source) = source else {
        tracing::warn!("no readable sketch for context");
        return UNREADABLE_SKETCH.to_string();
    };

    match fs::read_to_string(source) {
        Ok(content) => content,
        Err(error) => {
            tracing::error!(path = %source.display(), %error, "cannot read sketch for context");
            format!("// Error reading sketch file: {error}")
        }
    }
}

#[must_use]
pub fn context_preamble(
    project_dir: &Path,
    artifact: Option<&Path>,
    selection: &TargetSelection,
    sketch: &str,
) -> String {
    let mut preamble = String::from("CONTEXT:\n");
    preamble.push_str(&format!("- Project Path: {}\n", project_dir.display()));
    match artifact {
        Some(artifact) => preamble.push_str(&format!("- Sketch Path: {}\n", artifact.display())),
        None => preamble.push_str("- Sketch Path: Not Found\n"),
    }
    if let Some(fqbn) = selection.full_fqbn() {
        if selection.board_options.is_empty() {
            preamble.push_str(&format!("- Selected Board FQBN (base): {fqbn}\n"));
        } else {
            preamble.push_str(&format!("- Selected Board FQBN (with options): {fqbn}\n"));
        }
    }
    if let Some(port) = selection.port.as_deref().filter(|port| !port.trim().is_empty()) {
        preamble.push_str(&format!("- Selected Port: {port}\n"));
    }
    preamble.push_str(&format!(
        "- Current Sketch Content:\n\"\"\"cpp\n{sketch}\n\"\"\"\n\nUSER QUERY:\n"
    ));
    preamble
}

/// Copy of a user message with `preamble` prepended to its text. Other roles
/// are returned unchanged.
#[must_use]
pub fn with_preamble(message: &ChatMessage, preamble: &str) -> ChatMessage {
    match message {
        ChatMessage::User(user) => {
            let mut user = user.clone();
            user.content = format!("{preamble}{}", user.content);
            ChatMessage::User(user)
        }
        other => other.clone(),
    }
}
