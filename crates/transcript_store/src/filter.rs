use agent_bridge::ChatMessage;

/// Derives the replayable transcript from a full one in a single forward scan.
///
/// A tool message is kept only when the most recently kept message is an
/// assistant message declaring the tool call's id. Every other message passes
/// through unchanged.
#[must_use]
pub fn filter_replayable(full: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut kept: Vec<ChatMessage> = Vec::with_capacity(full.len());

    for message in full {
        if let ChatMessage::Tool(tool) = message {
            let adjacent = kept
                .last()
                .is_some_and(|previous| previous.declares_tool_call(&tool.tool_call_id));
            if !adjacent {
                tracing::debug!(
                    tool_call_id = %tool.tool_call_id,
                    "dropping unpaired tool message from replayable transcript"
                );
                continue;
            }
        }
        kept.push(message.clone());
    }

    kept
}
