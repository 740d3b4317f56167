use std::sync::Arc;
use std::time::Duration;

use agent_bridge::{AgentBridge, BridgeInitError};
use agent_bridge_mock::{MockStep, ScriptedBridge, MOCK_BRIDGE_ID};
use serde_json::json;

pub const DEFAULT_BRIDGE_ID: &str = MOCK_BRIDGE_ID;
pub const BRIDGE_ENV_VAR: &str = "EMBEDR_BRIDGE";

const DEMO_TOKEN_DELAY: Duration = Duration::from_millis(40);

pub fn bridge_for_id(bridge_id: &str) -> Result<Arc<dyn AgentBridge>, BridgeInitError> {
    match bridge_id.trim() {
        "" | MOCK_BRIDGE_ID => Ok(Arc::new(
            ScriptedBridge::new(demo_script()).with_token_delay(DEMO_TOKEN_DELAY),
        )),
        unknown => Err(BridgeInitError::new(format!(
            "Unsupported bridge '{unknown}'. Available bridges: {DEFAULT_BRIDGE_ID}"
        ))),
    }
}

/// Compile-and-report exchange replayed by the mock bridge on every turn.
fn demo_script() -> Vec<MockStep> {
    vec![
        MockStep::text("Let me compile the current sketch first.\n"),
        MockStep::tool(
            "compileSketch",
            json!({}),
            json!({ "content": "Sketch uses 924 bytes (2%) of program storage space." }),
        ),
        MockStep::Final(
            "The sketch compiles cleanly and uses 924 bytes of flash. Ready to upload when you are."
                .to_string(),
        ),
    ]
}
