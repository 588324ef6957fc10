use serde::{Deserialize, Serialize};

use crate::map_state::{MapState, RenderedLayer};

// SSE message types pushed to the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Replace everything on the map.
    Init(MapState),
    AddLayer(RenderedLayer),
    Close,
    Heartbeat,
}
