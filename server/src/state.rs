//! Shared handler state.

use std::sync::Arc;

use chainrelay_history::ChainHistoryAssembler;
use chainrelay_ws::LiveRelay;

#[derive(Clone)]
pub struct AppState {
    pub relay: LiveRelay,
    pub history: Arc<ChainHistoryAssembler>,
    pub port: u16,
}
