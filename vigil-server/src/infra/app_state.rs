use std::{fmt, sync::Arc};

use vigil_core::ScanStore;

use crate::infra::bus::{EventTransport, ScanEventBus};
use crate::infra::config::Config;
use crate::websocket::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ScanStore>,
    pub bus: Arc<ScanEventBus>,
    pub transport: Arc<dyn EventTransport>,
    pub websocket_manager: Arc<ConnectionManager>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
