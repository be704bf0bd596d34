use agentdeck_session::SessionManager;
use std::sync::Arc;
use std::time::Duration;

pub const INTERRUPT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub worker_client: reqwest::Client,
    pub ambient_api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, ambient_api_key: Option<String>) -> anyhow::Result<Self> {
        let worker_client = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .build()?;
        Ok(Self {
            sessions,
            worker_client,
            ambient_api_key: ambient_api_key.map(Arc::from),
        })
    }
}
