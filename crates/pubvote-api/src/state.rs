use std::sync::Arc;

use crate::coordinator::Coordinator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub coordinator: Coordinator,
    /// Used to post replies to the platform's `response_url`.
    pub http: reqwest::Client,
}
