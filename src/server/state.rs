use std::sync::Arc;

use crate::bridge::BrowserSession;
use crate::html_template::PageConfig;

// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub session: BrowserSession,
    pub page: Arc<PageConfig>,
}

impl AppState {
    pub fn new(session: BrowserSession, page: PageConfig) -> Self {
        Self {
            session,
            page: Arc::new(page),
        }
    }
}
