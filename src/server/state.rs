use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::lifecycle::TemplateManager;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub manager: Arc<TemplateManager>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, manager: TemplateManager) -> Self {
        Self {
            settings: Arc::new(settings),
            manager: Arc::new(manager),
            start_time: Instant::now(),
        }
    }
}
