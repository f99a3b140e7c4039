mod app;
mod dto;
mod handlers;
mod handlers_v1;

pub use app::build_app;

use std::sync::Arc;

use crate::coordinator::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub api_key: Option<String>,
}
