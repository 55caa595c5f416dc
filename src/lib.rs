pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod payments;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::handlers::AppServices;
use crate::payments::PaymentGateway;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.staged_order_ttl_secs,
        );
        Self {
            db,
            config,
            event_sender,
            services,
            gateway,
        }
    }
}
