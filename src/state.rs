use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::email::EmailService;
use crate::error::{AppError, Result};
use crate::fulfillment::PrintfulClient;
use crate::payments::StripeClient;

/// Shared, immutable application state. The system is stateless per request:
/// everything in here is configuration plus connection-pooled clients.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, catalog: Catalog) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            http: reqwest::Client::new(),
        }
    }

    pub fn stripe(&self) -> Result<StripeClient> {
        let secret_key = self
            .config
            .stripe_secret_key
            .clone()
            .ok_or_else(|| AppError::Config("STRIPE_SECRET_KEY".into()))?;
        Ok(StripeClient::new(
            self.http.clone(),
            secret_key,
            self.config.stripe_webhook_secret.clone(),
        ))
    }

    /// None disables fulfillment dispatch entirely.
    pub fn printful(&self) -> Option<PrintfulClient> {
        self.config
            .printful_api_key
            .clone()
            .map(|key| PrintfulClient::new(self.http.clone(), key))
    }

    pub fn email(&self) -> EmailService {
        EmailService::new(
            self.http.clone(),
            self.config.resend_api_key.clone(),
            self.config.order_email_from.clone(),
            self.config.order_email_reply_to.clone(),
            self.config.order_email_bcc.clone(),
        )
    }
}
