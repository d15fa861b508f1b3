use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Public base URL of the site, used for checkout redirects and the
    /// download links embedded in confirmation emails.
    pub base_url: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    /// Optional: when absent, physical-order dispatch is disabled entirely.
    pub printful_api_key: Option<String>,
    pub resend_api_key: Option<String>,
    /// Sender address for order confirmations.
    pub order_email_from: String,
    /// Studio inbox that receives replies to confirmations.
    pub order_email_reply_to: Option<String>,
    /// Studio inbox that receives a BCC copy of every confirmation.
    pub order_email_bcc: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            base_url,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            printful_api_key: env::var("PRINTFUL_API_KEY").ok(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            order_email_from: env::var("ORDER_EMAIL_FROM")
                .unwrap_or_else(|_| "ordini@studio.local".to_string()),
            order_email_reply_to: env::var("ORDER_EMAIL_REPLY_TO").ok(),
            order_email_bcc: env::var("ORDER_EMAIL_BCC").ok(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
