//! Order confirmation emails.
//!
//! Composition is a pure function over the reconciled purchase records; the
//! send step talks to the Resend API. The webhook treats sending as
//! best-effort: a failure is logged, never propagated.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::catalog::Variant;
use crate::error::{AppError, Result};
use crate::payments::{CheckoutSession, InvoiceLinks};
use crate::reconcile::PurchaseRecord;
use crate::util::extract_api_error;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// How long the download links in the email stay valid.
const DOWNLOAD_WINDOW_HOURS: i64 = 24;

/// Escape text for interpolation into the HTML body. Everything that comes
/// from the customer or the catalog goes through here.
pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedEmail {
    pub subject: String,
    pub html: String,
}

/// Build the confirmation message for a reconciled order.
///
/// Branches only on which variants the order contains: digital-only orders
/// get the download block, physical-only the shipping block, mixed orders
/// both.
pub fn compose_order_confirmation(
    records: &[PurchaseRecord],
    session: &CheckoutSession,
    links: &InvoiceLinks,
    base_url: &str,
) -> ComposedEmail {
    let has_digital = records.iter().any(|r| r.variant == Variant::Digital);
    let has_physical = records.iter().any(|r| r.variant == Variant::Physical);

    let subject = match (has_digital, has_physical) {
        (true, false) => "I tuoi documenti sono pronti per il download",
        (false, true) => "Conferma d'ordine: spedizione in preparazione",
        _ => "Conferma d'ordine: documenti e spedizione",
    }
    .to_string();

    let greeting_name = session
        .customer_details
        .as_ref()
        .and_then(|d| d.name.as_deref())
        .map(html_escape)
        .unwrap_or_else(|| "cliente".to_string());

    let mut item_rows = String::new();
    for record in records {
        let variant_label = match record.variant {
            Variant::Digital => "PDF",
            Variant::Physical => "copia cartacea",
        };
        item_rows.push_str(&format!(
            r#"<li style="margin-bottom: 6px;"><strong>{}</strong> <span style="color: #666;">({}, x{})</span></li>"#,
            html_escape(&record.title),
            variant_label,
            record.quantity
        ));
    }

    let mut blocks = String::new();

    if has_digital {
        let mut download_rows = String::new();
        for record in records.iter().filter(|r| r.variant == Variant::Digital) {
            let url = format!(
                "{}/download?session_id={}&slug={}",
                base_url, session.id, record.slug
            );
            download_rows.push_str(&format!(
                r#"<p style="margin: 6px 0;"><a href="{}" style="color: #1d4ed8;">{}</a></p>"#,
                html_escape(&url),
                html_escape(&record.title)
            ));
        }
        blocks.push_str(&format!(
            r#"<h3 style="color: #333; margin-top: 24px;">Scarica i tuoi documenti</h3>
{}
<p style="color: #666; font-size: 14px;">I link restano validi per {} ore dall'acquisto.</p>"#,
            download_rows, DOWNLOAD_WINDOW_HOURS
        ));
    }

    if has_physical {
        blocks.push_str(
            r#"<h3 style="color: #333; margin-top: 24px;">Spedizione</h3>
<p>La stampa delle copie cartacee &egrave; stata avviata. Riceverai il pacco
all'indirizzo indicato in fase di acquisto; i tempi tipici di consegna sono
di 5-10 giorni lavorativi.</p>"#,
        );
    }

    let mut document_rows = String::new();
    if let Some(ref url) = links.hosted_url {
        document_rows.push_str(&format!(
            r#"<p style="margin: 4px 0;"><a href="{}" style="color: #1d4ed8;">Fattura online</a></p>"#,
            html_escape(url)
        ));
    }
    if let Some(ref url) = links.pdf_url {
        document_rows.push_str(&format!(
            r#"<p style="margin: 4px 0;"><a href="{}" style="color: #1d4ed8;">Fattura (PDF)</a></p>"#,
            html_escape(url)
        ));
    }
    if let Some(ref url) = links.receipt_url {
        document_rows.push_str(&format!(
            r#"<p style="margin: 4px 0;"><a href="{}" style="color: #1d4ed8;">Ricevuta di pagamento</a></p>"#,
            html_escape(url)
        ));
    }
    if !document_rows.is_empty() {
        blocks.push_str(&format!(
            r#"<h3 style="color: #333; margin-top: 24px;">Documenti contabili</h3>
{}"#,
            document_rows
        ));
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Grazie per il tuo ordine</h2>
<p>Gentile {},</p>
<p>abbiamo ricevuto il tuo pagamento. Riepilogo dell'ordine:</p>
<ul style="padding-left: 20px;">
{}
</ul>
{}
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Per qualsiasi domanda rispondi pure a questa email.</p>
</body>
</html>"#,
        greeting_name, item_rows, blocks
    );

    ComposedEmail { subject, html }
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Clone)]
pub struct EmailService {
    http: Client,
    api_key: Option<String>,
    from: String,
    reply_to: Option<String>,
    bcc: Option<String>,
}

impl EmailService {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        from: String,
        reply_to: Option<String>,
        bcc: Option<String>,
    ) -> Self {
        Self {
            http,
            api_key,
            from,
            reply_to,
            bcc,
        }
    }

    /// Send a composed confirmation. Single attempt: the payment processor's
    /// own webhook retries are the only retry mechanism in this system.
    pub async fn send(&self, to: &str, email: &ComposedEmail) -> Result<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("RESEND_API_KEY".into()))?;

        let request = ResendEmailRequest {
            from: &self.from,
            to: vec![to],
            subject: &email.subject,
            html: &email.html,
            bcc: self.bcc.as_deref().map(|addr| vec![addr]),
            reply_to: self.reply_to.as_deref(),
        };

        let response = self
            .http
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Email service error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Email service error: {} - {}",
                status,
                extract_api_error(&body)
            )));
        }

        let _result: ResendEmailResponse = response
            .json()
            .await
            .map_err(|_| AppError::Upstream("Email service response error".into()))?;

        tracing::info!(to = %to, subject = %email.subject, "Confirmation email sent");
        Ok(())
    }
}
