use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::NotificationConfig;
use crate::models::{content_item::ContentItem, payment_record::PaymentRecord};
use crate::store::SubscriberDirectory;

const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";
const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Channels fired after a content item is published.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentNotifier: Send + Sync {
    async fn notify_all_subscribers(&self, item: &ContentItem) -> anyhow::Result<()>;
    async fn notify_external_webhook(&self, item: &ContentItem) -> anyhow::Result<()>;
}

/// Channels fired after a donation completes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn send_donor_confirmation(&self, record: &PaymentRecord) -> anyhow::Result<()>;
    async fn send_admin_notification(&self, record: &PaymentRecord) -> anyhow::Result<()>;
    async fn send_donor_sms(&self, record: &PaymentRecord) -> anyhow::Result<()>;
}

/// Brevo email, Twilio SMS and the outbound relay webhook. A channel without
/// configuration is skipped with a warning.
#[derive(Clone)]
pub struct NotificationService {
    client: Client,
    config: NotificationConfig,
    subscribers: Arc<dyn SubscriberDirectory>,
}

impl NotificationService {
    pub fn new(
        client: Client,
        config: NotificationConfig,
        subscribers: Arc<dyn SubscriberDirectory>,
    ) -> Self {
        Self {
            client,
            config,
            subscribers,
        }
    }

    async fn send_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
        html: String,
    ) -> anyhow::Result<bool> {
        let (Some(api_key), Some(sender_email)) =
            (&self.config.brevo_api_key, &self.config.sender_email)
        else {
            tracing::warn!("Brevo is not configured, skipping email to {}", to_email);
            return Ok(false);
        };

        let mut recipient = json!({ "email": to_email });
        if let Some(name) = to_name {
            recipient["name"] = json!(name);
        }
        let body = json!({
            "sender": { "name": self.config.sender_name, "email": sender_email },
            "to": [recipient],
            "subject": subject,
            "htmlContent": html,
        });

        let url = self
            .config
            .brevo_api_url
            .as_deref()
            .unwrap_or(BREVO_SEND_URL);
        let resp = self
            .client
            .post(url)
            .header("api-key", api_key)
            .json(&body)
            .send()
            .await
            .context("brevo request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("brevo returned {}: {}", status, text);
        }
        Ok(true)
    }

    async fn send_sms(&self, to: &str, message: &str) -> anyhow::Result<()> {
        let Some(twilio) = &self.config.twilio else {
            tracing::warn!("Twilio is not configured, skipping SMS");
            return Ok(());
        };
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            TWILIO_API_BASE, twilio.account_sid
        );
        let form = [
            ("To", to),
            ("Body", message),
            ("MessagingServiceSid", twilio.messaging_service_sid.as_str()),
        ];
        let resp = self
            .client
            .post(url)
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&form)
            .send()
            .await
            .context("twilio request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("twilio returned {}: {}", status, text);
        }
        Ok(())
    }

    fn content_url(&self, item: &ContentItem) -> String {
        format!("{}/blog/{}", self.config.site_url, item.slug)
    }
}

/// Escapes text placed into email HTML, attribute values included.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl ContentNotifier for NotificationService {
    async fn notify_all_subscribers(&self, item: &ContentItem) -> anyhow::Result<()> {
        let subscribers = self
            .subscribers
            .active_subscribers()
            .await
            .map_err(|e| anyhow!("loading subscribers: {}", e))?;
        if subscribers.is_empty() {
            tracing::info!(content_id = %item.id, "No active subscribers to notify");
            return Ok(());
        }

        let subject = format!("New post: {}", item.title);
        let mut failures = 0usize;
        let html = format!(
            "<h1>{}</h1><p>{}</p><p><a href=\"{}\">Read more</a></p>",
            html_escape(&item.title),
            html_escape(item.summary.as_deref().unwrap_or_default()),
            html_escape(&self.content_url(item))
        );
        for subscriber in &subscribers {
            if let Err(e) = self
                .send_email(&subscriber.email, subscriber.name.as_deref(), &subject, html.clone())
                .await
            {
                failures += 1;
                tracing::warn!(content_id = %item.id, email = %subscriber.email, error = ?e, "Subscriber email failed");
            }
        }

        tracing::info!(
            content_id = %item.id,
            sent = subscribers.len() - failures,
            failed = failures,
            "Subscriber notifications finished"
        );
        if failures == subscribers.len() {
            bail!("all {} subscriber emails failed", failures);
        }
        Ok(())
    }

    async fn notify_external_webhook(&self, item: &ContentItem) -> anyhow::Result<()> {
        let Some(url) = &self.config.external_webhook_url else {
            tracing::warn!("External webhook URL is not configured, skipping");
            return Ok(());
        };
        let payload = json!({
            "contentId": item.id,
            "title": item.title,
            "slug": item.slug,
            "summary": item.summary,
            "body": item.body,
            "author": item.author.as_deref().unwrap_or("Unknown"),
            "publishedAt": item.published_at,
            "url": self.content_url(item),
        });
        let resp = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .context("external webhook request failed")?;
        if !resp.status().is_success() {
            bail!("external webhook returned {}", resp.status());
        }
        tracing::info!(content_id = %item.id, status = %resp.status(), "External webhook accepted");
        Ok(())
    }
}

#[async_trait]
impl PaymentNotifier for NotificationService {
    async fn send_donor_confirmation(&self, record: &PaymentRecord) -> anyhow::Result<()> {
        let html = format!(
            "<p>Dear {},</p><p>Thank you for your {} donation of {} {}.</p>\
             <p>Receipt number: <strong>{}</strong></p>",
            html_escape(&record.donor_name),
            record.donation_type.as_str(),
            record.amount,
            record.currency.to_uppercase(),
            html_escape(&record.receipt_number)
        );
        self.send_email(
            &record.email,
            Some(&record.donor_name),
            "Thank you for your donation",
            html,
        )
        .await?;
        Ok(())
    }

    async fn send_admin_notification(&self, record: &PaymentRecord) -> anyhow::Result<()> {
        let Some(admin_email) = &self.config.admin_email else {
            tracing::warn!("ADMIN_EMAIL is not configured, skipping admin notification");
            return Ok(());
        };
        let html = format!(
            "<p>New {} donation received.</p><ul>\
             <li>Donor: {} ({})</li><li>Amount: {} {}</li><li>Designation: {}</li>\
             <li>Receipt: {}</li><li>Transaction: {}</li><li>Message: {}</li></ul>",
            record.donation_type.as_str(),
            html_escape(record.display_name()),
            html_escape(&record.email),
            record.amount,
            record.currency.to_uppercase(),
            html_escape(&record.designation),
            html_escape(&record.receipt_number),
            html_escape(record.external_transaction_ref.as_deref().unwrap_or("-")),
            html_escape(record.message.as_deref().unwrap_or("-")),
        );
        let subject = format!("New donation: {} {}", record.amount, record.currency.to_uppercase());
        self.send_email(admin_email, None, &subject, html).await?;
        Ok(())
    }

    async fn send_donor_sms(&self, record: &PaymentRecord) -> anyhow::Result<()> {
        let Some(phone) = record.phone.as_deref().filter(|p| !p.trim().is_empty()) else {
            return Ok(());
        };
        let message = format!(
            "Hi! Thank you for your generous donation of ${} to {}. Receipt {}.",
            record.amount, self.config.sender_name, record.receipt_number
        );
        self.send_sms(phone, &message).await
    }
}
