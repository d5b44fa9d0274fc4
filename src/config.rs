use crate::error::{Error, Result};
use crate::utils::time::Recurrence;
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub public_rps: u32,
    pub admin_rps: u32,
    pub frontend_url: Option<String>,
    pub stripe: StripeConfig,
    pub receipts: ReceiptConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub currency: String,
    pub signature_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct ReceiptConfig {
    pub prefix: String,
    pub start_sequence: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub recurrence: Recurrence,
    pub notify_on_publish: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub brevo_api_key: Option<String>,
    /// Overrides the Brevo send endpoint.
    pub brevo_api_url: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: String,
    pub admin_email: Option<String>,
    pub external_webhook_url: Option<String>,
    pub twilio: Option<TwilioConfig>,
    pub site_url: String,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub messaging_service_sid: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let storage_backend = match get_env_or("STORAGE_BACKEND", "postgres").as_str() {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(Error::Config(format!("Unknown STORAGE_BACKEND: {}", other)));
            }
        };
        let database_url = match storage_backend {
            StorageBackend::Postgres => Some(get_env("DATABASE_URL")?),
            StorageBackend::Memory => get_opt_env("DATABASE_URL"),
        };

        let recurrence = Recurrence::parse(
            &get_env_or("SCHEDULER_DAYS", "sun,mon,wed,fri"),
            &get_env_or("SCHEDULER_TIME", "11:58"),
            &get_env_or("SCHEDULER_TIMEZONE", "America/New_York"),
        )?;

        let twilio = match (
            get_opt_env("TWILIO_ACCOUNT_SID"),
            get_opt_env("TWILIO_AUTH_TOKEN"),
            get_opt_env("TWILIO_MESSAGING_SERVICE_SID"),
        ) {
            (Some(account_sid), Some(auth_token), Some(messaging_service_sid)) => {
                Some(TwilioConfig {
                    account_sid,
                    auth_token,
                    messaging_service_sid,
                })
            }
            _ => None,
        };

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            storage_backend,
            database_url,
            jwt_secret: get_env("JWT_SECRET")?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 20)?,
            admin_rps: get_env_parse_or("ADMIN_RPS", 50)?,
            frontend_url: get_opt_env("FRONTEND_URL"),
            stripe: StripeConfig {
                secret_key: get_env("STRIPE_SECRET_KEY")?,
                webhook_secret: get_env("STRIPE_WEBHOOK_SECRET")?,
                api_base: get_env_or("STRIPE_API_BASE", "https://api.stripe.com"),
                currency: get_env_or("DONATION_CURRENCY", "usd"),
                signature_tolerance_secs: get_env_parse_or(
                    "STRIPE_SIGNATURE_TOLERANCE_SECS",
                    crate::utils::signature::DEFAULT_TOLERANCE_SECS,
                )?,
            },
            receipts: ReceiptConfig {
                prefix: get_env_or("RECEIPT_PREFIX", "H4A"),
                start_sequence: get_env_parse_or("RECEIPT_START_SEQUENCE", 44210)?,
            },
            scheduler: SchedulerConfig {
                enabled: get_env_parse_or("SCHEDULER_ENABLED", true)?,
                recurrence,
                notify_on_publish: get_env_parse_or("SCHEDULER_NOTIFY_ON_PUBLISH", true)?,
            },
            notifications: NotificationConfig {
                brevo_api_key: get_opt_env("BREVO_API_KEY"),
                brevo_api_url: get_opt_env("BREVO_API_URL"),
                sender_email: get_opt_env("BREVO_SENDER_EMAIL"),
                sender_name: get_env_or("BREVO_SENDER_NAME", "Harmony 4 All"),
                admin_email: get_opt_env("ADMIN_EMAIL"),
                external_webhook_url: get_opt_env("ZAPIER_WEBHOOK_URL"),
                twilio,
                site_url: get_env_or("SITE_URL", "http://localhost:3000"),
            },
        })
    }

    /// Success/cancel pages handed to the checkout provider.
    pub fn checkout_urls(&self) -> (String, String) {
        let base = self
            .frontend_url
            .clone()
            .unwrap_or_else(|| self.notifications.site_url.clone());
        (
            format!("{}/donate/success?session_id={{CHECKOUT_SESSION_ID}}", base),
            format!("{}/donate?cancelled=true", base),
        )
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_opt_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or(name: &str, default: &str) -> String {
    get_opt_env(name).unwrap_or_else(|| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_opt_env(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}
