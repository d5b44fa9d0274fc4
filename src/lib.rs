pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    checkout_service::{CheckoutGateway, CheckoutService, StripeGateway},
    notification_service::{ContentNotifier, NotificationService, PaymentNotifier},
    publication_service::PublicationService,
    receipt_service::ReceiptAllocator,
    reconciler_service::PaymentReconciler,
    scheduler_service::PublicationScheduler,
};
use crate::store::{ContentStore, PaymentStore, SubscriberDirectory};

/// External collaborators the services are wired to.
pub struct Backends {
    pub content: Arc<dyn ContentStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub content_notifier: Arc<dyn ContentNotifier>,
    pub payment_notifier: Arc<dyn PaymentNotifier>,
    pub gateway: Arc<dyn CheckoutGateway>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub publication: PublicationService,
    pub scheduler: PublicationScheduler,
    pub reconciler: PaymentReconciler,
    pub checkout: CheckoutService,
}

impl AppState {
    pub fn new(config: Arc<Config>, backends: Backends) -> Self {
        let recurrence = config.scheduler.recurrence.clone();
        let publication = PublicationService::new(
            backends.content,
            backends.content_notifier,
            recurrence.timezone,
            config.scheduler.notify_on_publish,
        );
        let scheduler = PublicationScheduler::new(publication.clone(), recurrence.clone());
        let reconciler = PaymentReconciler::new(
            backends.payments.clone(),
            backends.payment_notifier,
            config.stripe.webhook_secret.clone(),
            config.stripe.signature_tolerance_secs,
        );
        let checkout = CheckoutService::new(
            backends.payments,
            backends.gateway,
            ReceiptAllocator::new(&config.receipts),
            config.stripe.currency.clone(),
            recurrence.timezone,
            config.checkout_urls(),
        );

        Self {
            config,
            publication,
            scheduler,
            reconciler,
            checkout,
        }
    }

    /// Wires one store implementation to the real Brevo/Twilio/relay
    /// notifier and the Stripe gateway.
    pub fn with_store<S>(config: Arc<Config>, store: Arc<S>) -> Result<Self>
    where
        S: ContentStore + PaymentStore + SubscriberDirectory + 'static,
    {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        let notifier = Arc::new(NotificationService::new(
            http_client.clone(),
            config.notifications.clone(),
            store.clone(),
        ));
        let gateway = Arc::new(StripeGateway::new(http_client, &config.stripe));

        Ok(Self::new(
            config,
            Backends {
                content: store.clone(),
                payments: store,
                content_notifier: notifier.clone(),
                payment_notifier: notifier,
                gateway,
            },
        ))
    }
}
