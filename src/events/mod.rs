use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after a committed write; a closed channel is logged,
    /// never surfaced to the caller.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events emitted after a transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    ProductImagesReconciled {
        product_id: Uuid,
        generation: i64,
        deleted: usize,
        updated: usize,
        inserted: usize,
        primary_url: Option<String>,
    },

    // Address book events
    AddressCreated {
        customer_id: Uuid,
        address_id: Uuid,
    },
    AddressUpdated {
        customer_id: Uuid,
        address_id: Uuid,
    },
    DefaultAddressChanged {
        customer_id: Uuid,
        address_id: Uuid,
    },
    AddressDeleted {
        customer_id: Uuid,
        address_id: Uuid,
    },

    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Handlers process events asynchronously after they are drained.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Logs every event; the default sink when no other handler is registered.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        match &event {
            Event::ProductImagesReconciled {
                product_id,
                generation,
                deleted,
                updated,
                inserted,
                primary_url,
            } => {
                info!(
                    %product_id,
                    generation,
                    deleted,
                    updated,
                    inserted,
                    primary = primary_url.as_deref().unwrap_or("<none>"),
                    "Product image set reconciled"
                );
            }
            Event::DefaultAddressChanged {
                customer_id,
                address_id,
            } => {
                info!(%customer_id, %address_id, "Default address changed");
            }
            other => info!("Event: {:?}", other),
        }
        Ok(())
    }
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(rx: mpsc::Receiver<Event>) {
    process_events_with(rx, &LoggingEventHandler).await
}

pub async fn process_events_with<H: EventHandler + ?Sized>(
    mut rx: mpsc::Receiver<Event>,
    handler: &H,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        if let Err(e) = handler.handle_event(event).await {
            error!("Failed to handle event: {}", e);
        }
    }

    warn!("Event processing loop has ended");
}
