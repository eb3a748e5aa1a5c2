use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A message that can be routed to topic subscribers.
///
/// Messages are:
/// - **immutable** (treat them as facts)
/// - **self-describing**: the topic is derived from the message itself
pub trait Routed: Clone + core::fmt::Debug + Send + Sync + 'static {
    type Topic: Clone + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static;

    fn topic(&self) -> Self::Topic;
}

/// Closed vocabulary of business events that feed task distribution.
///
/// Producers may still publish a type outside the vocabulary; it is kept as
/// [`EventType::Other`] and simply generates no work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    PurchaseConfirmed,
    InspectionComplete,
    InvoiceCompleted,
    DeviceSold,
    WarrantyClaim,
    StockLow,
    DailyTasks,
    Other(String),
}

impl EventType {
    /// Every known event type, in a stable order (used for startup wiring).
    pub const VOCABULARY: [EventType; 7] = [
        EventType::PurchaseConfirmed,
        EventType::InspectionComplete,
        EventType::InvoiceCompleted,
        EventType::DeviceSold,
        EventType::WarrantyClaim,
        EventType::StockLow,
        EventType::DailyTasks,
    ];

    /// Wire name (e.g. `PURCHASE_CONFIRMED`).
    pub fn as_str(&self) -> &str {
        match self {
            EventType::PurchaseConfirmed => "PURCHASE_CONFIRMED",
            EventType::InspectionComplete => "INSPECTION_COMPLETE",
            EventType::InvoiceCompleted => "INVOICE_COMPLETED",
            EventType::DeviceSold => "DEVICE_SOLD",
            EventType::WarrantyClaim => "WARRANTY_CLAIM",
            EventType::StockLow => "STOCK_LOW",
            EventType::DailyTasks => "DAILY_TASKS",
            EventType::Other(name) => name,
        }
    }

    /// Lowercase key recorded in task source references (e.g. `purchase_confirmed`).
    pub fn source_key(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Other(_))
    }

    /// Parse a producer-supplied name. Matching is case-insensitive, so both
    /// `STOCK_LOW` and `stock_low` resolve to [`EventType::StockLow`].
    pub fn parse(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        Self::VOCABULARY
            .into_iter()
            .find(|t| t.as_str() == upper)
            .unwrap_or_else(|| EventType::Other(name.to_string()))
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EventType {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

/// A business event as published by a producer.
///
/// Transient: it is consumed once by the distribution pipeline and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(alias = "event_type")]
    pub event_type: EventType,
    /// Structured payload; its shape depends on `event_type`.
    #[serde(default)]
    pub payload: JsonValue,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: EventType, payload: JsonValue) -> Self {
        Self::at(event_type, payload, Utc::now())
    }

    pub fn at(event_type: EventType, payload: JsonValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            payload,
            timestamp,
        }
    }
}

impl Routed for DomainEvent {
    type Topic = EventType;

    fn topic(&self) -> Self::Topic {
        self.event_type.clone()
    }
}
