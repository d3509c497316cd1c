use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::extract::Item;

/// Caller-supplied alert conditions, checked against every extracted item.
#[derive(Debug, Clone)]
pub enum AlertCondition {
    /// Item title contains the keyword (case-insensitive)
    Keyword(String),
    /// Item price at or below the target
    PriceBelow(i64),
    /// Price moved at least this many percent against the last seen price
    /// for the same URL, in either direction
    PriceChangePercent(f64),
}

/// Structured alert emitted when a condition fires. Delivery (toast, email)
/// is a collaborator concern, not the core's.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub item_title: String,
    pub item_url: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Narrow delivery interface the core hands events to.
pub trait AlertSink: Send + Sync {
    fn deliver(&mut self, event: &AlertEvent);
}

/// Default sink: alerts end up in the log.
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&mut self, event: &AlertEvent) {
        info!("ALERT {}: {} ({})", event.item_title, event.message, event.item_url);
    }
}

/// Evaluates conditions against items, tracking the last seen price per URL
/// for delta conditions.
pub struct AlertEngine {
    conditions: Vec<AlertCondition>,
    last_price: HashMap<String, i64>,
    sink: Box<dyn AlertSink>,
}

impl AlertEngine {
    pub fn new(conditions: Vec<AlertCondition>, sink: Box<dyn AlertSink>) -> Self {
        Self {
            conditions,
            last_price: HashMap::new(),
            sink,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Checks one item against every condition, delivers matching events to
    /// the sink and returns them.
    pub fn observe(&mut self, item: &Item) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let price = item.price();
        let previous = self.last_price.get(item.url()).copied();

        for condition in &self.conditions {
            let message = match condition {
                AlertCondition::Keyword(keyword) => {
                    let title = item.title().to_lowercase();
                    title
                        .contains(&keyword.to_lowercase())
                        .then(|| format!("keyword '{}' matched", keyword))
                }
                AlertCondition::PriceBelow(target) => price.and_then(|p| {
                    (p <= *target).then(|| format!("target price reached: {} <= {}", p, target))
                }),
                AlertCondition::PriceChangePercent(threshold) => {
                    match (previous, price) {
                        (Some(prev), Some(cur)) if prev > 0 => {
                            let change = (cur - prev) as f64 / prev as f64 * 100.0;
                            (change.abs() >= *threshold).then(|| {
                                let direction = if change > 0.0 { "up" } else { "down" };
                                format!("price {} {:.2}%: {} -> {}", direction, change.abs(), prev, cur)
                            })
                        }
                        _ => None,
                    }
                }
            };

            if let Some(message) = message {
                let event = AlertEvent {
                    item_title: item.title().to_string(),
                    item_url: item.url().to_string(),
                    message,
                    at: Utc::now(),
                };
                self.sink.deliver(&event);
                events.push(event);
            }
        }

        if let Some(p) = price {
            self.last_price.insert(item.url().to_string(), p);
        }

        events
    }
}
