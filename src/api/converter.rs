//! Wire formats and conversion to internal state types.

use crate::lifecycle::PricePoint;
use crate::state::{Likes, Market, Signal, SignalStatus, Target};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market as sent by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub name: String,
    pub uuid: String,
}

/// Target as sent by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    #[serde(default)]
    pub touched: bool,
}

/// Signal as sent by the backend. Timestamps are milliseconds since epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub id: String,
    pub market: MarketRecord,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub stoploss: Decimal,
    pub targets: Vec<TargetRecord>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    pub status: SignalStatus,
    pub publisher: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Observed high as sent by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePointRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
}

/// One page of a paginated list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub total_pages: u32,
}

fn first_page() -> u32 {
    1
}

impl<T> Page<T> {
    /// Whether another page follows the one that was requested.
    ///
    /// The echoed `page` field is not trusted: servers may omit it or count
    /// from zero. An empty page always ends the listing.
    pub fn continues_after(&self, requested_page: u32) -> bool {
        !self.items.is_empty() && requested_page < self.total_pages
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            total_pages: self.total_pages,
        }
    }
}

/// Body of `PUT /signals/:id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalUpdateBody {
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    pub status: SignalStatus,
}

/// Body of `PUT /signals/:id/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateBody {
    pub status: SignalStatus,
    pub targets: Vec<TargetRecord>,
}

/// Body of `PUT /users/:username/score`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdateBody {
    pub signal_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub delta: Decimal,
}

/// Converts backend records to internal state types and back.
pub struct DataConverter;

impl DataConverter {
    /// Convert a backend signal record to our internal Signal type.
    pub fn convert_signal(record: SignalRecord) -> Signal {
        Signal {
            id: record.id,
            market: Market::new(record.market.name, record.market.uuid),
            entry: record.entry,
            stoploss: record.stoploss,
            targets: record
                .targets
                .into_iter()
                .map(|t| Target {
                    id: t.id,
                    value: t.value,
                    touched: t.touched,
                })
                .collect(),
            open_time: record.open_time,
            close_time: record.close_time,
            status: record.status,
            publisher: record.publisher,
            description: record.description,
            likes: record.likes.into_iter().collect::<Likes>(),
            // Older records carry no creation time
            created_at: record.created_at.unwrap_or(record.open_time),
        }
    }

    /// Convert an internal signal to the backend record format.
    pub fn signal_record(signal: &Signal) -> SignalRecord {
        SignalRecord {
            id: signal.id.clone(),
            market: MarketRecord {
                name: signal.market.name.clone(),
                uuid: signal.market.pair_id.clone(),
            },
            entry: signal.entry,
            stoploss: signal.stoploss,
            targets: Self::target_records(signal),
            open_time: signal.open_time,
            close_time: signal.close_time,
            status: signal.status,
            publisher: signal.publisher.clone(),
            description: signal.description.clone(),
            likes: signal.likes.iter().cloned().collect(),
            created_at: Some(signal.created_at),
        }
    }

    pub fn update_body(signal: &Signal) -> SignalUpdateBody {
        SignalUpdateBody {
            description: signal.description.clone(),
            close_time: signal.close_time,
            status: signal.status,
        }
    }

    pub fn status_body(signal: &Signal) -> StatusUpdateBody {
        StatusUpdateBody {
            status: signal.status,
            targets: Self::target_records(signal),
        }
    }

    pub fn convert_price_point(record: PricePointRecord) -> PricePoint {
        PricePoint {
            timestamp: record.timestamp,
            high: record.high,
        }
    }

    fn target_records(signal: &Signal) -> Vec<TargetRecord> {
        signal
            .targets
            .iter()
            .map(|t| TargetRecord {
                id: t.id.clone(),
                value: t.value,
                touched: t.touched,
            })
            .collect()
    }
}
