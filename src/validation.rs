//! Signal creation and edit validation.
//!
//! Malformed signals are rejected here, with a message per offending field,
//! before they can reach the lifecycle evaluator.

use crate::lifecycle::derive_status;
use crate::state::{Likes, Market, Signal, Target};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The input field a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "field", content = "index")]
pub enum Field {
    Market,
    Publisher,
    Entry,
    Stoploss,
    OpenTime,
    CloseTime,
    Targets,
    Target(usize),
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Publisher => write!(f, "publisher"),
            Self::Entry => write!(f, "entry"),
            Self::Stoploss => write!(f, "stoploss"),
            Self::OpenTime => write!(f, "openTime"),
            Self::CloseTime => write!(f, "closeTime"),
            Self::Targets => write!(f, "targets"),
            Self::Target(index) => write!(f, "targets[{}]", index),
        }
    }
}

/// A single field failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

/// All failures found in one draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: Field, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any failure refers to the field.
    pub fn has(&self, field: Field) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Message for a field, if it failed.
    pub fn message(&self, field: Field) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Unchecked signal input, as submitted by a form or API caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalDraft {
    pub market: Option<Market>,
    pub publisher: Option<String>,
    pub entry: Option<Decimal>,
    pub stoploss: Option<Decimal>,
    pub targets: Vec<Decimal>,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
}

/// A signal that passed validation, not yet assigned an ID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub market: Market,
    pub publisher: String,
    pub entry: Decimal,
    pub stoploss: Decimal,
    pub targets: Vec<Decimal>,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub description: String,
}

impl NewSignal {
    /// Build the signal, deriving its initial status from `now`.
    pub fn into_signal(self, id: impl Into<String>, now: DateTime<Utc>) -> Signal {
        let targets = self
            .targets
            .into_iter()
            .enumerate()
            .map(|(i, value)| Target::new(format!("t{}", i + 1), value))
            .collect();

        Signal {
            id: id.into(),
            market: self.market,
            entry: self.entry,
            stoploss: self.stoploss,
            targets,
            status: derive_status(now, self.open_time, self.close_time),
            open_time: self.open_time,
            close_time: self.close_time,
            publisher: self.publisher,
            description: self.description,
            likes: Likes::new(),
            created_at: now,
        }
    }

    /// Build the signal under a fresh random ID. The backend may replace it
    /// with its own on creation.
    pub fn into_signal_with_new_id(self, now: DateTime<Utc>) -> Signal {
        self.into_signal(uuid::Uuid::new_v4().to_string(), now)
    }
}

/// Validate a draft against the creation rules.
pub fn validate(draft: SignalDraft, now: DateTime<Utc>) -> Result<NewSignal, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let market = draft.market.filter(|m| !m.pair_id.trim().is_empty());
    if market.is_none() {
        errors.push(Field::Market, "Market is required");
    }

    let publisher = draft.publisher.filter(|p| !p.trim().is_empty());
    if publisher.is_none() {
        errors.push(Field::Publisher, "Publisher is required");
    }

    match draft.entry {
        None => errors.push(Field::Entry, "Entry price is required"),
        Some(entry) if entry <= Decimal::ZERO => {
            errors.push(Field::Entry, "Entry price must be greater than zero")
        }
        Some(_) => {}
    }

    match (draft.stoploss, draft.entry) {
        (None, _) => errors.push(Field::Stoploss, "Stop-loss is required"),
        (Some(stoploss), Some(entry)) if stoploss >= entry => {
            errors.push(Field::Stoploss, "Stop-loss must be below the entry price")
        }
        (Some(stoploss), _) if stoploss <= Decimal::ZERO => {
            errors.push(Field::Stoploss, "Stop-loss must be greater than zero")
        }
        _ => {}
    }

    match draft.open_time {
        None => errors.push(Field::OpenTime, "Open time is required"),
        Some(open) if open < now => errors.push(Field::OpenTime, "Open time is in the past"),
        Some(_) => {}
    }

    check_close_time(&mut errors, draft.open_time, draft.close_time);

    if draft.targets.is_empty() {
        errors.push(Field::Targets, "At least one target is required");
    }
    let mut previous: Option<Decimal> = None;
    for (index, value) in draft.targets.iter().copied().enumerate() {
        if let Some(entry) = draft.entry
            && value <= entry
        {
            errors.push(Field::Target(index), "Target must be above the entry price");
        } else if let Some(prev) = previous
            && value <= prev
        {
            errors.push(
                Field::Target(index),
                "Target must be above the previous target",
            );
        }
        previous = Some(value);
    }

    errors.into_result(|| NewSignal {
        market: market.unwrap_or_else(|| Market::new("", "")),
        publisher: publisher.unwrap_or_default(),
        entry: draft.entry.unwrap_or_default(),
        stoploss: draft.stoploss.unwrap_or_default(),
        targets: draft.targets,
        open_time: draft.open_time.unwrap_or(now),
        close_time: draft.close_time.unwrap_or(now),
        description: draft.description,
    })
}

/// Changes allowed on an existing signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalEdit {
    pub description: Option<String>,
    pub close_time: Option<DateTime<Utc>>,
}

/// Validate an edit and apply it to a copy of the signal.
///
/// Only the description and close time may change. A closed signal keeps its
/// close time.
pub fn validate_edit(
    signal: &Signal,
    edit: SignalEdit,
    now: DateTime<Utc>,
) -> Result<Signal, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Some(close_time) = edit.close_time {
        if signal.is_closed() {
            errors.push(Field::CloseTime, "Cannot change the close time of a closed signal");
        } else {
            check_close_time(&mut errors, Some(signal.open_time), Some(close_time));
            if close_time <= now {
                errors.push(Field::CloseTime, "Close time must be in the future");
            }
        }
    }

    errors.into_result(|| {
        let mut updated = signal.clone();
        if let Some(description) = edit.description {
            updated.description = description;
        }
        if let Some(close_time) = edit.close_time {
            updated.close_time = close_time;
        }
        updated
    })
}

fn check_close_time(
    errors: &mut ValidationErrors,
    open_time: Option<DateTime<Utc>>,
    close_time: Option<DateTime<Utc>>,
) {
    match (open_time, close_time) {
        (_, None) => errors.push(Field::CloseTime, "Close time is required"),
        (Some(open), Some(close)) if close <= open => {
            errors.push(Field::CloseTime, "Close time must be after the open time")
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SignalStatus;
    use crate::state::fixtures::btc_signal;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn create_test_draft(now: DateTime<Utc>) -> SignalDraft {
        SignalDraft {
            market: Some(Market::new("BTC/USDT", "btc-usdt")),
            publisher: Some("alice".to_string()),
            entry: Some(dec!(50000)),
            stoploss: Some(dec!(48000)),
            targets: vec![dec!(52000), dec!(55000)],
            open_time: Some(now + Duration::minutes(5)),
            close_time: Some(now + Duration::days(1)),
            description: "Breakout retest".to_string(),
        }
    }

    #[test]
    fn test_valid_draft() {
        let now = Utc::now();
        let new_signal = validate(create_test_draft(now), now).unwrap();
        let signal = new_signal.into_signal("s1", now);

        assert_eq!(signal.status, SignalStatus::NotOpened);
        assert_eq!(signal.targets.len(), 2);
        assert_eq!(signal.targets[1].id, "t2");
        assert!(signal.targets.iter().all(|t| !t.touched));
        assert!(signal.likes.is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let now = Utc::now();
        let a = validate(create_test_draft(now), now)
            .unwrap()
            .into_signal_with_new_id(now);
        let b = validate(create_test_draft(now), now)
            .unwrap()
            .into_signal_with_new_id(now);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 36);
    }

    #[test]
    fn test_stoploss_at_or_above_entry_rejected() {
        let now = Utc::now();
        let mut draft = create_test_draft(now);
        draft.stoploss = Some(dec!(50000));

        let errors = validate(draft, now).unwrap_err();
        assert_eq!(
            errors.message(Field::Stoploss),
            Some("Stop-loss must be below the entry price")
        );
    }

    #[test]
    fn test_target_at_or_below_entry_rejected() {
        let now = Utc::now();
        let mut draft = create_test_draft(now);
        draft.targets = vec![dec!(50000), dec!(55000)];

        let errors = validate(draft, now).unwrap_err();
        assert!(errors.has(Field::Target(0)));
        assert!(!errors.has(Field::Target(1)));
    }

    #[test]
    fn test_targets_must_increase() {
        let now = Utc::now();
        let mut draft = create_test_draft(now);
        draft.targets = vec![dec!(55000), dec!(52000), dec!(52000)];

        let errors = validate(draft, now).unwrap_err();
        assert!(!errors.has(Field::Target(0)));
        assert!(errors.has(Field::Target(1)));
        assert!(errors.has(Field::Target(2)));
    }

    #[test]
    fn test_non_positive_entry_rejected() {
        let now = Utc::now();
        let mut draft = create_test_draft(now);
        draft.entry = Some(dec!(0));

        let errors = validate(draft, now).unwrap_err();
        assert!(errors.has(Field::Entry));
    }

    #[test]
    fn test_time_rules() {
        let now = Utc::now();
        let mut draft = create_test_draft(now);
        draft.open_time = Some(now - Duration::minutes(1));
        draft.close_time = Some(now - Duration::minutes(2));

        let errors = validate(draft, now).unwrap_err();
        assert!(errors.has(Field::OpenTime));
        assert!(errors.has(Field::CloseTime));
    }

    #[test]
    fn test_missing_required_fields_collects_all() {
        let now = Utc::now();
        let errors = validate(SignalDraft::default(), now).unwrap_err();

        for field in [
            Field::Market,
            Field::Publisher,
            Field::Entry,
            Field::Stoploss,
            Field::OpenTime,
            Field::CloseTime,
            Field::Targets,
        ] {
            assert!(errors.has(field), "expected failure for {}", field);
        }
    }

    #[test]
    fn test_display_lists_fields() {
        let now = Utc::now();
        let mut draft = create_test_draft(now);
        draft.publisher = None;
        let errors = validate(draft, now).unwrap_err();
        assert_eq!(errors.to_string(), "publisher: Publisher is required");
    }

    #[test]
    fn test_edit_description_and_close_time() {
        let now = Utc::now();
        let signal = btc_signal("s1", "alice", now);
        let edit = SignalEdit {
            description: Some("Moved stop".to_string()),
            close_time: Some(now + Duration::hours(3)),
        };

        let updated = validate_edit(&signal, edit, now).unwrap();
        assert_eq!(updated.description, "Moved stop");
        assert_eq!(updated.close_time, now + Duration::hours(3));
        assert_eq!(updated.entry, signal.entry);
    }

    #[test]
    fn test_edit_rejects_close_before_open() {
        let now = Utc::now();
        let signal = btc_signal("s1", "alice", now);
        let edit = SignalEdit {
            description: None,
            close_time: Some(signal.open_time - Duration::minutes(1)),
        };

        let errors = validate_edit(&signal, edit, now).unwrap_err();
        assert!(errors.has(Field::CloseTime));
    }

    #[test]
    fn test_edit_closed_signal_close_time_rejected() {
        let now = Utc::now();
        let mut signal = btc_signal("s1", "alice", now);
        signal.status = SignalStatus::Closed;
        let edit = SignalEdit {
            description: None,
            close_time: Some(now + Duration::days(1)),
        };

        assert!(validate_edit(&signal, edit, now).is_err());
    }
}
