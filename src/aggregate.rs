//! Fan-out/fan-in over the [`ProviderBus`].
//!
//! Every provider call for a query is issued at once, the engine then waits
//! for all of them to settle and reduces the outcomes into one flat list.
//! Provider failures never reach the caller as an `Err`: depending on the
//! [`ErrorMode`] they are dropped, broadcast on `<topic>-error`, or returned
//! as data next to the values.

use std::{fmt, ops::BitOr, panic::AssertUnwindSafe, time::Instant};

use futures::{
    FutureExt,
    stream::{FuturesUnordered, StreamExt},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    bus::{ProviderBus, Query, RETRIEVE_PARTIES, RETRIEVE_PARTY_EVENTS},
    error::{CourtbotError, Rejection, retrieval_settings},
};

/// Two-bit flag controlling what happens to provider failures.
///
/// - bit 0 ([`ErrorMode::SILENT`]): do not fire the `<topic>-error` broadcast
/// - bit 1 ([`ErrorMode::RECORD`]): return `{ values, errors }` instead of a flat list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorMode(u8);

impl ErrorMode {
    pub const DEFAULT: ErrorMode = ErrorMode(0);
    pub const SILENT: ErrorMode = ErrorMode(0b01);
    pub const RECORD: ErrorMode = ErrorMode(0b10);

    pub fn from_bits(bits: u8) -> Self {
        ErrorMode(bits & 0b11)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn broadcasts(&self) -> bool {
        self.0 & Self::SILENT.0 == 0
    }

    pub fn returns_record(&self) -> bool {
        self.0 & Self::RECORD.0 != 0
    }
}

impl BitOr for ErrorMode {
    type Output = ErrorMode;

    fn bitor(self, rhs: ErrorMode) -> ErrorMode {
        ErrorMode(self.0 | rhs.0)
    }
}

/// Values and errors of one aggregation, side by side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateRecord {
    pub values: Vec<Value>,
    pub errors: Vec<CourtbotError>,
}

/// What an aggregation returns; the shape is picked by [`ErrorMode::RECORD`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Aggregated {
    Values(Vec<Value>),
    Record(AggregateRecord),
}

impl Aggregated {
    pub fn values(&self) -> &[Value] {
        match self {
            Aggregated::Values(values) => values,
            Aggregated::Record(record) => &record.values,
        }
    }

    /// Errors are only kept in record shape; a flat result has none.
    pub fn errors(&self) -> &[CourtbotError] {
        match self {
            Aggregated::Values(_) => &[],
            Aggregated::Record(record) => &record.errors,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Aggregated::Record(_))
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            Aggregated::Values(values) => values,
            Aggregated::Record(record) => record.values,
        }
    }

    pub fn into_record(self) -> AggregateRecord {
        match self {
            Aggregated::Values(values) => AggregateRecord { values, errors: Vec::new() },
            Aggregated::Record(record) => record,
        }
    }
}

impl fmt::Display for Aggregated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} value(s), {} error(s)", self.values().len(), self.errors().len())
    }
}

/// One level of flattening: an array contributes its elements, anything
/// else contributes itself.
fn flatten_into(values: &mut Vec<Value>, outcome: Value) {
    match outcome {
        Value::Array(items) => values.extend(items),
        other => values.push(other),
    }
}

/// Publish `query` on `topic`, settle everything the providers attached and
/// reduce the outcomes according to `mode`.
#[tracing::instrument(name = "aggregate", skip(bus), fields(case = %query.case_id))]
pub async fn aggregate(bus: &ProviderBus, topic: &str, query: &Query, mode: ErrorMode) -> Aggregated {
    let start = Instant::now();

    // 1) fan out: the collector is a snapshot of what the providers attached
    let collector = bus.publish(topic, query);
    let fan_out = collector.len();

    // 2) fan in, in settlement order; a panicking entry settles as a rejection
    let mut in_flight: FuturesUnordered<_> = collector
        .into_pending()
        .into_iter()
        .map(|pending| AssertUnwindSafe(pending).catch_unwind())
        .collect();
    let mut values = Vec::new();
    let mut errors = Vec::new();
    while let Some(settled) = in_flight.next().await {
        let outcome = settled.unwrap_or_else(|payload| Err(Rejection::from_panic(payload)));
        match outcome {
            Ok(value) => flatten_into(&mut values, value),
            Err(rejection) => {
                let settings = retrieval_settings(topic, &query.case_id, &rejection);
                errors.push(CourtbotError::wrap_if_needed(rejection, settings));
            }
        }
    }

    debug!(
        topic,
        fan_out,
        values = values.len(),
        errors = errors.len(),
        "aggregation settled in {} ms",
        start.elapsed().as_millis()
    );

    // 3) side channel
    if !errors.is_empty() && mode.broadcasts() {
        warn!(topic, case = %query.case_id, "{} provider(s) failed", errors.len());
        bus.emit_errors(topic, &errors);
    }

    // 4) shape
    if mode.returns_record() {
        Aggregated::Record(AggregateRecord { values, errors })
    } else {
        Aggregated::Values(values)
    }
}

/// All parties known for a case, across every provider.
pub async fn get_case_parties(bus: &ProviderBus, case_id: &str, mode: ErrorMode) -> Aggregated {
    aggregate(bus, RETRIEVE_PARTIES, &Query::case(case_id), mode).await
}

/// All events of one party on a case, across every provider.
pub async fn get_case_party_events(
    bus: &ProviderBus,
    case_id: &str,
    party_id: &str,
    mode: ErrorMode,
) -> Aggregated {
    aggregate(bus, RETRIEVE_PARTY_EVENTS, &Query::party(case_id, party_id), mode).await
}
