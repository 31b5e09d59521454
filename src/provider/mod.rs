use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::{
    bus::{ProviderBus, RETRIEVE_PARTIES, RETRIEVE_PARTY_EVENTS},
    error::Rejection,
};

pub mod fixture;

pub use fixture::FixtureProvider;

/// A source of case data that answers both query topics.
///
/// This is the typed way to join the [`ProviderBus`]; closures subscribed
/// with [`ProviderBus::subscribe`] work just as well.
#[async_trait]
pub trait CaseDataProvider: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Party records for a case. Each record should carry a `name`.
    async fn parties(&self, case_id: &str) -> Result<Vec<Value>, Rejection>;

    /// Event records for one party of a case.
    async fn party_events(&self, case_id: &str, party_id: &str) -> Result<Vec<Value>, Rejection>;
}

/// Subscribe `provider` to `retrieve-parties` and `retrieve-party-events`.
///
/// Each publish attaches exactly one pending entry per topic.
pub fn register_provider<P: CaseDataProvider>(bus: &ProviderBus, provider: Arc<P>) {
    info!("registering case data provider `{}`", provider.name());

    let parties = provider.clone();
    bus.subscribe(RETRIEVE_PARTIES, move |query, collector| {
        let provider = parties.clone();
        let case_id = query.case_id.clone();
        collector.push(async move { provider.parties(&case_id).await.map(Value::Array) });
    });

    let events = provider;
    bus.subscribe(RETRIEVE_PARTY_EVENTS, move |query, collector| {
        let Some(party_id) = query.party_id.clone() else {
            collector.reject("retrieve-party-events requires a party id");
            return;
        };
        let provider = events.clone();
        let case_id = query.case_id.clone();
        collector.push(async move {
            provider
                .party_events(&case_id, &party_id)
                .await
                .map(Value::Array)
        });
    });
}

/// Errors raised while building a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),
}
