use crate::config::ChannelsConfig;
use faultline_event::cache::ActiveEventCache;
use faultline_event::silence::{CompiledSilence, SilenceSet};
use faultline_notify::plugin::ChannelRegistry;
use faultline_notify::utils::redact_sensitive_json;
use faultline_storage::AlertStore;
use std::sync::Arc;

/// Rebuild the in-memory active set from its durable mirror. Rows that no
/// longer parse are dropped with a warning instead of blocking startup.
pub async fn hydrate_active_events(
    store: &AlertStore,
    cache: &ActiveEventCache,
) -> anyhow::Result<usize> {
    let rows = store.load_active_events().await?;
    let mut loaded = 0usize;
    for row in rows {
        let id = row.id.clone();
        match row.into_event() {
            Ok(event) => {
                cache.upsert(event);
                loaded += 1;
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %id,
                    error = %e,
                    "Skipping unparseable active event row"
                );
            }
        }
    }
    Ok(loaded)
}

/// Recompile stored silences into the in-memory matcher set.
pub async fn hydrate_silences(store: &AlertStore, silences: &SilenceSet) -> anyhow::Result<usize> {
    let rows = store.load_silences().await?;
    let mut loaded = 0usize;
    for row in rows {
        let id = row.id.clone();
        let spec = match crate::api::silences::silence_from_row(row) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(
                    silence_id = %id,
                    error = %e,
                    "Skipping silence with malformed predicates"
                );
                continue;
            }
        };
        match CompiledSilence::compile(spec) {
            Ok(compiled) => {
                silences.insert(Arc::new(compiled));
                loaded += 1;
            }
            Err(e) => {
                tracing::warn!(
                    silence_id = %id,
                    error = %e,
                    "Skipping silence that no longer compiles"
                );
            }
        }
    }
    Ok(loaded)
}

/// Instantiate channel senders from the `[channels.*]` config sections.
/// A bad section disables that channel type, not the server.
pub fn configure_channels(registry: &ChannelRegistry, channels: &ChannelsConfig) {
    for (type_name, config) in channels.entries() {
        match registry.configure(type_name, config) {
            Ok(()) => {
                tracing::info!(
                    channel = type_name,
                    config = %redact_sensitive_json(config),
                    "Notification channel configured"
                );
            }
            Err(e) => {
                tracing::warn!(
                    channel = type_name,
                    error = %e,
                    "Failed to configure notification channel"
                );
            }
        }
    }
}
