use crate::config::{self, TargetsSeedFile};
use chrono::Utc;
use faultline_common::id;
use faultline_notify::routing::{validate_target, NotificationTarget, Route};
use faultline_storage::{AlertStore, NotificationTargetFilter};
use std::collections::HashSet;

/// Import notification targets from a JSON seed file.
///
/// Seeding treats (tenant, name) as the identity: an existing name is
/// skipped, never updated. Entries that fail route parsing or target
/// validation are rejected individually; the rest of the file still loads.
pub async fn run_init_targets(config_path: &str, seed_path: &str) -> anyhow::Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = AlertStore::new(config.database.connection_url()).await?;

    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: TargetsSeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let tenants: HashSet<&str> = seed.targets.iter().map(|t| t.tenant_id.as_str()).collect();
    let mut existing_names: HashSet<(String, String)> = HashSet::new();
    for tenant in tenants {
        let rows = store
            .list_notification_targets(tenant, &NotificationTargetFilter::default(), 10000, 0)
            .await?;
        for row in rows {
            existing_names.insert((row.tenant_id, row.name));
        }
    }

    let mut created = 0u32;
    let mut skipped = 0u32;
    let mut rejected = 0u32;

    for t in &seed.targets {
        let key = (t.tenant_id.clone(), t.name.clone());
        if existing_names.contains(&key) {
            tracing::warn!(tenant_id = %t.tenant_id, name = %t.name, "Target already exists, skipping");
            skipped += 1;
            continue;
        }

        // Routes arrive as raw JSON in the seed; one bad entry rejects the
        // whole target rather than loading half of its route table.
        let routes: Vec<Route> = match t
            .routes
            .iter()
            .map(|v| serde_json::from_value(v.clone()))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(routes) => routes,
            Err(e) => {
                tracing::error!(name = %t.name, error = %e, "Invalid route entry, target rejected");
                rejected += 1;
                continue;
            }
        };

        let now = Utc::now();
        let target = NotificationTarget {
            id: id::next_id(),
            tenant_id: t.tenant_id.clone(),
            fault_center_id: t.fault_center_id.clone(),
            name: t.name.clone(),
            channel_type: t.channel_type.clone(),
            default_hook: t.default_hook.clone(),
            default_sign: t.default_sign.clone(),
            default_recipients: t.default_recipients.clone(),
            routes,
            duty_roster_id: t.duty_roster_id.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = validate_target(&target) {
            tracing::error!(name = %t.name, error = %e, "Target failed validation, rejected");
            rejected += 1;
            continue;
        }

        let row = match crate::api::targets::target_to_row(&target) {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(name = %t.name, error = %e, "Failed to serialize target, rejected");
                rejected += 1;
                continue;
            }
        };

        match store.insert_notification_target(&row).await {
            Ok(inserted) => {
                tracing::info!(name = %t.name, id = %inserted.id, "Notification target created");
                created += 1;
                existing_names.insert(key);
            }
            Err(e) => {
                tracing::error!(name = %t.name, error = %e, "Failed to create notification target");
            }
        }
    }

    tracing::info!(created, skipped, rejected, "init-targets completed");
    Ok(())
}
