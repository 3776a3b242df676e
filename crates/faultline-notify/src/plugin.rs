use crate::error::{NotifyError, Result};
use crate::NotificationChannel;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Factory for creating [`NotificationChannel`] instances from JSON
/// configuration.
///
/// Each plugin is registered in the [`ChannelRegistry`] by its `name()`.
/// Channel-level configuration (SMTP server, SMS gateway) comes from the
/// server config; per-target parameters travel in the resolved
/// [`crate::Delivery`] instead.
pub trait ChannelPlugin: Send + Sync {
    /// Returns the plugin type name (e.g. `"email"`, `"dingtalk"`).
    fn name(&self) -> &str;

    /// Describes the kind of recipient this channel accepts
    /// (e.g. `"email"`, `"phone"`, `"webhook_url"`).
    fn recipient_type(&self) -> &str;

    /// Validates a JSON config blob against this plugin's expected schema.
    fn validate_config(&self, config: &Value) -> Result<()>;

    /// Creates a configured channel instance from a validated JSON config.
    /// `instance_id` identifies the shared instance in logs.
    fn create_channel(
        &self,
        instance_id: &str,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>>;
}

/// Registry of channel plugins plus the pool of shared channel instances.
///
/// Plugins are factories keyed by type name; instances are the live,
/// reusable clients (SMTP transport, HTTP client) keyed by the same name
/// and managed with explicit `set`/`get`/`remove` so nothing hides in
/// process-wide globals.
///
/// # Examples
///
/// ```
/// use faultline_notify::plugin::ChannelRegistry;
///
/// let registry = ChannelRegistry::default();
/// assert!(registry.has_plugin("email"));
/// assert!(registry.has_plugin("webhook"));
/// assert!(registry.has_plugin("dingtalk"));
/// assert!(registry.has_plugin("sms"));
/// assert!(!registry.has_plugin("nonexistent"));
/// ```
pub struct ChannelRegistry {
    plugins: HashMap<String, Box<dyn ChannelPlugin>>,
    instances: RwLock<HashMap<String, Arc<dyn NotificationChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    fn instances_read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn NotificationChannel>>> {
        self.instances
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn instances_write(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn NotificationChannel>>> {
        self.instances
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn ChannelPlugin>) {
        let name = plugin.name().to_string();
        self.plugins.insert(name, plugin);
    }

    pub fn get_plugin(&self, type_name: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(type_name).map(|p| p.as_ref())
    }

    pub fn has_plugin(&self, type_name: &str) -> bool {
        self.plugins.contains_key(type_name)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }

    /// Validate config through the matching plugin and install the shared
    /// instance under the plugin's type name.
    pub fn configure(&self, type_name: &str, config: &Value) -> Result<()> {
        let plugin = self
            .plugins
            .get(type_name)
            .ok_or_else(|| NotifyError::UnknownChannelType(type_name.to_string()))?;
        plugin.validate_config(config)?;
        let channel = plugin.create_channel(type_name, config)?;
        self.set(type_name, channel);
        Ok(())
    }

    /// Install (or replace) a shared channel instance.
    pub fn set(&self, instance_id: &str, channel: Arc<dyn NotificationChannel>) {
        self.instances_write()
            .insert(instance_id.to_string(), channel);
    }

    /// The shared instance for a channel type, if one was configured.
    pub fn get(&self, instance_id: &str) -> Option<Arc<dyn NotificationChannel>> {
        self.instances_read().get(instance_id).cloned()
    }

    /// Drop a shared instance. Returns false when none existed.
    pub fn remove(&self, instance_id: &str) -> bool {
        self.instances_write().remove(instance_id).is_some()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register_plugin(Box::new(crate::channels::webhook::WebhookPlugin));
        registry.register_plugin(Box::new(crate::channels::email::EmailPlugin));
        registry.register_plugin(Box::new(crate::channels::sms::SmsPlugin));
        registry.register_plugin(Box::new(crate::channels::dingtalk::DingTalkPlugin));
        registry
    }
}
