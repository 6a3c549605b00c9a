//! Persisted configuration store (spec §6 "Persisted configuration
//! keys"). Stands in for the xenbus key-value tree: both sides read
//! and write string key/value pairs under an interface's node and
//! watch for the peer's changes.

use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// The well-known keys exchanged between frontend and backend over the
/// configuration channel (spec §6, plus bookkeeping keys the xenbus
/// watch loop also relies on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Handle,
    Mac,
    Rate,
    FeatureSg,
    FeatureRxNotify,
    TxRingRef,
    RxRingRef,
    EventChannel,
    FrontendId,
    Online,
    Removed,
}

impl ConfigKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Handle => "handle",
            ConfigKey::Mac => "mac",
            ConfigKey::Rate => "rate",
            ConfigKey::FeatureSg => "feature-sg",
            ConfigKey::FeatureRxNotify => "feature-rx-notify",
            ConfigKey::TxRingRef => "tx-ring-ref",
            ConfigKey::RxRingRef => "rx-ring-ref",
            ConfigKey::EventChannel => "event-channel",
            ConfigKey::FrontendId => "frontend-id",
            ConfigKey::Online => "online",
            ConfigKey::Removed => "removed",
        }
    }
}

/// A watch notification: some key under an interface's node changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEvent {
    pub key: ConfigKey,
    pub value: Option<String>,
}

/// Read/write/watch access to an interface's persisted configuration
/// node. `watch` fans changes out through a channel rather than a
/// callback so the state machine's dispatch loop can select on it
/// alongside event-channel notifications.
pub trait ConfigStore: Send + Sync {
    fn read(&self, key: ConfigKey) -> Option<String>;
    fn write(&self, key: ConfigKey, value: &str);
    fn watch(&self) -> Receiver<ConfigEvent>;
}

/// An in-memory configuration store, standing in for the real xenbus
/// client in tests and in the absence of a privileged store daemon.
#[derive(Default)]
pub struct MemConfigStore {
    values: Mutex<HashMap<&'static str, String>>,
    watchers: Mutex<Vec<Sender<ConfigEvent>>>,
}

impl MemConfigStore {
    pub fn new() -> Self {
        Self { values: Mutex::new(HashMap::new()), watchers: Mutex::new(Vec::new()) }
    }

    fn notify(&self, key: ConfigKey, value: Option<String>) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|tx| tx.send(ConfigEvent { key, value: value.clone() }).is_ok());
    }

    pub fn read_str(&self, key: ConfigKey) -> Option<String> {
        self.values.lock().get(key.as_str()).cloned()
    }

    pub fn write_str(&self, key: ConfigKey, value: String) {
        self.values.lock().insert(key.as_str(), value.clone());
        self.notify(key, Some(value));
    }

    pub fn remove(&self, key: ConfigKey) {
        self.values.lock().remove(key.as_str());
        self.notify(key, None);
    }
}

impl ConfigStore for MemConfigStore {
    fn read(&self, key: ConfigKey) -> Option<String> {
        self.read_str(key)
    }

    fn write(&self, key: ConfigKey, value: &str) {
        self.write_str(key, value.to_string());
    }

    fn watch(&self) -> Receiver<ConfigEvent> {
        let (tx, rx) = unbounded();
        self.watchers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let store = MemConfigStore::new();
        store.write(ConfigKey::Mac, "00:16:3e:00:00:01");
        assert_eq!(store.read(ConfigKey::Mac).as_deref(), Some("00:16:3e:00:00:01"));
    }

    #[test]
    fn watchers_see_writes() {
        let store = MemConfigStore::new();
        let rx = store.watch();
        store.write(ConfigKey::FeatureSg, "1");
        let event = rx.recv().unwrap();
        assert_eq!(event.key, ConfigKey::FeatureSg);
        assert_eq!(event.value.as_deref(), Some("1"));
    }

    #[test]
    fn removal_notifies_with_none() {
        let store = MemConfigStore::new();
        store.write(ConfigKey::Online, "1");
        let rx = store.watch();
        store.remove(ConfigKey::Online);
        let event = rx.recv().unwrap();
        assert_eq!(event.value, None);
    }
}
