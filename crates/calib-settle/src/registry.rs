use std::collections::HashMap;

use calib_settle_core::{ConfigError, GridGeometry};

use crate::coordinator::{BusyPolicy, Coordinator};

/// Owned registry of per-channel coordinators, keyed by camera/channel id.
///
/// One coordinator (and thus at most one active settle request) per channel;
/// there is no cross-channel interface and no global state.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Coordinator>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. Replaces any previous coordinator for the same id
    /// (its in-flight request, if any, is dropped with it).
    pub fn register(
        &mut self,
        channel: impl Into<String>,
        geometry: GridGeometry,
        policy: BusyPolicy,
    ) -> Result<&mut Coordinator, ConfigError> {
        use std::collections::hash_map::Entry;

        let channel = channel.into();
        let coordinator = Coordinator::new(channel.clone(), geometry, policy)?;
        match self.channels.entry(channel) {
            Entry::Occupied(mut entry) => {
                entry.insert(coordinator);
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => Ok(entry.insert(coordinator)),
        }
    }

    pub fn coordinator_mut(&mut self, channel: &str) -> Option<&mut Coordinator> {
        self.channels.get_mut(channel)
    }

    pub fn coordinator(&self, channel: &str) -> Option<&Coordinator> {
        self.channels.get(channel)
    }

    pub fn remove(&mut self, channel: &str) -> Option<Coordinator> {
        self.channels.remove(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}
