//! Connectivity policy for artwork downloads.

use crate::config::ArtworkConfig;

/// Connection class reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    None,
    Wifi,
    Ethernet,
    Mobile,
    Other,
}

impl ConnectionClass {
    /// Wifi and wired ethernet.
    pub fn is_unmetered(self) -> bool {
        matches!(self, Self::Wifi | Self::Ethernet)
    }
}

/// Current connectivity, queried right before every fetch.
pub trait ConnectivityMonitor: Send + Sync {
    fn current_class(&self) -> ConnectionClass;
}

pub struct NetworkGate;

impl NetworkGate {
    pub fn allows_fetch(config: &ArtworkConfig, class: ConnectionClass) -> bool {
        !config.wifi_only || class.is_unmetered()
    }

    /// True when a switch to `class` must cancel in-flight and pending work.
    pub fn should_cancel_on_change(config: &ArtworkConfig, class: ConnectionClass) -> bool {
        !Self::allows_fetch(config, class)
    }
}
