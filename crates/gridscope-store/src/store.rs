//! ---
//! ems_section: "04-topology-store"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Active network slot, change fan-out, and query views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use gridscope_model::{Network, VersionToken};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::notifier::{ChangeCause, ChangeEvent, ChangeNotifier, Subscription};

/// Holder of the single active [`Network`].
///
/// Readers receive an `Arc` snapshot that stays valid and unchanged no matter
/// how many replacements happen afterwards. The write lock is held only for
/// the pointer swap.
///
/// Installs are serialised: the installed version only ever grows and change
/// events go out in install order.
pub struct TopologyStore {
    current: RwLock<Option<Arc<Network>>>,
    /// Held across swap and publish.
    install: Mutex<()>,
    /// Raw version of `current`, `0` while empty. Updated inside the write lock.
    version: AtomicU64,
    notifier: ChangeNotifier,
}

impl TopologyStore {
    pub fn new(notifier: ChangeNotifier) -> Self {
        Self {
            current: RwLock::new(None),
            install: Mutex::new(()),
            version: AtomicU64::new(0),
            notifier,
        }
    }

    /// Make `network` the current network and announce it to subscribers.
    pub fn replace(&self, network: Network) -> Arc<Network> {
        self.swap(network, ChangeCause::Uploaded)
    }

    /// Install a network rebuilt from a snapshot. Behaves like [`replace`](Self::replace).
    pub fn restore(&self, network: Network) -> Arc<Network> {
        self.swap(network, ChangeCause::Restored)
    }

    fn swap(&self, mut network: Network, cause: ChangeCause) -> Arc<Network> {
        let _install = self.install.lock();
        // A network built before the current one may arrive late.
        let installed = self.version.load(Ordering::Acquire);
        if network.version().get() <= installed {
            let built = network.version();
            let version = network.restamp();
            debug!(%built, %version, "restamped stale network");
        }
        let network = Arc::new(network);
        let previous = {
            let mut slot = self.current.write();
            self.version
                .store(network.version().get(), Ordering::Release);
            slot.replace(Arc::clone(&network))
        };

        info!(
            network_id = %network.id(),
            version = %network.version(),
            previous = ?previous.as_ref().map(|n| n.version()),
            cause = ?cause,
            "active network replaced"
        );
        self.notifier.publish(ChangeEvent {
            version: network.version(),
            network_id: network.id().to_owned(),
            cause,
            at: Utc::now(),
        });
        network
    }

    /// Consistent snapshot of the current network.
    pub fn current(&self) -> Result<Arc<Network>> {
        self.current
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(StoreError::NoNetworkLoaded)
    }

    /// Version of the current network without touching the network itself.
    pub fn current_version(&self) -> Option<VersionToken> {
        match self.version.load(Ordering::Acquire) {
            0 => None,
            raw => Some(VersionToken::from_raw(raw)),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new(ChangeNotifier::default())
    }
}
