use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};
use tokio::spawn;
use zbus::export::ordered_stream::{self, OrderedStreamExt};
use zbus::fdo::{RequestNameFlags, RequestNameReply};
use zbus::names::BusName;
use zbus::Connection;

use crate::error::{Error, Result};
use crate::item::{split_identifier, Item};
use crate::proxy::{
    StatusNotifierItemRegistered, StatusNotifierItemUnregistered, StatusNotifierWatcherProxy,
};
use crate::task::{dispatch_guarded, Consumer};

type ItemCallback = Box<dyn Fn(&Item) + Send + Sync>;
type CallbackSlot = Arc<RwLock<Option<ItemCallback>>>;

#[derive(Default)]
struct HostState {
    items: HashMap<String, Item>,
    closed: bool,
}

enum ItemEvent {
    Registered(StatusNotifierItemRegistered),
    Unregistered(StatusNotifierItemUnregistered),
}

/// A StatusNotifierHost: the consumer side of the tray.
///
/// The host announces itself to the watcher, mirrors the watcher's item set
/// as one [`Item`] per application, and reports churn through the
/// registration callbacks. It owns its items: closing the host closes all
/// of them.
pub struct Host {
    connection: Connection,
    name: String,
    state: Arc<RwLock<HostState>>,
    on_registered: CallbackSlot,
    on_unregistered: CallbackSlot,
    consumer: Mutex<Option<Consumer>>,
}

impl Host {
    /// Create a host named `org.kde.StatusNotifierHost-<id>`. The id keeps
    /// host names unique on the bus; the process id is the usual choice.
    /// Nothing touches the bus until [`listen`](Self::listen).
    pub fn new(connection: &Connection, id: impl fmt::Display) -> Self {
        Self {
            connection: connection.clone(),
            name: format!("org.kde.StatusNotifierHost-{id}"),
            state: Arc::default(),
            on_registered: Arc::default(),
            on_unregistered: Arc::default(),
            consumer: Mutex::new(None),
        }
    }

    /// Well-known bus name of this host.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a callback that runs for every item joining the tray,
    /// including the items found at listen time. Set it before
    /// [`listen`](Self::listen).
    pub fn on_registered<F>(&self, callback: F)
    where
        F: Fn(&Item) + Send + Sync + 'static,
    {
        *self.on_registered.write().unwrap() = Some(Box::new(callback));
    }

    /// Register a callback that runs for every item leaving the tray, right
    /// before the item is closed. Set it before [`listen`](Self::listen).
    pub fn on_unregistered<F>(&self, callback: F)
    where
        F: Fn(&Item) + Send + Sync + 'static,
    {
        *self.on_unregistered.write().unwrap() = Some(Box::new(callback));
    }

    /// Claim the host name, announce it to the watcher, pick up the items
    /// that are already registered, and start following registrations.
    pub async fn listen(&self) -> Result<()> {
        if self.state.read().unwrap().closed {
            return Err(Error::AlreadyClosed);
        }

        match self
            .connection
            .request_name_with_flags(self.name.as_str(), RequestNameFlags::DoNotQueue.into())
            .await
        {
            Ok(RequestNameReply::PrimaryOwner) => {}
            Ok(_) => return Err(Error::NameUnavailable(self.name.clone())),
            Err(zbus::Error::NameTaken) => return Err(Error::NameUnavailable(self.name.clone())),
            Err(e) => return Err(e.into()),
        }

        let watcher = StatusNotifierWatcherProxy::new(&self.connection).await?;
        let host_name = BusName::try_from(self.name.as_str()).map_err(zbus::Error::from)?;
        watcher.register_status_notifier_host(host_name).await.map_err(|e| {
            debug!("failed to register with the watcher: {e}");
            Error::NoWatcher
        })?;

        // Subscribe before the snapshot; a registration in between shows up
        // as a duplicate, which the consumer ignores, rather than a gap.
        let registered = watcher.receive_status_notifier_item_registered().await?;
        let unregistered = watcher.receive_status_notifier_item_unregistered().await?;

        for identifier in watcher.registered_status_notifier_items().await.unwrap_or_default() {
            register_item(&self.connection, &self.state, &self.on_registered, &identifier).await;
        }

        let consumer = spawn({
            let connection = self.connection.clone();
            let state = self.state.clone();
            let on_registered = self.on_registered.clone();
            let on_unregistered = self.on_unregistered.clone();
            async move {
                let mut events = ordered_stream::join(
                    OrderedStreamExt::map(registered, ItemEvent::Registered),
                    OrderedStreamExt::map(unregistered, ItemEvent::Unregistered),
                );
                while let Some(event) = events.next().await {
                    match event {
                        ItemEvent::Registered(signal) => match signal.args() {
                            Ok(args) => {
                                register_item(&connection, &state, &on_registered, args.service)
                                    .await;
                            }
                            Err(e) => debug!("ignoring malformed registration signal: {e}"),
                        },
                        ItemEvent::Unregistered(signal) => match signal.args() {
                            Ok(args) => {
                                unregister_item(&state, &on_unregistered, args.service);
                            }
                            Err(e) => debug!("ignoring malformed unregistration signal: {e}"),
                        },
                    }
                }
            }
        });
        *self.consumer.lock().unwrap() = Some(Consumer::new(consumer));

        Ok(())
    }

    /// Snapshot of the currently registered items.
    pub fn items(&self) -> Vec<Item> {
        self.state.read().unwrap().items.values().cloned().collect()
    }

    /// Release the host name, stop following the watcher, and close every
    /// item. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        if self.state.read().unwrap().closed {
            return Ok(());
        }

        if let Some(consumer) = self.consumer.lock().unwrap().take() {
            consumer.stop();
        }

        let released = self.connection.release_name(self.name.as_str()).await;

        {
            let mut state = self.state.write().unwrap();
            state.closed = true;
            for item in state.items.values() {
                item.close();
            }
            state.items.clear();
        }

        *self.on_registered.write().unwrap() = None;
        *self.on_unregistered.write().unwrap() = None;

        released.map_err(|e| {
            warn!("failed to release host name {}: {e}", self.name);
            Error::from(e)
        })?;
        Ok(())
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Track one more item, unless its unique name is already known or it turns
/// out not to be an item at all. Failures only cost us this item.
async fn register_item(
    connection: &Connection,
    state: &Arc<RwLock<HostState>>,
    on_registered: &CallbackSlot,
    identifier: &str,
) {
    let Ok((unique_name, object_path)) = split_identifier(identifier) else {
        debug!("ignoring malformed item identifier {identifier:?}");
        return;
    };

    {
        let state = state.read().unwrap();
        if state.closed || state.items.contains_key(unique_name) {
            return;
        }
    }

    let item = match Item::new(connection, unique_name, object_path).await {
        Ok(item) => item,
        Err(e) => {
            debug!("skipping item {identifier:?}: {e}");
            return;
        }
    };

    let mut state = state.write().unwrap();
    if state.closed || state.items.contains_key(unique_name) {
        drop(state);
        item.close();
        return;
    }
    state.items.insert(unique_name.to_owned(), item);
    if let Some(callback) = on_registered.read().unwrap().as_ref() {
        if let Some(item) = state.items.get(unique_name) {
            dispatch_guarded("registration", || callback(item));
        }
    }
}

/// Forget an item. The callback runs while the item is still alive so it
/// can read the final properties; only then is the item closed.
fn unregister_item(
    state: &Arc<RwLock<HostState>>,
    on_unregistered: &CallbackSlot,
    identifier: &str,
) {
    let Ok((unique_name, _)) = split_identifier(identifier) else {
        debug!("ignoring malformed item identifier {identifier:?}");
        return;
    };

    let mut state = state.write().unwrap();
    if let Some(item) = state.items.get(unique_name) {
        if let Some(callback) = on_unregistered.read().unwrap().as_ref() {
            dispatch_guarded("unregistration", || callback(item));
        }
        item.close();
    }
    state.items.remove(unique_name);
}
