use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use log::{info, warn};
use tokio::task::JoinSet;
use zbus::fdo::{self, DBusProxy, RequestNameFlags, RequestNameReply};
use zbus::message::Header;
use zbus::names::BusName;
use zbus::object_server::{Interface, SignalEmitter};
use zbus::{interface, Connection};

use crate::error::{Error, Result};
use crate::host::Host;
use crate::item::split_identifier;
use crate::proxy::StatusNotifierItemProxy;

pub const WATCHER_BUS_NAME: &str = "org.kde.StatusNotifierWatcher";
pub const WATCHER_OBJECT_PATH: &str = "/StatusNotifierWatcher";

#[derive(Debug, Default)]
struct WatcherState {
    items: Vec<String>,
    hosts: Vec<String>,
    closed: bool,
    listening: bool,
}

impl WatcherState {
    /// Append an item identifier, keeping registration order. Returns false
    /// when it is already present.
    fn insert_item(&mut self, identifier: &str) -> bool {
        if self.items.iter().any(|item| item == identifier) {
            return false;
        }
        self.items.push(identifier.to_owned());
        true
    }

    /// Remove one item registered by the given bus name, returning its
    /// identifier.
    fn remove_item_by_owner(&mut self, unique_name: &str) -> Option<String> {
        let index = self.items.iter().position(|item| {
            split_identifier(item).is_ok_and(|(owner, _)| owner == unique_name)
        })?;
        Some(self.items.remove(index))
    }

    fn insert_host(&mut self, name: &str) -> bool {
        if self.hosts.iter().any(|host| host == name) {
            return false;
        }
        self.hosts.push(name.to_owned());
        true
    }

    fn remove_host(&mut self, name: &str) -> bool {
        let Some(index) = self.hosts.iter().position(|host| host == name) else {
            return false;
        };
        self.hosts.remove(index);
        true
    }
}

/// Which population a liveness task cleans up after.
enum Population {
    Item,
    Host,
}

/// The org.kde.StatusNotifierWatcher service.
///
/// Exactly one watcher should run per bus. It accepts item and host
/// registrations, drops registrants when their bus name loses its owner,
/// and broadcasts the churn so hosts can keep up.
pub struct Watcher {
    connection: Connection,
    state: Arc<Mutex<WatcherState>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Watcher {
    /// Create a watcher. Nothing touches the bus until
    /// [`listen`](Self::listen).
    pub fn new(connection: &Connection) -> Self {
        Self {
            connection: connection.clone(),
            state: Arc::default(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Claim the watcher name and start serving registrations.
    ///
    /// Fails with [`Error::NameUnavailable`] when another watcher already
    /// owns the name, and with [`Error::AlreadyClosed`] after
    /// [`close`](Self::close).
    pub async fn listen(&self) -> Result<()> {
        if self.state.lock().unwrap().closed {
            return Err(Error::AlreadyClosed);
        }

        match self
            .connection
            .request_name_with_flags(WATCHER_BUS_NAME, RequestNameFlags::DoNotQueue.into())
            .await
        {
            Ok(RequestNameReply::PrimaryOwner) => {}
            Ok(_) => return Err(Error::NameUnavailable(WATCHER_BUS_NAME.to_owned())),
            Err(zbus::Error::NameTaken) => {
                return Err(Error::NameUnavailable(WATCHER_BUS_NAME.to_owned()))
            }
            Err(e) => return Err(e.into()),
        }

        let service =
            WatcherService { state: self.state.clone(), tasks: self.tasks.clone() };
        match self.connection.object_server().at(WATCHER_OBJECT_PATH, service).await {
            Ok(true) => {}
            Ok(false) => {
                let _ = self.connection.release_name(WATCHER_BUS_NAME).await;
                return Err(Error::Transport(zbus::Error::Failure(format!(
                    "an object is already exported at {WATCHER_OBJECT_PATH}"
                ))));
            }
            Err(e) => {
                let _ = self.connection.release_name(WATCHER_BUS_NAME).await;
                return Err(e.into());
            }
        }

        self.state.lock().unwrap().listening = true;
        info!("serving {WATCHER_BUS_NAME}");
        Ok(())
    }

    /// Register a local [`Host`] without a round trip over the bus.
    pub async fn register_host(&self, host: &Host) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.closed {
                return Err(Error::AlreadyClosed);
            }
            if !state.listening {
                return Err(Error::Transport(zbus::Error::Failure(
                    "watcher is not listening".to_owned(),
                )));
            }
        }
        register_host(&self.connection, &self.state, &self.tasks, host.name())
            .await
            .map_err(|e| Error::Transport(zbus::Error::FDO(Box::new(e))))
    }

    /// Identifiers of the registered items, oldest first.
    pub fn items(&self) -> Vec<String> {
        self.state.lock().unwrap().items.clone()
    }

    /// Bus names of the registered hosts, oldest first.
    pub fn hosts(&self) -> Vec<String> {
        self.state.lock().unwrap().hosts.clone()
    }

    /// Whether at least one host is registered. Items tend to fall back to
    /// the legacy tray protocol while this is false.
    pub fn is_host_registered(&self) -> bool {
        !self.state.lock().unwrap().hosts.is_empty()
    }

    /// Release the watcher name and stop every owner watch. The watcher
    /// cannot be reused afterwards; calling close again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let was_listening = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.listening
        };

        self.tasks.lock().unwrap().abort_all();

        if was_listening {
            if let Err(e) = self
                .connection
                .object_server()
                .remove::<WatcherService, _>(WATCHER_OBJECT_PATH)
                .await
            {
                warn!("failed to remove the watcher object: {e}");
            }
            self.connection.release_name(WATCHER_BUS_NAME).await?;
        }

        Ok(())
    }
}

struct WatcherService {
    state: Arc<Mutex<WatcherState>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

#[interface(name = "org.kde.StatusNotifierWatcher")]
impl WatcherService {
    /// Register an item, either by its own bus name or by an object path
    /// (in which case the bus name is taken from the message sender).
    async fn register_status_notifier_item(
        &self,
        service: &str,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<()> {
        let (unique_name, object_path) = if service.starts_with('/') {
            let Some(sender) = header.sender() else {
                return Err(fdo::Error::InvalidArgs("unknown message sender".to_owned()));
            };
            (sender.to_string(), service.to_owned())
        } else {
            (service.to_owned(), StatusNotifierItemProxy::DEFAULT_PATH.to_owned())
        };

        register_item(connection, &self.state, &self.tasks, &unique_name, &object_path).await
    }

    /// Register a host by its well-known bus name.
    async fn register_status_notifier_host(
        &self,
        service: &str,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<()> {
        register_host(connection, &self.state, &self.tasks, service).await
    }

    #[zbus(property)]
    async fn registered_status_notifier_items(&self) -> Vec<String> {
        self.state.lock().unwrap().items.clone()
    }

    #[zbus(property)]
    async fn is_status_notifier_host_registered(&self) -> bool {
        !self.state.lock().unwrap().hosts.is_empty()
    }

    #[zbus(property)]
    fn protocol_version(&self) -> i32 {
        1
    }

    #[zbus(signal)]
    async fn status_notifier_item_registered(
        emitter: &SignalEmitter<'_>,
        service: &str,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn status_notifier_item_unregistered(
        emitter: &SignalEmitter<'_>,
        service: &str,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn status_notifier_host_registered(
        emitter: &SignalEmitter<'_>,
        service: &str,
    ) -> zbus::Result<()>;
}

async fn register_item(
    connection: &Connection,
    state: &Arc<Mutex<WatcherState>>,
    tasks: &Arc<Mutex<JoinSet<()>>>,
    unique_name: &str,
    object_path: &str,
) -> fdo::Result<()> {
    let identifier = format!("{unique_name}{object_path}");

    {
        let state = state.lock().unwrap();
        if state.closed {
            return Err(fdo::Error::Failed("watcher is closed".to_owned()));
        }
        if state.items.iter().any(|item| item == &identifier) {
            info!("item {identifier} is already registered");
            return Ok(());
        }
    }

    // Only accept registrants that actually answer SNI property requests.
    if !probe_item(connection, unique_name, object_path).await {
        info!("rejecting {identifier}: no org.kde.StatusNotifierItem there");
        return Err(fdo::Error::UnknownInterface(
            "service does not implement org.kde.StatusNotifierItem".to_owned(),
        ));
    }

    {
        let mut state = state.lock().unwrap();
        if state.closed {
            return Err(fdo::Error::Failed("watcher is closed".to_owned()));
        }
        if !state.insert_item(&identifier) {
            return Ok(());
        }
    }
    info!("new item: {identifier}");

    spawn_owner_watch(connection, state, tasks, unique_name, Population::Item);

    let emitter = signal_emitter(connection)?;
    WatcherService::status_notifier_item_registered(&emitter, &identifier)
        .await
        .map_err(internal)?;
    invalidate_property(&emitter, "RegisteredStatusNotifierItems").await.map_err(internal)?;

    Ok(())
}

async fn register_host(
    connection: &Connection,
    state: &Arc<Mutex<WatcherState>>,
    tasks: &Arc<Mutex<JoinSet<()>>>,
    name: &str,
) -> fdo::Result<()> {
    {
        let mut state = state.lock().unwrap();
        if state.closed {
            return Err(fdo::Error::Failed("watcher is closed".to_owned()));
        }
        if !state.insert_host(name) {
            info!("host {name} is already registered");
            return Ok(());
        }
    }
    info!("new host: {name}");

    spawn_owner_watch(connection, state, tasks, name, Population::Host);

    let emitter = signal_emitter(connection)?;
    WatcherService::status_notifier_host_registered(&emitter, name).await.map_err(internal)?;
    invalidate_property(&emitter, "IsStatusNotifierHostRegistered").await.map_err(internal)?;

    Ok(())
}

/// Whether a StatusNotifierItem answers property requests at the address.
async fn probe_item(connection: &Connection, unique_name: &str, object_path: &str) -> bool {
    let builder = StatusNotifierItemProxy::builder(connection)
        .destination(unique_name.to_owned())
        .and_then(|builder| builder.path(object_path.to_owned()));
    match builder {
        Ok(builder) => match builder.build().await {
            Ok(proxy) => proxy.title().await.is_ok(),
            Err(_) => false,
        },
        Err(_) => false,
    }
}

/// Watch the owner of `name` and unregister it from the given population
/// when the name drops off the bus.
fn spawn_owner_watch(
    connection: &Connection,
    state: &Arc<Mutex<WatcherState>>,
    tasks: &Arc<Mutex<JoinSet<()>>>,
    name: &str,
    population: Population,
) {
    let connection = connection.clone();
    let state = state.clone();
    let name = name.to_owned();

    tasks.lock().unwrap().spawn(async move {
        if let Err(e) = wait_for_name_exit(&connection, &name).await {
            warn!("stopped watching the owner of {name}: {e}");
            return;
        }
        match population {
            Population::Item => unregister_item_owner(&connection, &state, &name).await,
            Population::Host => unregister_host(&connection, &state, &name).await,
        }
    });
}

/// Resolve once the name has no owner. Returns immediately when it has none
/// to begin with.
async fn wait_for_name_exit(connection: &Connection, name: &str) -> zbus::Result<()> {
    let dbus = DBusProxy::new(connection).await?;
    let mut owner_changes = dbus.receive_name_owner_changed_with_args(&[(0, name)]).await?;

    if !dbus.name_has_owner(BusName::try_from(name)?).await? {
        return Ok(());
    }

    while let Some(signal) = owner_changes.next().await {
        let Ok(args) = signal.args() else { continue };
        if args.new_owner().is_none() {
            break;
        }
    }

    Ok(())
}

async fn unregister_item_owner(
    connection: &Connection,
    state: &Arc<Mutex<WatcherState>>,
    unique_name: &str,
) {
    let Some(identifier) = state.lock().unwrap().remove_item_by_owner(unique_name) else {
        return;
    };
    info!("lost item: {identifier}");

    let Ok(emitter) = signal_emitter(connection) else { return };
    if let Err(e) = WatcherService::status_notifier_item_unregistered(&emitter, &identifier).await
    {
        warn!("failed to announce the loss of {identifier}: {e}");
    }
    if let Err(e) = invalidate_property(&emitter, "RegisteredStatusNotifierItems").await {
        warn!("failed to republish the item list: {e}");
    }
}

async fn unregister_host(connection: &Connection, state: &Arc<Mutex<WatcherState>>, name: &str) {
    if !state.lock().unwrap().remove_host(name) {
        return;
    }
    info!("lost host: {name}");

    let Ok(emitter) = signal_emitter(connection) else { return };
    if let Err(e) = invalidate_property(&emitter, "IsStatusNotifierHostRegistered").await {
        warn!("failed to republish the host flag: {e}");
    }
}

fn signal_emitter(connection: &Connection) -> fdo::Result<SignalEmitter<'_>> {
    SignalEmitter::new(connection, WATCHER_OBJECT_PATH).map_err(internal)
}

/// Tell property subscribers to fetch a fresh value.
async fn invalidate_property(emitter: &SignalEmitter<'_>, property: &str) -> zbus::Result<()> {
    zbus::fdo::Properties::properties_changed(
        emitter,
        WatcherService::name(),
        HashMap::new(),
        std::borrow::Cow::Borrowed(&[property]),
    )
    .await
}

fn internal(e: zbus::Error) -> fdo::Error {
    fdo::Error::Failed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_keep_registration_order_without_duplicates() {
        let mut state = WatcherState::default();
        assert!(state.insert_item(":1.2/StatusNotifierItem"));
        assert!(state.insert_item(":1.1/StatusNotifierItem"));
        assert!(!state.insert_item(":1.2/StatusNotifierItem"));

        assert_eq!(state.items, vec![":1.2/StatusNotifierItem", ":1.1/StatusNotifierItem"]);
    }

    #[test]
    fn removal_matches_the_owner_component_exactly() {
        let mut state = WatcherState::default();
        state.insert_item(":1.10/StatusNotifierItem");
        state.insert_item(":1.1/StatusNotifierItem");

        let removed = state.remove_item_by_owner(":1.1");
        assert_eq!(removed.as_deref(), Some(":1.1/StatusNotifierItem"));
        assert_eq!(state.items, vec![":1.10/StatusNotifierItem"]);

        assert_eq!(state.remove_item_by_owner(":1.99"), None);
    }

    #[test]
    fn one_owner_may_register_several_paths() {
        let mut state = WatcherState::default();
        state.insert_item(":1.7/StatusNotifierItem");
        state.insert_item(":1.7/org/ayatana/NotificationItem/foo");

        assert!(state.remove_item_by_owner(":1.7").is_some());
        assert!(state.remove_item_by_owner(":1.7").is_some());
        assert!(state.remove_item_by_owner(":1.7").is_none());
    }

    #[test]
    fn hosts_are_matched_whole() {
        let mut state = WatcherState::default();
        assert!(state.insert_host("org.kde.StatusNotifierHost-42"));
        assert!(!state.insert_host("org.kde.StatusNotifierHost-42"));

        assert!(!state.remove_host("org.kde.StatusNotifierHost-4"));
        assert!(state.remove_host("org.kde.StatusNotifierHost-42"));
        assert!(state.hosts.is_empty());
    }

    #[test]
    fn shared_owner_leaves_both_populations_independently() {
        let mut state = WatcherState::default();
        state.insert_item(":1.5/StatusNotifierItem");
        state.insert_host(":1.5");

        assert!(state.remove_item_by_owner(":1.5").is_some());
        assert!(state.remove_host(":1.5"));
        assert!(state.remove_item_by_owner(":1.5").is_none());
        assert!(!state.remove_host(":1.5"));
    }
}
