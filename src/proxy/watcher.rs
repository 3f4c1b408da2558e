use zbus::{names::BusName, proxy};

#[proxy(
    default_service = "org.kde.StatusNotifierWatcher",
    interface = "org.kde.StatusNotifierWatcher",
    default_path = "/StatusNotifierWatcher"
)]
pub trait StatusNotifierWatcher {
    /// Announce a StatusNotifierHost by its well-known bus name. The watcher
    /// notices on its own when the host later drops off the bus.
    fn register_status_notifier_host(&self, service: BusName<'_>) -> zbus::Result<()>;

    /// Announce a StatusNotifierItem, either by bus name or by object path.
    /// Registered items are broadcast to every running host.
    fn register_status_notifier_item(&self, service: &str) -> zbus::Result<()>;

    /// Identifiers of every registered item, oldest first.
    #[zbus(property)]
    fn registered_status_notifier_items(&self) -> zbus::Result<Vec<String>>;

    /// Whether at least one host is registered and running. Items without a
    /// host may fall back to the legacy system tray protocol.
    #[zbus(property)]
    fn is_status_notifier_host_registered(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn protocol_version(&self) -> zbus::Result<i32>;

    #[zbus(signal)]
    fn status_notifier_host_registered(&self) -> zbus::Result<()>;

    /// A new item appeared; the argument is its identifier on the bus.
    #[zbus(signal)]
    fn status_notifier_item_registered(&self, service: &str) -> zbus::Result<()>;

    /// An item dropped off the bus; the argument is its identifier.
    #[zbus(signal)]
    fn status_notifier_item_unregistered(&self, service: &str) -> zbus::Result<()>;
}
