use std::collections::HashMap;

use zbus::{proxy, zvariant};

/// The com.canonical.dbusmenu interface, which applications use to export
/// their tray menus over the bus.
///
/// Menu entries are identified by a numeric id and described by a property
/// dictionary. Servers omit properties that hold their default value; the
/// interesting ones are `type` ("standard" or "separator"), `label`,
/// `enabled`, `visible`, `icon-name`, `icon-data` (PNG bytes),
/// `toggle-type` ("checkmark", "radio" or absent), `toggle-state`
/// (0 = off, 1 = on, anything else indeterminate), and `children-display`
/// ("submenu" when the entry has children). Vendor extensions are prefixed
/// `x-<vendor>-`.
#[proxy(interface = "com.canonical.dbusmenu")]
pub trait DBusMenu {
    /// Fetch the layout under `parent_id` (0 for the root).
    ///
    /// `recursion_depth` bounds the tree: -1 delivers everything, 0 delivers
    /// the parent with no children, n > 0 delivers at most n levels.
    /// An empty `property_names` requests every property.
    ///
    /// The reply is the layout revision plus the recursive
    /// `(ia{sv}av)` structure, where each element of the child array is
    /// another such structure.
    fn get_layout(
        &self,
        parent_id: i32,
        recursion_depth: i32,
        property_names: &[&str],
    ) -> zbus::Result<(u32, (i32, HashMap<String, zvariant::OwnedValue>, Vec<zvariant::OwnedValue>))>;

    /// Fetch the properties of the listed entries (all entries when `ids` is
    /// empty), limited to `property_names` unless that too is empty.
    fn get_group_properties(
        &self,
        ids: &[i32],
        property_names: &[&str],
    ) -> zbus::Result<Vec<(i32, HashMap<String, zvariant::OwnedValue>)>>;

    /// Fetch a single property of a single entry.
    fn get_property(&self, id: i32, name: &str) -> zbus::Result<zvariant::OwnedValue>;

    /// Notify the application of an event on one entry. Standard kinds are
    /// "clicked" and "hovered"; vendor kinds are prefixed `x-<vendor>-`.
    fn event(
        &self,
        id: i32,
        event_id: &str,
        data: &zvariant::Value<'_>,
        timestamp: u32,
    ) -> zbus::Result<()>;

    /// Batch form of [`event`](Self::event); returns the ids that could not
    /// be found.
    fn event_group(
        &self,
        events: &[(i32, &str, &zvariant::Value<'_>, u32)],
    ) -> zbus::Result<Vec<i32>>;

    /// Tell the application the submenu under `id` is about to be shown.
    /// A `true` reply means the layout should be refreshed first.
    fn about_to_show(&self, id: i32) -> zbus::Result<bool>;

    /// Batch form of [`about_to_show`](Self::about_to_show); returns the ids
    /// needing an update and the ids that could not be found.
    fn about_to_show_group(&self, ids: &[i32]) -> zbus::Result<(Vec<i32>, Vec<i32>)>;

    /// Version of the dbusmenu protocol the application implements.
    #[zbus(property)]
    fn version(&self) -> zbus::Result<u32>;

    /// Text direction of the application, "ltr" or "rtl".
    #[zbus(property)]
    fn text_direction(&self) -> zbus::Result<String>;

    /// "normal" in almost all cases, "notice" when the menu should be shown
    /// with higher priority.
    #[zbus(property)]
    fn status(&self) -> zbus::Result<String>;

    /// Directories to search for the menu's named icons, most specific
    /// first.
    #[zbus(property)]
    fn icon_theme_path(&self) -> zbus::Result<Vec<String>>;

    /// Many property changes batched into one message: per-entry maps of new
    /// values, and per-entry lists of properties reset to their defaults.
    #[zbus(signal)]
    fn items_properties_updated(
        &self,
        updated_props: Vec<(i32, HashMap<String, zvariant::OwnedValue>)>,
        removed_props: Vec<(i32, Vec<String>)>,
    ) -> zbus::Result<()>;

    /// The layout changed up to `revision`; `parent` scopes the change to a
    /// subtree, or invalidates the whole layout when it is 0.
    #[zbus(signal)]
    fn layout_updated(&self, revision: u32, parent: i32) -> zbus::Result<()>;

    /// The application asks every attached display to open the menu under
    /// `id`, for instance because a hotkey fired.
    #[zbus(signal)]
    fn item_activation_requested(&self, id: i32, timestamp: u32) -> zbus::Result<()>;
}
