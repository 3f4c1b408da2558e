use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::stream::select_all;
use futures::StreamExt;
use log::debug;
use tokio::spawn;
use zbus::zvariant::{OwnedValue, Value};
use zbus::Connection;

use crate::error::{Error, Result};
use crate::layout::LayoutNode;
use crate::proxy::{DBusMenuProxy, ItemActivationRequested, ItemsPropertiesUpdated, LayoutUpdated};
use crate::task::{dispatch_guarded, Consumer};

type LayoutUpdateCallback = Box<dyn Fn(i32) + Send + Sync>;
type PropertiesUpdateCallback =
    Box<dyn Fn(&[UpdatedProperties], &[RemovedProperties]) + Send + Sync>;
type ActivationCallback = Box<dyn Fn(i32) + Send + Sync>;

/// New property values for one menu entry, from an `ItemsPropertiesUpdated`
/// signal.
#[derive(Debug)]
pub struct UpdatedProperties {
    pub id: i32,
    pub properties: HashMap<String, OwnedValue>,
}

/// Properties one menu entry reset to their defaults.
#[derive(Debug)]
pub struct RemovedProperties {
    pub id: i32,
    pub keys: Vec<String>,
}

enum MenuEvent {
    Layout(LayoutUpdated),
    Properties(ItemsPropertiesUpdated),
    Activation(ItemActivationRequested),
}

/// The com.canonical.dbusmenu menu of one tray item.
///
/// The layout is fetched on demand with [`Menu::get_layout`]; the menu's
/// signals tell the host when the fetched tree went stale.
pub struct Menu {
    proxy: DBusMenuProxy<'static>,
    version: u32,
    status: String,
    text_direction: String,
    on_layout_update: Arc<RwLock<Option<LayoutUpdateCallback>>>,
    on_properties_update: Arc<RwLock<Option<PropertiesUpdateCallback>>>,
    on_activate: Arc<RwLock<Option<ActivationCallback>>>,
    consumer: Arc<Consumer>,
}

impl Menu {
    /// Connect to the menu object of `destination` at `object_path`.
    ///
    /// Fails with [`Error::NoMenu`] when there is no dbusmenu object to talk
    /// to, including the common case of an item that exported no menu path
    /// at all.
    pub async fn new(
        connection: &Connection,
        destination: &str,
        object_path: &str,
    ) -> Result<Self> {
        let proxy = DBusMenuProxy::builder(connection)
            .destination(destination.to_owned())
            .and_then(|builder| builder.path(object_path.to_owned()))
            .map_err(|_| Error::NoMenu)?
            .build()
            .await
            .map_err(|_| Error::NoMenu)?;

        let version = proxy.version().await.map_err(|_| Error::NoMenu)?;
        let status = proxy.status().await.unwrap_or_default();
        let text_direction = proxy.text_direction().await.unwrap_or_default();

        let events = select_all(vec![
            proxy.receive_layout_updated().await?.map(MenuEvent::Layout).boxed(),
            proxy.receive_items_properties_updated().await?.map(MenuEvent::Properties).boxed(),
            proxy.receive_item_activation_requested().await?.map(MenuEvent::Activation).boxed(),
        ]);

        let on_layout_update: Arc<RwLock<Option<LayoutUpdateCallback>>> = Arc::default();
        let on_properties_update: Arc<RwLock<Option<PropertiesUpdateCallback>>> = Arc::default();
        let on_activate: Arc<RwLock<Option<ActivationCallback>>> = Arc::default();

        let consumer = spawn({
            let on_layout_update = on_layout_update.clone();
            let on_properties_update = on_properties_update.clone();
            let on_activate = on_activate.clone();
            let mut events = events;
            async move {
                while let Some(event) = events.next().await {
                    dispatch(event, &on_layout_update, &on_properties_update, &on_activate);
                }
            }
        });

        Ok(Self {
            proxy,
            version,
            status,
            text_direction,
            on_layout_update,
            on_properties_update,
            on_activate,
            consumer: Arc::new(Consumer::new(consumer)),
        })
    }

    /// Version of the dbusmenu protocol the application speaks.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The menu's priority at connect time, "normal" unless the application
    /// asked for attention with "notice".
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Text direction of the application, "ltr" or "rtl"; empty when the
    /// application does not say.
    pub fn text_direction(&self) -> &str {
        &self.text_direction
    }

    /// Register a callback for layout invalidations. The argument is the id
    /// of the subtree that went stale; 0 means the whole layout.
    pub fn on_layout_update<F>(&self, callback: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        *self.on_layout_update.write().unwrap() = Some(Box::new(callback));
    }

    /// Register a callback for batched per-entry property changes.
    pub fn on_properties_update<F>(&self, callback: F)
    where
        F: Fn(&[UpdatedProperties], &[RemovedProperties]) + Send + Sync + 'static,
    {
        *self.on_properties_update.write().unwrap() = Some(Box::new(callback));
    }

    /// Register a callback for the application requesting that the submenu
    /// under the given id be opened.
    pub fn on_activate<F>(&self, callback: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        *self.on_activate.write().unwrap() = Some(Box::new(callback));
    }

    /// Fetch the layout under `parent_id` (0 for the root).
    ///
    /// A `recursion_depth` of -1 delivers the full tree, 0 just the parent,
    /// and n > 0 at most n levels. An empty `property_names` requests every
    /// property. Returns the layout revision alongside the tree; broken
    /// subtrees are dropped rather than failing the whole fetch.
    pub async fn get_layout(
        &self,
        parent_id: i32,
        recursion_depth: i32,
        property_names: &[&str],
    ) -> Result<(u32, LayoutNode)> {
        let (revision, raw) =
            self.proxy.get_layout(parent_id, recursion_depth, property_names).await?;
        Ok((revision, LayoutNode::from_raw(raw)))
    }

    /// Notify the application of an arbitrary event on one entry. Standard
    /// kinds are "clicked" and "hovered"; vendors may add `x-<vendor>-*`
    /// kinds.
    pub async fn event(
        &self,
        id: i32,
        kind: &str,
        data: &Value<'_>,
        timestamp: u32,
    ) -> Result<()> {
        Ok(self.proxy.event(id, kind, data, timestamp).await?)
    }

    /// Tell the application the entry was clicked.
    pub async fn clicked(&self, node: &LayoutNode) -> Result<()> {
        self.event(node.id, "clicked", &Value::I32(0), unix_now()).await
    }

    /// Tell the application the entry was hovered.
    pub async fn hovered(&self, node: &LayoutNode) -> Result<()> {
        self.event(node.id, "hovered", &Value::I32(0), unix_now()).await
    }

    /// Announce that the submenu under `node` is about to be shown. A `true`
    /// reply means the layout must be refreshed before displaying it.
    pub async fn about_to_show(&self, node: &LayoutNode) -> Result<bool> {
        Ok(self.proxy.about_to_show(node.id).await?)
    }

    /// Announce several submenus at once; returns the entry ids needing a
    /// refresh and the ids the application did not recognize.
    pub async fn about_to_show_group(&self, ids: &[i32]) -> Result<(Vec<i32>, Vec<i32>)> {
        Ok(self.proxy.about_to_show_group(ids).await?)
    }

    /// Fetch the properties of the listed entries without walking the
    /// layout. Empty `ids` means every entry, empty `property_names` every
    /// property.
    pub async fn group_properties(
        &self,
        ids: &[i32],
        property_names: &[&str],
    ) -> Result<Vec<UpdatedProperties>> {
        let groups = self.proxy.get_group_properties(ids, property_names).await?;
        Ok(groups
            .into_iter()
            .map(|(id, properties)| UpdatedProperties { id, properties })
            .collect())
    }

    /// Stop following the menu's signals and release the match rules.
    pub fn close(&self) {
        self.consumer.stop();
    }
}

impl fmt::Debug for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Menu")
            .field("version", &self.version)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

fn dispatch(
    event: MenuEvent,
    on_layout_update: &RwLock<Option<LayoutUpdateCallback>>,
    on_properties_update: &RwLock<Option<PropertiesUpdateCallback>>,
    on_activate: &RwLock<Option<ActivationCallback>>,
) {
    match event {
        MenuEvent::Layout(signal) => match signal.args() {
            Ok(args) => {
                if let Some(callback) = on_layout_update.read().unwrap().as_ref() {
                    dispatch_guarded("layout update", || callback(args.parent));
                }
            }
            Err(e) => debug!("ignoring malformed LayoutUpdated signal: {e}"),
        },
        MenuEvent::Properties(signal) => match signal.args() {
            Ok(args) => {
                let updated: Vec<UpdatedProperties> = args
                    .updated_props
                    .into_iter()
                    .map(|(id, properties)| UpdatedProperties { id, properties })
                    .collect();
                let removed: Vec<RemovedProperties> = args
                    .removed_props
                    .into_iter()
                    .map(|(id, keys)| RemovedProperties { id, keys })
                    .collect();
                if let Some(callback) = on_properties_update.read().unwrap().as_ref() {
                    dispatch_guarded("properties update", || callback(&updated, &removed));
                }
            }
            Err(e) => debug!("ignoring malformed ItemsPropertiesUpdated signal: {e}"),
        },
        MenuEvent::Activation(signal) => match signal.args() {
            Ok(args) => {
                if let Some(callback) = on_activate.read().unwrap().as_ref() {
                    dispatch_guarded("activation", || callback(args.id));
                }
            }
            Err(e) => debug!("ignoring malformed ItemActivationRequested signal: {e}"),
        },
    }
}

fn unix_now() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or_default()
}
