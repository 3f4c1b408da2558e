use std::fmt;
use std::sync::{Arc, RwLock};

use futures::stream::select_all;
use futures::StreamExt;
use log::debug;
use tokio::spawn;
use zbus::Connection;

use crate::error::{Error, Result};
use crate::icon::IconSet;
use crate::menu::Menu;
use crate::proxy::{Category, Orientation, Status, StatusNotifierItemProxy};
use crate::task::{dispatch_guarded, Consumer};

type UpdateCallback = Box<dyn Fn() + Send + Sync>;

/// Cached snapshot of every property an item publishes.
///
/// Items are free to omit optional properties; omitted fields keep their
/// zero value.
#[derive(Debug, Clone, Default)]
pub struct ItemProperties {
    pub id: String,
    pub title: String,
    pub tooltip: String,
    pub category: Category,
    pub status: Status,
    pub window_id: u32,
    pub icon_name: String,
    pub icon_theme_path: String,
    pub icon_pixmap: IconSet,
    pub overlay_icon_name: String,
    pub overlay_icon_pixmap: IconSet,
    pub attention_icon_name: String,
    pub attention_icon_pixmap: IconSet,
    pub attention_movie_name: String,
    pub is_menu: bool,
    pub menu_path: String,
}

/// Which group of cached fields a change signal invalidates.
enum Refresh {
    Title,
    ToolTip,
    Status,
    Icon,
    OverlayIcon,
    AttentionIcon,
}

/// One application in the tray.
///
/// An item mirrors the remote org.kde.StatusNotifierItem object: its
/// properties are fetched once on construction and kept current by the
/// item's change signals. Reads are snapshots; an update callback fires
/// after every change so a host knows when to redraw.
#[derive(Clone)]
pub struct Item {
    proxy: StatusNotifierItemProxy<'static>,
    unique_name: String,
    object_path: String,
    state: Arc<RwLock<ItemProperties>>,
    on_update: Arc<RwLock<Option<UpdateCallback>>>,
    consumer: Arc<Consumer>,
}

impl Item {
    /// Connect to the item owned by `unique_name` at `object_path`.
    ///
    /// Fails with [`Error::NotAnItem`] when the object does not answer SNI
    /// property requests. Individual missing properties are fine.
    pub async fn new(
        connection: &Connection,
        unique_name: &str,
        object_path: &str,
    ) -> Result<Self> {
        let proxy = StatusNotifierItemProxy::builder(connection)
            .destination(unique_name.to_owned())?
            .path(object_path.to_owned())?
            .build()
            .await?;

        let title = proxy.title().await.map_err(|_| Error::NotAnItem)?;

        let state = Arc::new(RwLock::new(ItemProperties { title, ..Default::default() }));
        fetch_static(&proxy, &state).await;
        refresh_tooltip(&proxy, &state).await;
        refresh_status(&proxy, &state).await;
        refresh_icon(&proxy, &state).await;
        refresh_overlay_icon(&proxy, &state).await;
        refresh_attention_icon(&proxy, &state).await;

        let events = select_all(vec![
            proxy.receive_new_title().await?.map(|_| Refresh::Title).boxed(),
            proxy.receive_new_tool_tip().await?.map(|_| Refresh::ToolTip).boxed(),
            proxy.receive_new_status().await?.map(|_| Refresh::Status).boxed(),
            proxy.receive_new_icon().await?.map(|_| Refresh::Icon).boxed(),
            proxy.receive_new_overlay_icon().await?.map(|_| Refresh::OverlayIcon).boxed(),
            proxy.receive_new_attention_icon().await?.map(|_| Refresh::AttentionIcon).boxed(),
        ]);

        let on_update: Arc<RwLock<Option<UpdateCallback>>> = Arc::default();
        let consumer = spawn({
            let proxy = proxy.clone();
            let state = state.clone();
            let on_update = on_update.clone();
            let mut events = events;
            async move {
                while let Some(refresh) = events.next().await {
                    match refresh {
                        Refresh::Title => refresh_title(&proxy, &state).await,
                        Refresh::ToolTip => refresh_tooltip(&proxy, &state).await,
                        Refresh::Status => refresh_status(&proxy, &state).await,
                        Refresh::Icon => refresh_icon(&proxy, &state).await,
                        Refresh::OverlayIcon => refresh_overlay_icon(&proxy, &state).await,
                        Refresh::AttentionIcon => refresh_attention_icon(&proxy, &state).await,
                    }
                    if let Some(callback) = on_update.read().unwrap().as_ref() {
                        dispatch_guarded("update", callback);
                    }
                }
            }
        });

        Ok(Self {
            proxy,
            unique_name: unique_name.to_owned(),
            object_path: object_path.to_owned(),
            state,
            on_update,
            consumer: Arc::new(Consumer::new(consumer)),
        })
    }

    /// Connect to the item a watcher identifier points at.
    pub async fn from_identifier(connection: &Connection, identifier: &str) -> Result<Self> {
        let (unique_name, object_path) = split_identifier(identifier)?;
        Self::new(connection, unique_name, object_path).await
    }

    /// Register a callback that runs after any cached property changed.
    ///
    /// Hosts should redraw the item's representation when it fires. The
    /// callback must not block and must not call back into the item's
    /// owner.
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_update.write().unwrap() = Some(Box::new(callback));
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// Snapshot of every cached property.
    pub fn properties(&self) -> ItemProperties {
        self.state.read().unwrap().clone()
    }

    pub fn id(&self) -> String {
        self.state.read().unwrap().id.clone()
    }

    pub fn title(&self) -> String {
        self.state.read().unwrap().title.clone()
    }

    pub fn tooltip(&self) -> String {
        self.state.read().unwrap().tooltip.clone()
    }

    pub fn category(&self) -> Category {
        self.state.read().unwrap().category
    }

    pub fn status(&self) -> Status {
        self.state.read().unwrap().status
    }

    pub fn window_id(&self) -> u32 {
        self.state.read().unwrap().window_id
    }

    pub fn icon_name(&self) -> String {
        self.state.read().unwrap().icon_name.clone()
    }

    pub fn icon_theme_path(&self) -> String {
        self.state.read().unwrap().icon_theme_path.clone()
    }

    pub fn icon_pixmap(&self) -> IconSet {
        self.state.read().unwrap().icon_pixmap.clone()
    }

    pub fn overlay_icon_name(&self) -> String {
        self.state.read().unwrap().overlay_icon_name.clone()
    }

    pub fn overlay_icon_pixmap(&self) -> IconSet {
        self.state.read().unwrap().overlay_icon_pixmap.clone()
    }

    pub fn attention_icon_name(&self) -> String {
        self.state.read().unwrap().attention_icon_name.clone()
    }

    pub fn attention_icon_pixmap(&self) -> IconSet {
        self.state.read().unwrap().attention_icon_pixmap.clone()
    }

    pub fn attention_movie_name(&self) -> String {
        self.state.read().unwrap().attention_movie_name.clone()
    }

    /// Whether the item wants its menu shown instead of being activated.
    pub fn is_menu(&self) -> bool {
        self.state.read().unwrap().is_menu
    }

    pub fn menu_path(&self) -> String {
        self.state.read().unwrap().menu_path.clone()
    }

    /// Ask the item for its primary activation, e.g. on left click.
    pub async fn activate(&self, x: i32, y: i32) -> Result<()> {
        Ok(self.proxy.activate(x, y).await?)
    }

    /// Ask the item for its secondary activation, e.g. on middle click.
    pub async fn secondary_activate(&self, x: i32, y: i32) -> Result<()> {
        Ok(self.proxy.secondary_activate(x, y).await?)
    }

    /// Ask the item to show its own context menu at the given position.
    pub async fn context_menu(&self, x: i32, y: i32) -> Result<()> {
        Ok(self.proxy.context_menu(x, y).await?)
    }

    /// Forward a scroll event to the item.
    pub async fn scroll(&self, delta: i32, orientation: Orientation) -> Result<()> {
        Ok(self.proxy.scroll(delta, orientation).await?)
    }

    /// Hand the item an XDG activation token for focus transfer.
    pub async fn provide_xdg_activation_token(&self, token: &str) -> Result<()> {
        Ok(self.proxy.provide_xdg_activation_token(token).await?)
    }

    /// Connect to the menu the item exported, if any.
    ///
    /// Items without a usable menu path fail with [`Error::NoMenu`].
    pub async fn menu(&self) -> Result<Menu> {
        let menu_path = self.menu_path();
        Menu::new(self.proxy.inner().connection(), &self.unique_name, &menu_path).await
    }

    /// Stop following the item's change signals and release the match
    /// rules. Cached properties stay readable but no longer update.
    pub fn close(&self) {
        self.consumer.stop();
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("unique_name", &self.unique_name)
            .field("object_path", &self.object_path)
            .finish_non_exhaustive()
    }
}

/// Split a watcher identifier like `:1.50/StatusNotifierItem` into bus name
/// and object path. Identifiers without a path get the conventional default.
pub(crate) fn split_identifier(identifier: &str) -> Result<(&str, &str)> {
    let (unique_name, object_path) = match identifier.find('/') {
        Some(index) => (&identifier[..index], &identifier[index..]),
        None => (identifier, StatusNotifierItemProxy::DEFAULT_PATH),
    };

    if unique_name.is_empty() {
        return Err(Error::MalformedPayload(format!(
            "item identifier {identifier:?} carries no bus name"
        )));
    }

    Ok((unique_name, object_path))
}

/// Fetch the properties that have no change signal.
async fn fetch_static(proxy: &StatusNotifierItemProxy<'_>, state: &RwLock<ItemProperties>) {
    let id = proxy.id().await.ok();
    let category = proxy.category().await.ok();
    let window_id = proxy.window_id().await.ok();
    let is_menu = proxy.item_is_menu().await.ok();
    let menu_path = proxy.menu().await.ok();

    let mut state = state.write().unwrap();
    if let Some(id) = id {
        state.id = id;
    }
    if let Some(category) = category {
        state.category = category;
    }
    if let Some(window_id) = window_id {
        state.window_id = window_id;
    }
    if let Some(is_menu) = is_menu {
        state.is_menu = is_menu;
    }
    if let Some(menu_path) = menu_path {
        state.menu_path = menu_path.to_string();
    }
}

async fn refresh_title(proxy: &StatusNotifierItemProxy<'_>, state: &RwLock<ItemProperties>) {
    if let Ok(title) = proxy.title().await {
        state.write().unwrap().title = title;
    } else {
        debug!("failed to refresh Title");
    }
}

async fn refresh_tooltip(proxy: &StatusNotifierItemProxy<'_>, state: &RwLock<ItemProperties>) {
    // Only the text matters here; the tooltip's icon fields are unused.
    if let Ok((_, _, title, _)) = proxy.tool_tip().await {
        state.write().unwrap().tooltip = title;
    }
}

async fn refresh_status(proxy: &StatusNotifierItemProxy<'_>, state: &RwLock<ItemProperties>) {
    if let Ok(status) = proxy.status().await {
        state.write().unwrap().status = status;
    }
}

async fn refresh_icon(proxy: &StatusNotifierItemProxy<'_>, state: &RwLock<ItemProperties>) {
    let name = proxy.icon_name().await.ok();
    let theme_path = proxy.icon_theme_path().await.ok();
    let pixmap = proxy.icon_pixmap().await.ok().map(IconSet::from_pixmaps);

    let mut state = state.write().unwrap();
    if let Some(name) = name {
        state.icon_name = name;
    }
    if let Some(theme_path) = theme_path {
        state.icon_theme_path = theme_path;
    }
    if let Some(pixmap) = pixmap {
        state.icon_pixmap = pixmap;
    }
}

async fn refresh_overlay_icon(proxy: &StatusNotifierItemProxy<'_>, state: &RwLock<ItemProperties>) {
    let name = proxy.overlay_icon_name().await.ok();
    let pixmap = proxy.overlay_icon_pixmap().await.ok().map(IconSet::from_pixmaps);

    let mut state = state.write().unwrap();
    if let Some(name) = name {
        state.overlay_icon_name = name;
    }
    if let Some(pixmap) = pixmap {
        state.overlay_icon_pixmap = pixmap;
    }
}

async fn refresh_attention_icon(
    proxy: &StatusNotifierItemProxy<'_>,
    state: &RwLock<ItemProperties>,
) {
    let name = proxy.attention_icon_name().await.ok();
    let pixmap = proxy.attention_icon_pixmap().await.ok().map(IconSet::from_pixmaps);
    let movie_name = proxy.attention_movie_name().await.ok();

    let mut state = state.write().unwrap();
    if let Some(name) = name {
        state.attention_icon_name = name;
    }
    if let Some(pixmap) = pixmap {
        state.attention_icon_pixmap = pixmap;
    }
    if let Some(movie_name) = movie_name {
        state.attention_movie_name = movie_name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_identifier_at_first_slash() {
        let (name, path) = split_identifier(":1.50/StatusNotifierItem").unwrap();
        assert_eq!(name, ":1.50");
        assert_eq!(path, "/StatusNotifierItem");
    }

    #[test]
    fn keeps_nested_paths_whole() {
        let (name, path) = split_identifier(":1.202/org/ayatana/NotificationItem/foo").unwrap();
        assert_eq!(name, ":1.202");
        assert_eq!(path, "/org/ayatana/NotificationItem/foo");
    }

    #[test]
    fn missing_path_defaults() {
        let (name, path) = split_identifier(":1.100").unwrap();
        assert_eq!(name, ":1.100");
        assert_eq!(path, "/StatusNotifierItem");
    }

    #[test]
    fn rejects_identifier_without_bus_name() {
        assert!(matches!(
            split_identifier("/StatusNotifierItem"),
            Err(Error::MalformedPayload(_))
        ));
        assert!(matches!(split_identifier(""), Err(Error::MalformedPayload(_))));
    }
}
