//! Toolkit-agnostic building blocks for the host side of a
//! [StatusNotifierItem] system tray.
//!
//! A tray consists of three cooperating pieces, all speaking D-Bus over one
//! shared connection:
//!
//! - [`Watcher`] serves org.kde.StatusNotifierWatcher: it accepts item and
//!   host registrations and notices when either drops off the bus. Exactly
//!   one watcher runs per bus; run your own or rely on an existing one.
//! - [`Host`] mirrors the watcher's item set and reports churn through
//!   callbacks. It is what a panel or bar embeds.
//! - [`Item`] is one tray application: cached properties kept fresh by the
//!   item's change signals, plus the user interactions (activate, scroll,
//!   context menu) forwarded back to it.
//!
//! Items that export a com.canonical.dbusmenu menu get a [`Menu`] handle
//! for fetching the layout tree and reporting clicks.
//!
//! This crate does not draw anything and does not decode icon pixels; it
//! hands hosts the raw [`IconSet`] data and leaves rendering to the
//! toolkit. Applications that want to sit in the tray need an SNI client
//! implementation instead.
//!
//! ```no_run
//! # async fn run() -> tray_host::Result<()> {
//! let connection = zbus::Connection::session().await?;
//!
//! let watcher = tray_host::Watcher::new(&connection);
//! watcher.listen().await?;
//!
//! let host = tray_host::Host::new(&connection, std::process::id());
//! host.on_registered(|item| println!("+ {}", item.title()));
//! host.on_unregistered(|item| println!("- {}", item.title()));
//! host.listen().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [StatusNotifierItem]: https://www.freedesktop.org/wiki/Specifications/StatusNotifierItem/

mod error;
mod host;
mod icon;
mod item;
mod layout;
mod menu;
pub mod proxy;
mod task;
mod watcher;

pub use error::{Error, Result};
pub use host::Host;
pub use icon::{Icon, IconSet};
pub use item::{Item, ItemProperties};
pub use layout::{Disposition, LayoutNode, ToggleState, ToggleType};
pub use menu::{Menu, RemovedProperties, UpdatedProperties};
pub use proxy::{Category, Orientation, Status};
pub use watcher::{Watcher, WATCHER_BUS_NAME, WATCHER_OBJECT_PATH};
