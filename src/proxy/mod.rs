//! Client-side definitions of the D-Bus interfaces this crate talks to.
//!
//! Embedders normally go through [`crate::Host`], [`crate::Item`], and
//! [`crate::Menu`]; the raw proxies are exposed for the cases those
//! wrappers do not cover.

mod item;
mod menu;
mod watcher;

pub use item::{Category, Orientation, Pixmap, Status, StatusNotifierItemProxy};
pub use menu::DBusMenuProxy;
pub use watcher::StatusNotifierWatcherProxy;

pub(crate) use menu::{ItemActivationRequested, ItemsPropertiesUpdated, LayoutUpdated};
pub(crate) use watcher::{StatusNotifierItemRegistered, StatusNotifierItemUnregistered};
