use thiserror::Error;

/// Errors surfaced to embedders of this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The component was already shut down with `close`.
    #[error("operation attempted after close")]
    AlreadyClosed,

    /// The requested well-known bus name is owned by another connection.
    #[error("bus name {0} is already owned")]
    NameUnavailable(String),

    /// No StatusNotifierWatcher service answered our registration.
    #[error("no StatusNotifierWatcher is reachable on the bus")]
    NoWatcher,

    /// The remote object does not implement org.kde.StatusNotifierItem.
    #[error("service does not implement org.kde.StatusNotifierItem")]
    NotAnItem,

    /// The remote object does not implement com.canonical.dbusmenu.
    #[error("object does not implement com.canonical.dbusmenu")]
    NoMenu,

    /// A wire value did not match the shape the protocol requires.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Any other D-Bus failure.
    #[error("dbus error")]
    Transport(#[from] zbus::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
