use serde::{Deserialize, Serialize};
use zbus::{
    proxy,
    zvariant::{self, OwnedObjectPath, OwnedValue},
};

/// Direction of a scroll request forwarded to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, zvariant::Type)]
#[serde(rename_all = "lowercase")]
#[zvariant(signature = "s")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// What kind of application the item represents.
///
/// Items that publish an unrecognized category decode as
/// [`Category::ApplicationStatus`], the least specific kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
)]
pub enum Category {
    /// The status of a generic application, for instance the current state of
    /// a media player.
    #[default]
    ApplicationStatus,

    /// The status of a communication oriented application, like an instant
    /// messenger or an email client.
    Communications,

    /// A service of the system not seen as a standalone application by the
    /// user, such as an indicator for a disk indexing service.
    SystemServices,

    /// The state and control of a particular hardware, such as an indicator
    /// of the battery charge or sound card volume control.
    Hardware,
}

/// How urgently the item wants to be shown.
///
/// Items that publish an unrecognized status decode as [`Status::Active`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    zvariant::Type,
    Deserialize,
)]
#[zvariant(signature = "s")]
pub enum Status {
    /// The item conveys nothing important; visualizations are likely to hide
    /// it.
    Passive,

    /// The item should be shown to the user in some way.
    #[default]
    Active,

    /// The item carries really important information, such as battery charge
    /// running out; visualizations should emphasize it.
    NeedsAttention,
}

/// One entry of an `a(iiay)` icon property: dimensions plus raw ARGB32
/// pixels in network byte order.
#[derive(Debug, Clone, zvariant::Value, zvariant::OwnedValue)]
pub struct Pixmap {
    pub width: i32,
    pub height: i32,
    pub data: Vec<u8>,
}

#[proxy(interface = "org.kde.StatusNotifierItem")]
pub trait StatusNotifierItem {
    /// Primary activation, typically a mouse left click on the item's visual
    /// representation. The coordinates are a screen-position hint for any
    /// window the item decides to open.
    fn activate(&self, x: i32, y: i32) -> zbus::Result<()>;

    /// Secondary, less important form of activation, typically a mouse
    /// middle click.
    fn secondary_activate(&self, x: i32, y: i32) -> zbus::Result<()>;

    /// Ask the item to show its own context menu at the given screen
    /// position.
    fn context_menu(&self, x: i32, y: i32) -> zbus::Result<()>;

    /// Forward a scroll wheel event over the item's representation.
    fn scroll(&self, delta: i32, orientation: Orientation) -> zbus::Result<()>;

    /// Hand the item an XDG activation token so a window it opens can take
    /// focus under Wayland.
    fn provide_xdg_activation_token(&self, token: &str) -> zbus::Result<()>;

    #[zbus(property)]
    fn category(&self) -> zbus::Result<Category>;

    /// A name unique for this application and consistent between sessions,
    /// such as the application name itself.
    #[zbus(property)]
    fn id(&self) -> zbus::Result<String>;

    /// A name that describes the application; it can be more descriptive
    /// than [`id`](Self::id). Change is announced by
    /// the `NewTitle` signal.
    #[zbus(property(emits_changed_signal = "false"))]
    fn title(&self) -> zbus::Result<String>;

    /// How urgently the item wants to be shown. Change is announced by
    /// the `NewStatus` signal.
    #[zbus(property(emits_changed_signal = "false"))]
    fn status(&self) -> zbus::Result<Status>;

    /// Windowing-system identifier of one of the application's windows, or 0
    /// if the item is not interested in exposing one.
    #[zbus(property)]
    fn window_id(&self) -> zbus::Result<u32>;

    /// Additional path to prepend to the icon theme search path when
    /// resolving the named icons of this item.
    #[zbus(property)]
    fn icon_theme_path(&self) -> zbus::Result<String>;

    /// Path of an object implementing com.canonical.dbusmenu.
    #[zbus(property(emits_changed_signal = "false"))]
    fn menu(&self) -> zbus::Result<OwnedObjectPath>;

    /// Whether the item only supports its context menu; visualizations
    /// should then prefer showing the menu over activation.
    #[zbus(property)]
    fn item_is_menu(&self) -> zbus::Result<bool>;

    /// Themed name of the main icon. Visualizations are encouraged to
    /// prefer icon names over pixmaps when both are available.
    #[zbus(property(emits_changed_signal = "false"))]
    fn icon_name(&self) -> zbus::Result<String>;

    /// The main icon in one or more sizes. Both this and
    /// [`icon_name`](Self::icon_name) are refreshed on the `NewIcon`
    /// signal.
    #[zbus(property(emits_changed_signal = "false"))]
    fn icon_pixmap(&self) -> zbus::Result<Vec<Pixmap>>;

    /// Themed name of an icon to overlay on top of the main one, for
    /// instance a badge showing unread activity.
    #[zbus(property(emits_changed_signal = "false"))]
    fn overlay_icon_name(&self) -> zbus::Result<String>;

    #[zbus(property(emits_changed_signal = "false"))]
    fn overlay_icon_pixmap(&self) -> zbus::Result<Vec<Pixmap>>;

    /// Themed name of the icon shown while the item
    /// [needs attention](Status::NeedsAttention).
    #[zbus(property(emits_changed_signal = "false"))]
    fn attention_icon_name(&self) -> zbus::Result<String>;

    #[zbus(property(emits_changed_signal = "false"))]
    fn attention_icon_pixmap(&self) -> zbus::Result<Vec<Pixmap>>;

    /// Name of an animation to play while the item needs attention.
    #[zbus(property(emits_changed_signal = "false"))]
    fn attention_movie_name(&self) -> zbus::Result<String>;

    /// Tooltip as the 4-tuple (icon name, icon pixmaps, title, body).
    #[zbus(property(emits_changed_signal = "false"))]
    fn tool_tip(&self) -> zbus::Result<(String, Vec<Pixmap>, String, String)>;

    #[zbus(signal)]
    fn new_title(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn new_tool_tip(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn new_status(&self, status: Status) -> zbus::Result<()>;

    #[zbus(signal)]
    fn new_icon(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn new_overlay_icon(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn new_attention_icon(&self) -> zbus::Result<()>;
}

impl StatusNotifierItemProxy<'_> {
    /// Object path items live at when they register by bus name alone.
    pub const DEFAULT_PATH: &'static str = "/StatusNotifierItem";
}

impl TryFrom<OwnedValue> for Category {
    type Error = zvariant::Error;

    fn try_from(value: OwnedValue) -> Result<Self, Self::Error> {
        let value: String = value.try_into()?;
        Ok(value.parse().unwrap_or_default())
    }
}

impl TryFrom<OwnedValue> for Status {
    type Error = zvariant::Error;

    fn try_from(value: OwnedValue) -> Result<Self, Self::Error> {
        let value: String = value.try_into()?;
        Ok(value.parse().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use zbus::zvariant::Value;

    #[test]
    fn parses_known_statuses() {
        assert_eq!("Passive".parse(), Ok(Status::Passive));
        assert_eq!("Active".parse(), Ok(Status::Active));
        assert_eq!("NeedsAttention".parse(), Ok(Status::NeedsAttention));
    }

    #[test]
    fn unknown_wire_strings_decode_to_defaults() {
        let status = Status::try_from(Value::from("Sleeping").try_to_owned().unwrap()).unwrap();
        assert_eq!(status, Status::Active);

        let category = Category::try_from(Value::from("Gizmo").try_to_owned().unwrap()).unwrap();
        assert_eq!(category, Category::ApplicationStatus);
    }

    #[test]
    fn non_string_wire_values_fail_to_decode() {
        assert!(Status::try_from(Value::from(3_i32).try_to_owned().unwrap()).is_err());
    }

    #[test]
    fn renders_wire_names() {
        assert_eq!(Status::NeedsAttention.to_string(), "NeedsAttention");
        assert_eq!(Category::SystemServices.to_string(), "SystemServices");
    }
}
