use std::collections::HashMap;

use zbus::zvariant::{OwnedValue, Value};

use crate::error::{Error, Result};

/// Wire shape of one `com.canonical.dbusmenu` layout level: `(ia{sv}av)`.
pub(crate) type RawLayout = (i32, HashMap<String, OwnedValue>, Vec<OwnedValue>);

/// Whether a menu entry can be toggled, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToggleType {
    #[default]
    None,
    Checkmark,
    Radio,
}

/// Current state of a togglable menu entry.
///
/// Anything outside 0 (off) and 1 (on) is indeterminate, which is also the
/// state of entries that never set the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToggleState {
    #[default]
    Indeterminate,
    Off,
    On,
}

/// How a menu entry wants its information presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    #[default]
    Normal,
    Informative,
    Warning,
    Alert,
}

/// One node of a menu layout tree.
///
/// Properties are kept as raw variants; the accessor methods apply the
/// defaults the dbusmenu protocol specifies for absent entries.
#[derive(Debug, PartialEq)]
pub struct LayoutNode {
    pub id: i32,
    pub properties: HashMap<String, OwnedValue>,
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    pub(crate) fn from_raw(raw: RawLayout) -> Self {
        let (id, properties, children) = raw;
        let children = children.iter().filter_map(|child| Self::from_value(child).ok()).collect();
        Self { id, properties, children }
    }

    /// Decode a node from its `(ia{sv}av)` variant form.
    ///
    /// Children that fail to decode are dropped so one broken entry does not
    /// take the rest of the menu down with it.
    pub fn from_value(value: &Value<'_>) -> Result<Self> {
        let Value::Structure(node) = unwrap_variant(value) else {
            return Err(Error::MalformedPayload("menu node is not a structure".into()));
        };

        let fields = node.fields();
        if fields.len() != 3 {
            return Err(Error::MalformedPayload(format!(
                "menu node has {} fields, expected 3",
                fields.len()
            )));
        }

        let id = match &fields[0] {
            Value::I32(id) => *id,
            _ => return Err(Error::MalformedPayload("menu node id is not an i32".into())),
        };

        let Value::Dict(dict) = &fields[1] else {
            return Err(Error::MalformedPayload("menu node properties are not a dict".into()));
        };
        let properties = dict
            .iter()
            .filter_map(|(key, value)| {
                let Value::Str(key) = key else { return None };
                let value = OwnedValue::try_from(value).ok()?;
                Some((key.to_string(), value))
            })
            .collect();

        let Value::Array(children) = &fields[2] else {
            return Err(Error::MalformedPayload("menu node children are not an array".into()));
        };
        let children =
            children.inner().iter().filter_map(|child| Self::from_value(child).ok()).collect();

        Ok(Self { id, properties, children })
    }

    fn property(&self, key: &str) -> Option<&Value<'_>> {
        let value: &Value = self.properties.get(key)?;
        Some(unwrap_variant(value))
    }

    fn property_str(&self, key: &str) -> Option<&str> {
        match self.property(key)? {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn property_bool(&self, key: &str) -> Option<bool> {
        match self.property(key)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn property_int(&self, key: &str) -> Option<i64> {
        match self.property(key)? {
            Value::U8(v) => Some(i64::from(*v)),
            Value::I16(v) => Some(i64::from(*v)),
            Value::U16(v) => Some(i64::from(*v)),
            Value::I32(v) => Some(i64::from(*v)),
            Value::U32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Display text, with its mnemonic underscores left in place.
    pub fn label(&self) -> &str {
        self.property_str("label").unwrap_or_default()
    }

    /// Themed icon name, empty when the entry has none.
    pub fn icon_name(&self) -> &str {
        self.property_str("icon-name").unwrap_or_default()
    }

    /// Raw PNG data of the entry's icon, empty when the entry has none.
    pub fn icon_data(&self) -> Vec<u8> {
        match self.property("icon-data") {
            Some(Value::Array(bytes)) => bytes
                .inner()
                .iter()
                .filter_map(|b| if let Value::U8(b) = b { Some(*b) } else { None })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.property_bool("enabled").unwrap_or(true)
    }

    pub fn is_visible(&self) -> bool {
        self.property_bool("visible").unwrap_or(true)
    }

    pub fn is_separator(&self) -> bool {
        self.property_str("type") == Some("separator")
    }

    pub fn is_submenu(&self) -> bool {
        self.property_str("children-display") == Some("submenu")
    }

    pub fn toggle_type(&self) -> ToggleType {
        match self.property_str("toggle-type") {
            Some("checkmark") => ToggleType::Checkmark,
            Some("radio") => ToggleType::Radio,
            _ => ToggleType::None,
        }
    }

    pub fn toggle_state(&self) -> ToggleState {
        match self.property_int("toggle-state") {
            Some(0) => ToggleState::Off,
            Some(1) => ToggleState::On,
            _ => ToggleState::Indeterminate,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self.property_str("disposition") {
            Some("informative") => Disposition::Informative,
            Some("warning") => Disposition::Warning,
            Some("alert") => Disposition::Alert,
            _ => Disposition::Normal,
        }
    }

    /// Key presses triggering the entry, each press a list of modifiers
    /// ("Control", "Alt", "Shift", "Super") followed by the key itself.
    pub fn shortcut(&self) -> Vec<Vec<String>> {
        let Some(Value::Array(presses)) = self.property("shortcut") else {
            return Vec::new();
        };
        presses
            .inner()
            .iter()
            .filter_map(|press| match unwrap_variant(press) {
                Value::Array(keys) => Some(
                    keys.inner()
                        .iter()
                        .filter_map(|key| match unwrap_variant(key) {
                            Value::Str(key) => Some(key.to_string()),
                            _ => None,
                        })
                        .collect(),
                ),
                _ => None,
            })
            .collect()
    }
}

/// Strip any number of variant wrappers; servers differ in how deeply they
/// box nested layout values.
fn unwrap_variant<'a>(mut value: &'a Value<'a>) -> &'a Value<'a> {
    while let Value::Value(inner) = value {
        value = inner;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::{Deserialize, Serialize};
    use zbus::zvariant::Type;

    /// Mirror of the wire structure, used to build test payloads.
    #[derive(Debug, Default, Type, Serialize, Deserialize, Value, OwnedValue)]
    struct RawNode {
        id: i32,
        properties: HashMap<String, OwnedValue>,
        children: Vec<OwnedValue>,
    }

    fn owned(value: Value<'_>) -> OwnedValue {
        value.try_to_owned().unwrap()
    }

    fn props(entries: &[(&str, Value<'_>)]) -> HashMap<String, OwnedValue> {
        entries.iter().map(|(k, v)| (k.to_string(), owned(v.try_clone().unwrap()))).collect()
    }

    fn raw(id: i32, properties: HashMap<String, OwnedValue>, children: Vec<OwnedValue>) -> RawNode {
        RawNode { id, properties, children }
    }

    fn node_value(node: RawNode) -> OwnedValue {
        owned(Value::from(node))
    }

    #[test]
    fn decodes_recursive_tree() {
        let file = raw(1, props(&[("label", Value::from("_File"))]), vec![]);
        let separator = raw(2, props(&[("type", Value::from("separator"))]), vec![]);
        let root = (
            0,
            props(&[("children-display", Value::from("submenu"))]),
            vec![node_value(file), node_value(separator)],
        );

        let tree = LayoutNode::from_raw(root);

        assert_eq!(tree.id, 0);
        assert!(tree.is_submenu());
        assert_eq!(tree.children.len(), 2);

        assert_eq!(tree.children[0].id, 1);
        assert_eq!(tree.children[0].label(), "_File");
        assert_eq!(tree.children[0].toggle_type(), ToggleType::None);
        assert!(!tree.children[0].is_separator());

        assert_eq!(tree.children[1].id, 2);
        assert!(tree.children[1].is_separator());
    }

    #[test]
    fn drops_malformed_children() {
        let good = raw(7, props(&[("label", Value::from("ok"))]), vec![]);
        let root = (
            0,
            HashMap::new(),
            vec![owned(Value::from("not a node")), node_value(good), owned(Value::from(3_i32))],
        );

        let tree = LayoutNode::from_raw(root);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].id, 7);
    }

    #[test]
    fn depth_zero_reply_decodes_to_leaf_root() {
        let tree = LayoutNode::from_raw((0, HashMap::new(), Vec::new()));
        assert_eq!(tree.id, 0);
        assert!(tree.children.is_empty());
    }

    #[test]
    fn rejects_wrong_arity_at_root() {
        #[derive(Debug, Type, Serialize, Deserialize, Value, OwnedValue)]
        struct TwoFields {
            id: i32,
            label: String,
        }

        let value = Value::from(TwoFields { id: 1, label: "two".into() });
        assert!(matches!(LayoutNode::from_value(&value), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn unwraps_nested_variants() {
        let inner = Value::from(raw(4, props(&[("label", Value::from("deep"))]), vec![]));
        let wrapped = Value::Value(Box::new(Value::Value(Box::new(inner))));

        let node = LayoutNode::from_value(&wrapped).unwrap();
        assert_eq!(node.id, 4);
        assert_eq!(node.label(), "deep");
    }

    #[test]
    fn toggle_state_accepts_multiple_integer_widths() {
        let on = LayoutNode::from_raw((1, props(&[("toggle-state", Value::from(1_i32))]), vec![]));
        assert_eq!(on.toggle_state(), ToggleState::On);

        let off = LayoutNode::from_raw((2, props(&[("toggle-state", Value::from(0_i64))]), vec![]));
        assert_eq!(off.toggle_state(), ToggleState::Off);

        let weird = LayoutNode::from_raw((3, props(&[("toggle-state", Value::from(5_i32))]), vec![]));
        assert_eq!(weird.toggle_state(), ToggleState::Indeterminate);

        let absent = LayoutNode::from_raw((4, HashMap::new(), vec![]));
        assert_eq!(absent.toggle_state(), ToggleState::Indeterminate);
    }

    #[test]
    fn reads_accessory_properties() {
        let node = LayoutNode::from_raw((
            9,
            props(&[
                ("icon-name", Value::from("document-open")),
                ("disposition", Value::from("warning")),
                ("toggle-type", Value::from("radio")),
            ]),
            vec![],
        ));

        assert_eq!(node.icon_name(), "document-open");
        assert_eq!(node.disposition(), Disposition::Warning);
        assert_eq!(node.toggle_type(), ToggleType::Radio);
        assert!(node.icon_data().is_empty());
        assert!(node.shortcut().is_empty());
    }

    #[test]
    fn decodes_icon_data_bytes() {
        let node = LayoutNode::from_raw((
            3,
            props(&[("icon-data", Value::from(vec![0x89_u8, b'P', b'N', b'G']))]),
            vec![],
        ));
        assert_eq!(node.icon_data(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn decodes_shortcut_key_presses() {
        let shortcut = Value::from(vec![
            vec!["Control".to_string(), "Q".to_string()],
            vec!["Alt".to_string(), "X".to_string()],
        ]);
        let node = LayoutNode::from_raw((1, props(&[("shortcut", shortcut)]), vec![]));

        assert_eq!(
            node.shortcut(),
            vec![vec!["Control".to_string(), "Q".to_string()], vec![
                "Alt".to_string(),
                "X".to_string()
            ]],
        );
    }

    #[test]
    fn absent_flags_default_to_shown_and_enabled() {
        let node = LayoutNode::from_raw((1, HashMap::new(), vec![]));
        assert!(node.is_enabled());
        assert!(node.is_visible());

        let hidden = LayoutNode::from_raw(
            (2, props(&[("enabled", Value::from(false)), ("visible", Value::from(false))]), vec![]),
        );
        assert!(!hidden.is_enabled());
        assert!(!hidden.is_visible());
    }

    #[test]
    fn reencoded_tree_decodes_to_equal_tree() {
        fn encode(node: &LayoutNode) -> RawNode {
            RawNode {
                id: node.id,
                properties: node
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.try_clone().unwrap()))
                    .collect(),
                children: node.children.iter().map(|c| owned(Value::from(encode(c)))).collect(),
            }
        }

        let child = raw(
            5,
            props(&[("label", Value::from("Quit")), ("toggle-state", Value::from(1_i32))]),
            vec![],
        );
        let original = LayoutNode::from_raw((
            0,
            props(&[("children-display", Value::from("submenu"))]),
            vec![node_value(child)],
        ));

        let reencoded = Value::from(encode(&original));
        let decoded = LayoutNode::from_value(&reencoded).unwrap();
        assert_eq!(decoded, original);
    }
}
