use crate::class_object::ClassObject;
use crate::value::WbemValue;
use crate::WbemResult;
use log::warn;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One query result: an ordered mapping from property name to decoded value.
///
/// Insertion order follows the provider's property enumeration order, which
/// is stable for one query object but not across queries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    properties: Vec<(String, WbemValue)>,
}

impl Row {
    pub(crate) fn push(&mut self, name: String, value: WbemValue) {
        self.properties.push((name, value));
    }

    /// Look up a property by name.
    pub fn get(&self, name: &str) -> Option<&WbemValue> {
        self.properties
            .iter()
            .find(|(prop, _)| prop == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Property names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WbemValue)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl IntoIterator for Row {
    type Item = (String, WbemValue);
    type IntoIter = std::vec::IntoIter<(String, WbemValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.properties.len()))?;
        for (name, value) in &self.properties {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Materialize one class object into a [`Row`].
///
/// Properties are visited in the provider's enumeration order. A property
/// whose fetch fails is logged and skipped, so one faulty property does not
/// lose the rest of the row. If the property names themselves cannot be
/// enumerated, the row is reported absent and the caller decides what to do
/// with the object.
pub(crate) fn materialize(obj: &ClassObject) -> WbemResult<Row> {
    let names = obj.list_properties()?;

    let mut row = Row::default();

    for name in names {
        match obj.get_property(&name) {
            Ok(value) => row.push(name, value),
            Err(e) => {
                warn!("Could not read property {:?}: {}", name, e);
            }
        }
    }

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let mut row = Row::default();
        row.push("Name".to_string(), WbemValue::String("svchost".to_string()));
        row.push("ProcessId".to_string(), WbemValue::I4(1184));
        row.push("SessionId".to_string(), WbemValue::Null);
        row
    }

    #[test]
    fn it_preserves_insertion_order() {
        let row = sample_row();

        let names: Vec<_> = row.names().collect();
        assert_eq!(names, ["Name", "ProcessId", "SessionId"]);
    }

    #[test]
    fn it_looks_up_by_name() {
        let row = sample_row();

        assert_eq!(row.get("ProcessId"), Some(&WbemValue::I4(1184)));
        assert_eq!(row.get("NoSuchProperty"), None);
        assert!(row.get("SessionId").unwrap().is_null());
    }

    #[test]
    fn it_serializes_as_a_map() {
        let row = sample_row();

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"Name":"svchost","ProcessId":1184,"SessionId":null}"#
        );
    }
}
