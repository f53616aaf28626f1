use crate::{GbxError, GbxErrorInner, NodeIndex};
use bytes::Bytes;
use std::fmt::Display;

/// Lookback string. Identifiers like block and environment names are
/// written once per scope and referred to by index afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Id {
    #[default]
    Empty,
    Unassigned,
    /// Collection IDs stored as numbers.
    Number(u32),
    String(String),
}

impl Id {
    /// No identifier. A raw `0` reads as [`Id::Number`] so it can be written
    /// back as is, but it means the same as [`Id::Empty`].
    pub fn is_empty(&self) -> bool {
        match self {
            Id::Empty | Id::Number(0) => true,
            Id::String(string) => string.is_empty(),
            Id::Unassigned | Id::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Id::Empty => Some(""),
            Id::Unassigned => Some("Unassigned"),
            Id::Number(_) => None,
            Id::String(string) => Some(string),
        }
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Id::Empty
        } else {
            Id::String(value.to_owned())
        }
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Id::Empty => Ok(()),
            Id::Unassigned => write!(f, "Unassigned"),
            Id::Number(number) => write!(f, "{}", number),
            Id::String(string) => write!(f, "{}", string),
        }
    }
}

/// id, collection, author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Ident {
    pub id: Id,
    pub collection: Id,
    pub author: Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeRef {
    #[default]
    Null,
    /// A node in this body's node table.
    Internal(NodeIndex),
    /// A node in another file, listed in the reference table.
    External(u32),
}

impl NodeRef {
    pub fn index(self) -> Option<NodeIndex> {
        match self {
            NodeRef::Internal(index) => Some(index),
            _ => None,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, NodeRef::Null)
    }
}

/// Hundredths of a second, `-1` when not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeInt(pub i32);

impl TimeInt {
    pub const NOT_SET: TimeInt = TimeInt(-1);

    pub fn is_set(self) -> bool {
        self != TimeInt::NOT_SET
    }

    pub fn as_duration(self) -> Option<time::Duration> {
        self.is_set()
            .then(|| time::Duration::milliseconds(self.0 as i64 * 10))
    }

    /// Sub-hundredth precision is dropped. Fails for durations that do not
    /// fit, and for the one that would read back as unset.
    pub fn from_duration(duration: Option<time::Duration>) -> Result<TimeInt, GbxError> {
        let Some(duration) = duration else {
            return Ok(TimeInt::NOT_SET);
        };
        let hundredths = duration.whole_milliseconds() / 10;
        match i32::try_from(hundredths) {
            Ok(-1) | Err(_) => Err(GbxErrorInner::TimeOutOfRange(hundredths).into()),
            Ok(hundredths) => Ok(TimeInt(hundredths)),
        }
    }
}

impl Default for TimeInt {
    fn default() -> Self {
        TimeInt::NOT_SET
    }
}

impl Display for TimeInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_set() {
            return write!(f, "-:--.--");
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        let hundredths = self.0.unsigned_abs();
        write!(
            f,
            "{}{}:{:02}.{:02}",
            sign,
            hundredths / 6000,
            (hundredths / 100) % 60,
            hundredths % 100
        )
    }
}

/// Reference to a file by path, e.g. a skin or music pack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileRef {
    pub version: u8,
    pub checksum: Option<[u8; 32]>,
    pub path: String,
    pub locator_url: Option<String>,
}

impl FileRef {
    pub(crate) fn has_locator_url(version: u8, path: &str) -> bool {
        (!path.is_empty() && version >= 1) || version >= 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    U64(u64),
    U128(u128),
    F32(f32),
    Bool(bool),
    String(String),
    Id(Id),
    Ident(Ident),
    NodeRef(NodeRef),
    Time(TimeInt),
    FileRef(FileRef),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Int3([i32; 3]),
    Byte3([u8; 3]),
    Bytes(Bytes),
    Array(Vec<Record>),
}

impl Value {
    /// Integer view used when evaluating layout conditions.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::U8(value) => Some(*value as i64),
            Value::I16(value) => Some(*value as i64),
            Value::U16(value) => Some(*value as i64),
            Value::I32(value) => Some(*value as i64),
            Value::U32(value) => Some(*value as i64),
            Value::U64(value) => Some(*value as i64),
            Value::Bool(value) => Some(*value as i64),
            Value::Time(value) => Some(value.0 as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(string) => Some(string),
            Value::Id(id) => id.as_str(),
            _ => None,
        }
    }

    pub fn as_node_ref(&self) -> Option<NodeRef> {
        match self {
            Value::NodeRef(node) => Some(*node),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Record]> {
        match self {
            Value::Array(records) => Some(records),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::U8(_) => "U8",
            Value::I16(_) => "I16",
            Value::U16(_) => "U16",
            Value::I32(_) => "I32",
            Value::U32(_) => "U32",
            Value::U64(_) => "U64",
            Value::U128(_) => "U128",
            Value::F32(_) => "F32",
            Value::Bool(_) => "Bool",
            Value::String(_) => "String",
            Value::Id(_) => "Id",
            Value::Ident(_) => "Ident",
            Value::NodeRef(_) => "NodeRef",
            Value::Time(_) => "Time",
            Value::FileRef(_) => "FileRef",
            Value::Vec2(_) => "Vec2",
            Value::Vec3(_) => "Vec3",
            Value::Int3(_) => "Int3",
            Value::Byte3(_) => "Byte3",
            Value::Bytes(_) => "Bytes",
            Value::Array(_) => "Array",
        }
    }
}

/// Named field values of one chunk, in layout order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Replaces the value of `name`, or appends it.
    pub fn set(&mut self, name: &'static str, value: Value) {
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let position = self.fields.iter().position(|(field, _)| *field == name)?;
        Some(self.fields.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_set_replaces_in_place() {
        let mut record = Record::new();
        record.set("version", Value::I32(3));
        record.set("name", Value::String("Foo".into()));
        record.set("version", Value::I32(4));

        let names: Vec<_> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["version", "name"]);
        assert_eq!(record.get_i64("version"), Some(4));
        assert_eq!(record.get_str("name"), Some("Foo"));
        assert_eq!(record.remove("version"), Some(Value::I32(4)));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn time_conversions() {
        let time = TimeInt(6_123);
        assert_eq!(time.as_duration(), Some(time::Duration::milliseconds(61_230)));
        assert_eq!(time.to_string(), "1:01.23");
        assert_eq!(TimeInt::NOT_SET.as_duration(), None);
        assert_eq!(TimeInt::NOT_SET.to_string(), "-:--.--");
        assert_eq!(TimeInt::from_duration(None).unwrap(), TimeInt::NOT_SET);
        assert_eq!(
            TimeInt::from_duration(Some(time::Duration::seconds(2))).unwrap(),
            TimeInt(200)
        );
        assert_eq!(
            TimeInt::from_duration(Some(time::Duration::milliseconds(1_239))).unwrap(),
            TimeInt(123)
        );
    }

    #[test]
    fn times_that_do_not_fit() {
        let too_long = time::Duration::seconds(i32::MAX as i64);
        assert!(matches!(
            *TimeInt::from_duration(Some(too_long)).unwrap_err(),
            GbxErrorInner::TimeOutOfRange(_)
        ));
        let unset = time::Duration::milliseconds(-10);
        assert!(TimeInt::from_duration(Some(unset)).is_err());
    }

    #[test]
    fn ids() {
        assert_eq!(Id::from(""), Id::Empty);
        assert_eq!(Id::from("Stadium").as_str(), Some("Stadium"));
        assert_eq!(Id::Number(26).as_str(), None);
        assert_eq!(Id::Unassigned.to_string(), "Unassigned");
        assert!(Id::Number(0).is_empty());
        assert!(Id::Empty.is_empty());
        assert!(!Id::Number(26).is_empty());
        assert!(!Id::Unassigned.is_empty());
    }
}
