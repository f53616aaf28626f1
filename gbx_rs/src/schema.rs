use crate::{ChunkId, ClassId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
pub enum FieldKind {
    U8,
    I16,
    U16,
    I32,
    U32,
    U64,
    U128,
    F32,
    /// 32-bit, nonzero is true.
    Bool,
    String,
    Id,
    Ident,
    NodeRef,
    Time,
    FileRef,
    Vec2,
    Vec3,
    Int3,
    Byte3,
    Bytes(usize),
    /// Whatever is left of a length-framed chunk.
    Rest,
    /// Bytes up to the next chunk of the same class or the end of the node.
    Scan,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Lowercase names used by the declaration macros.
#[allow(non_upper_case_globals)]
pub(crate) mod kinds {
    use super::FieldKind;

    pub const byte: FieldKind = FieldKind::U8;
    pub const int16: FieldKind = FieldKind::I16;
    pub const uint16: FieldKind = FieldKind::U16;
    pub const int: FieldKind = FieldKind::I32;
    pub const uint: FieldKind = FieldKind::U32;
    pub const uint64: FieldKind = FieldKind::U64;
    pub const uint128: FieldKind = FieldKind::U128;
    pub const float: FieldKind = FieldKind::F32;
    pub const bool: FieldKind = FieldKind::Bool;
    pub const string: FieldKind = FieldKind::String;
    pub const id: FieldKind = FieldKind::Id;
    pub const ident: FieldKind = FieldKind::Ident;
    pub const node: FieldKind = FieldKind::NodeRef;
    pub const time: FieldKind = FieldKind::Time;
    pub const fileref: FieldKind = FieldKind::FileRef;
    pub const vec2: FieldKind = FieldKind::Vec2;
    pub const vec3: FieldKind = FieldKind::Vec3;
    pub const int3: FieldKind = FieldKind::Int3;
    pub const byte3: FieldKind = FieldKind::Byte3;
    pub const rest: FieldKind = FieldKind::Rest;
    pub const scan: FieldKind = FieldKind::Scan;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `field [& mask] op value`, evaluated against fields already in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub field: &'static str,
    pub mask: Option<i64>,
    pub op: Comparison,
    pub value: i64,
}

impl Condition {
    pub const fn new(field: &'static str, mask: Option<i64>, op: Comparison, value: i64) -> Self {
        Condition {
            field,
            mask,
            op,
            value,
        }
    }

    pub const fn truthy(field: &'static str) -> Self {
        Condition::new(field, None, Comparison::Ne, 0)
    }

    pub fn test(&self, lhs: i64) -> bool {
        let lhs = match self.mask {
            Some(mask) => lhs & mask,
            None => lhs,
        };
        match self.op {
            Comparison::Eq => lhs == self.value,
            Comparison::Ne => lhs != self.value,
            Comparison::Lt => lhs < self.value,
            Comparison::Le => lhs <= self.value,
            Comparison::Gt => lhs > self.value,
            Comparison::Ge => lhs >= self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Value {
        name: &'static str,
        kind: FieldKind,
    },
    /// `u32` count, then that many records of `element`.
    Array {
        name: &'static str,
        element: Vec<Field>,
    },
    If {
        condition: Condition,
        then: Vec<Field>,
        otherwise: Vec<Field>,
    },
}

impl Field {
    pub const fn value(name: &'static str, kind: FieldKind) -> Field {
        Field::Value { name, kind }
    }

    pub fn array(name: &'static str, element: Vec<Field>) -> Field {
        Field::Array { name, element }
    }

    pub fn when(condition: Condition, then: Vec<Field>, otherwise: Vec<Field>) -> Field {
        Field::If {
            condition,
            then,
            otherwise,
        }
    }
}

/// Field layout and handling flags of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSchema {
    pub id: ChunkId,
    skippable: bool,
    ignored: bool,
    eager: bool,
    header: bool,
    own_ids: bool,
    versions: Option<(i64, i64)>,
    fields: Vec<Field>,
}

impl ChunkSchema {
    pub fn new(class: ClassId, index: u16) -> Self {
        ChunkSchema {
            id: class.chunk(index),
            skippable: false,
            ignored: false,
            eager: false,
            header: false,
            own_ids: false,
            versions: None,
            fields: Vec::new(),
        }
    }

    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }

    /// Known but never parsed.
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Discovered while the body is read instead of on demand.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    pub fn header(mut self) -> Self {
        self.header = true;
        self
    }

    /// The chunk payload opens its own lookback scope.
    pub fn own_ids(mut self) -> Self {
        self.own_ids = true;
        self
    }

    /// Accepted range of the chunk's top-level `version` field.
    pub fn versions(mut self, min: i64, max: i64) -> Self {
        self.versions = Some((min, max));
        self
    }

    pub fn fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    pub fn layout(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    pub fn is_header(&self) -> bool {
        self.header
    }

    pub fn has_own_ids(&self) -> bool {
        self.own_ids
    }

    /// Whether the fields can be encoded back, as opposed to re-emitting
    /// the bytes that were read.
    pub fn writes_fields(&self) -> bool {
        !self.ignored
    }

    pub fn supports_version(&self, version: i64) -> bool {
        match self.versions {
            Some((min, max)) => (min..=max).contains(&version),
            None => true,
        }
    }
}

/// Chunks declared by one class, plus its place in the hierarchy.
#[derive(Debug, Clone)]
pub struct ClassSchema {
    pub name: &'static str,
    pub id: ClassId,
    pub parent: Option<ClassId>,
    pub(crate) ancestors: Vec<ClassId>,
    pub(crate) chunks: HashMap<ChunkId, ChunkSchema>,
    pub(crate) header_chunks: HashMap<ChunkId, ChunkSchema>,
}

impl ClassSchema {
    pub fn new(name: &'static str, id: ClassId, parent: Option<ClassId>) -> Self {
        ClassSchema {
            name,
            id,
            parent,
            ancestors: vec![id],
            chunks: HashMap::new(),
            header_chunks: HashMap::new(),
        }
    }

    pub fn chunk(mut self, chunk: ChunkSchema) -> Self {
        let map = if chunk.header {
            &mut self.header_chunks
        } else {
            &mut self.chunks
        };
        if map.insert(chunk.id, chunk).is_some() {
            tracing::warn!("Duplicate chunk declaration in {}", self.name);
        }
        self
    }

    /// This class followed by its ancestors, nearest first.
    pub fn ancestors(&self) -> &[ClassId] {
        &self.ancestors
    }

    pub fn own_chunks(&self) -> impl Iterator<Item = &ChunkSchema> {
        self.chunks.values()
    }
}

macro_rules! cmp {
    (==) => { $crate::schema::Comparison::Eq };
    (!=) => { $crate::schema::Comparison::Ne };
    (<) => { $crate::schema::Comparison::Lt };
    (<=) => { $crate::schema::Comparison::Le };
    (>) => { $crate::schema::Comparison::Gt };
    (>=) => { $crate::schema::Comparison::Ge };
}
pub(crate) use cmp;

/// Builds a `Vec<Field>` from a field list.
///
/// ```text
/// version: int,
/// name: string,
/// if version >= 2 { author: ident }
/// if flags & 0x8000 == 0x8000 { skin: node } else { tag: string }
/// blocks: [ name: id, direction: byte ],
/// checksum: bytes(32),
/// ```
macro_rules! layout {
    (@munch [$($out:expr,)*]) => {
        <::std::vec::Vec<$crate::schema::Field>>::from([$($out,)*])
    };

    (@munch [$($out:expr,)*]
        if $field:ident & $mask:literal $op:tt $value:literal { $($then:tt)* } else { $($else:tt)* }
        $($rest:tt)*
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::when(
            $crate::schema::Condition::new(stringify!($field), Some($mask), $crate::schema::cmp!($op), $value),
            $crate::schema::layout!(@munch [] $($then)*),
            $crate::schema::layout!(@munch [] $($else)*),
        ),] $($rest)*)
    };

    (@munch [$($out:expr,)*]
        if $field:ident & $mask:literal $op:tt $value:literal { $($then:tt)* }
        $($rest:tt)*
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::when(
            $crate::schema::Condition::new(stringify!($field), Some($mask), $crate::schema::cmp!($op), $value),
            $crate::schema::layout!(@munch [] $($then)*),
            ::std::vec::Vec::new(),
        ),] $($rest)*)
    };

    (@munch [$($out:expr,)*]
        if $field:ident $op:tt $value:literal { $($then:tt)* } else { $($else:tt)* }
        $($rest:tt)*
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::when(
            $crate::schema::Condition::new(stringify!($field), None, $crate::schema::cmp!($op), $value),
            $crate::schema::layout!(@munch [] $($then)*),
            $crate::schema::layout!(@munch [] $($else)*),
        ),] $($rest)*)
    };

    (@munch [$($out:expr,)*]
        if $field:ident $op:tt $value:literal { $($then:tt)* }
        $($rest:tt)*
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::when(
            $crate::schema::Condition::new(stringify!($field), None, $crate::schema::cmp!($op), $value),
            $crate::schema::layout!(@munch [] $($then)*),
            ::std::vec::Vec::new(),
        ),] $($rest)*)
    };

    (@munch [$($out:expr,)*]
        if $field:ident { $($then:tt)* } else { $($else:tt)* }
        $($rest:tt)*
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::when(
            $crate::schema::Condition::truthy(stringify!($field)),
            $crate::schema::layout!(@munch [] $($then)*),
            $crate::schema::layout!(@munch [] $($else)*),
        ),] $($rest)*)
    };

    (@munch [$($out:expr,)*]
        if $field:ident { $($then:tt)* }
        $($rest:tt)*
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::when(
            $crate::schema::Condition::truthy(stringify!($field)),
            $crate::schema::layout!(@munch [] $($then)*),
            ::std::vec::Vec::new(),
        ),] $($rest)*)
    };

    (@munch [$($out:expr,)*]
        $name:ident : [ $($element:tt)* ] $(, $($rest:tt)*)?
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::array(
            stringify!($name),
            $crate::schema::layout!(@munch [] $($element)*),
        ),] $($($rest)*)?)
    };

    (@munch [$($out:expr,)*]
        $name:ident : bytes($len:literal) $(, $($rest:tt)*)?
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::value(
            stringify!($name),
            $crate::schema::FieldKind::Bytes($len),
        ),] $($($rest)*)?)
    };

    (@munch [$($out:expr,)*]
        $name:ident : $kind:ident $(, $($rest:tt)*)?
    ) => {
        $crate::schema::layout!(@munch [$($out,)* $crate::schema::Field::value(
            stringify!($name),
            $crate::schema::kinds::$kind,
        ),] $($($rest)*)?)
    };

    ($($tt:tt)*) => {
        $crate::schema::layout!(@munch [] $($tt)*)
    };
}
pub(crate) use layout;

/// Declares classes and their chunks, producing a `class` module of IDs and
/// a `definitions()` function for the registry.
///
/// ```text
/// CGameCtnCollector 0x2e001000: CMwNod {
///     #[header] 0x003 { ident: ident, version: byte }
///     #[skippable] #[versions(0, 8)] 0x009 { version: int, page_name: string }
/// }
/// ```
macro_rules! classes {
    ($(
        $name:ident $id:literal $(: $parent:ident)? {
            $(
                $(#[$attr:ident $(($($arg:expr),*))?])*
                $index:literal { $($fields:tt)* }
            )*
        }
    )*) => {
        /// IDs of the classes with compiled-in schemas.
        #[allow(non_upper_case_globals)]
        pub mod class {
            use $crate::ClassId;

            $(pub const $name: ClassId = ClassId::new($id);)*
        }

        pub(crate) fn definitions() -> ::std::vec::Vec<$crate::schema::ClassSchema> {
            ::std::vec![$({
                let parent = ::std::option::Option::<$crate::ClassId>::None $(.or(Some(class::$parent)))?;
                $crate::schema::ClassSchema::new(stringify!($name), class::$name, parent)
                    $(.chunk(
                        $crate::schema::ChunkSchema::new(class::$name, $index)
                            $(.$attr($($($arg),*)?))*
                            .fields($crate::schema::layout!($($fields)*))
                    ))*
            }),*]
        }
    };
}
pub(crate) use classes;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_macro_shapes() {
        let fields = layout! {
            version: int,
            name: string,
            if version >= 2 { author: ident }
            if flags & 0x8000 == 0x8000 { skin: node } else { tag: string }
            blocks: [ name: id, direction: byte ],
            checksum: bytes(32),
        };

        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], Field::value("version", FieldKind::I32));
        assert!(matches!(
            &fields[2],
            Field::If { condition, then, otherwise }
                if condition.field == "version"
                    && condition.op == Comparison::Ge
                    && condition.value == 2
                    && then.len() == 1
                    && otherwise.is_empty()
        ));
        assert!(matches!(
            &fields[3],
            Field::If { condition, otherwise, .. }
                if condition.mask == Some(0x8000) && otherwise.len() == 1
        ));
        assert!(matches!(&fields[4], Field::Array { name: "blocks", element } if element.len() == 2));
        assert_eq!(fields[5], Field::value("checksum", FieldKind::Bytes(32)));
    }

    #[test]
    fn empty_layout() {
        let fields = layout! {};
        assert!(fields.is_empty());
    }

    #[test]
    fn conditions() {
        assert!(Condition::new("v", None, Comparison::Ge, 3).test(3));
        assert!(!Condition::new("v", None, Comparison::Lt, 3).test(3));
        assert!(Condition::new("flags", Some(4), Comparison::Eq, 0).test(0b1011));
        assert!(Condition::truthy("b").test(1));
        assert!(!Condition::truthy("b").test(0));
        assert!(Condition::new("v", None, Comparison::Eq, -1).test(-1));
    }

    #[test]
    fn chunk_flags() {
        let chunk = ChunkSchema::new(ClassId::new(0x0308c000), 0x029)
            .skippable()
            .ignored()
            .fields(layout! { description: string });
        assert!(chunk.is_skippable());
        assert!(!chunk.writes_fields());

        let chunk = ChunkSchema::new(ClassId::new(0x03043000), 0x004)
            .versions(0, 6)
            .fields(layout! { version: int, data: rest });
        assert!(chunk.writes_fields());
        assert!(chunk.supports_version(6));
        assert!(!chunk.supports_version(7));
        assert_eq!(chunk.id, ChunkId::new(0x03043004));
    }
}
