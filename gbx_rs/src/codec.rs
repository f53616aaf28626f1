//! Field layouts walked in one place for both directions. Reading fills the
//! record, writing consumes it, and both take the same branches.

use crate::{
    reader::GbxReader,
    schema::{ChunkSchema, Field, FieldKind},
    writer::GbxWriter,
    Context, GbxError, GbxErrorInner, Record, Value,
};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::Write;

pub(crate) enum ReaderWriter<'a, 'n> {
    Reader(&'a mut GbxReader),
    Writer(&'a mut GbxWriter<'n>),
}

/// Enclosing records, searched when a condition inside an array element
/// names a field of the chunk itself.
struct Scope<'s> {
    record: &'s Record,
    parent: Option<&'s Scope<'s>>,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<i64> {
        self.record
            .get_i64(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }
}

pub(crate) fn read_write(
    rw: &mut ReaderWriter<'_, '_>,
    schema: &ChunkSchema,
    record: &mut Record,
) -> Result<(), GbxError> {
    let mut codec = Codec { rw, schema };
    codec.fields(schema.layout(), record, None)
}

struct Codec<'c, 'a, 'n> {
    rw: &'c mut ReaderWriter<'a, 'n>,
    schema: &'c ChunkSchema,
}

impl Codec<'_, '_, '_> {
    fn fields(
        &mut self,
        layout: &[Field],
        record: &mut Record,
        outer: Option<&Scope<'_>>,
    ) -> Result<(), GbxError> {
        for field in layout {
            match field {
                Field::Value { name, kind } => {
                    self.value(name, *kind, record)
                        .with_context(|| format!("Field {}", name))?;
                    if outer.is_none() && *name == "version" {
                        self.check_version(record)?;
                    }
                }

                Field::Array { name, element } => {
                    self.array(name, element, record, outer)
                        .with_context(|| format!("Array {}", name))?;
                }

                Field::If {
                    condition,
                    then,
                    otherwise,
                } => {
                    let lhs = record
                        .get_i64(condition.field)
                        .or_else(|| outer.and_then(|scope| scope.lookup(condition.field)));
                    // a missing field never satisfies a condition
                    let branch = match lhs {
                        Some(lhs) if condition.test(lhs) => then,
                        _ => otherwise,
                    };
                    self.fields(branch, record, outer)?;
                }
            }
        }

        Ok(())
    }

    fn check_version(&self, record: &Record) -> Result<(), GbxError> {
        let Some(version) = record.get_i64("version") else {
            return Ok(());
        };
        if !self.schema.supports_version(version) {
            return Err(GbxErrorInner::ChunkVersionNotSupported {
                chunk_id: self.schema.id,
                version,
            }
            .into());
        }
        Ok(())
    }

    fn array(
        &mut self,
        name: &'static str,
        element: &[Field],
        record: &mut Record,
        outer: Option<&Scope<'_>>,
    ) -> Result<(), GbxError> {
        match &mut *self.rw {
            ReaderWriter::Reader(reader) => {
                let count = reader.read_u32::<LE>().context("Reading array length")?;
                // every element takes at least one byte
                if count as usize > reader.remaining() {
                    return Err(GbxErrorInner::ArrayTooLarge(count).into());
                }

                let mut elements = Vec::with_capacity(count as usize);
                let scope = Scope {
                    record: &*record,
                    parent: outer,
                };
                for i in 0..count {
                    let mut item = Record::new();
                    self.fields(element, &mut item, Some(&scope))
                        .with_context(|| format!("Element {}", i))?;
                    elements.push(item);
                }
                record.set(name, Value::Array(elements));
                Ok(())
            }

            ReaderWriter::Writer(_) => {
                let mut elements = match record.get_mut(name) {
                    Some(Value::Array(elements)) => std::mem::take(elements),
                    Some(_) => {
                        return Err(GbxErrorInner::TypeMismatch {
                            field: name,
                            expected: "Array",
                        }
                        .into())
                    }
                    None => return Err(GbxErrorInner::MissingField { field: name }.into()),
                };

                let result = self.write_elements(element, &mut elements, record, outer);
                record.set(name, Value::Array(elements));
                result
            }
        }
    }

    fn write_elements(
        &mut self,
        element: &[Field],
        elements: &mut [Record],
        record: &Record,
        outer: Option<&Scope<'_>>,
    ) -> Result<(), GbxError> {
        if let ReaderWriter::Writer(writer) = &mut *self.rw {
            writer
                .write_u32::<LE>(elements.len() as u32)
                .context("Writing array length")?;
        }

        let scope = Scope {
            record,
            parent: outer,
        };
        for (i, item) in elements.iter_mut().enumerate() {
            self.fields(element, item, Some(&scope))
                .with_context(|| format!("Element {}", i))?;
        }
        Ok(())
    }

    fn value(&mut self, name: &'static str, kind: FieldKind, record: &mut Record) -> Result<(), GbxError> {
        match &mut *self.rw {
            ReaderWriter::Reader(reader) => {
                let value = read_value(reader, kind, self.schema)?;
                record.set(name, value);
                Ok(())
            }
            ReaderWriter::Writer(writer) => {
                let value = record
                    .get(name)
                    .ok_or(GbxErrorInner::MissingField { field: name })?;
                write_value(writer, name, kind, value)
            }
        }
    }
}

fn read_value(reader: &mut GbxReader, kind: FieldKind, schema: &ChunkSchema) -> Result<Value, GbxError> {
    Ok(match kind {
        FieldKind::U8 => Value::U8(reader.read_u8()?),
        FieldKind::I16 => Value::I16(reader.read_i16::<LE>()?),
        FieldKind::U16 => Value::U16(reader.read_u16::<LE>()?),
        FieldKind::I32 => Value::I32(reader.read_i32::<LE>()?),
        FieldKind::U32 => Value::U32(reader.read_u32::<LE>()?),
        FieldKind::U64 => Value::U64(reader.read_u64::<LE>()?),
        FieldKind::U128 => Value::U128(reader.read_u128::<LE>()?),
        FieldKind::F32 => Value::F32(reader.read_f32::<LE>()?),
        FieldKind::Bool => Value::Bool(reader.read_bool()?),
        FieldKind::String => Value::String(reader.read_string()?),
        FieldKind::Id => Value::Id(reader.read_id()?),
        FieldKind::Ident => Value::Ident(reader.read_ident()?),
        FieldKind::NodeRef => Value::NodeRef(reader.read_node_ref()?),
        FieldKind::Time => Value::Time(reader.read_time()?),
        FieldKind::FileRef => Value::FileRef(reader.read_file_ref()?),
        FieldKind::Vec2 => Value::Vec2(reader.read_vec2()?),
        FieldKind::Vec3 => Value::Vec3(reader.read_vec3()?),
        FieldKind::Int3 => Value::Int3(reader.read_int3()?),
        FieldKind::Byte3 => Value::Byte3(reader.read_byte3()?),
        FieldKind::Bytes(count) => Value::Bytes(reader.read_bytes(count)?),
        FieldKind::Rest => Value::Bytes(reader.read_rest()?),
        FieldKind::Scan => Value::Bytes(reader.scan(schema.id)?),
    })
}

fn write_value(
    writer: &mut GbxWriter<'_>,
    name: &'static str,
    kind: FieldKind,
    value: &Value,
) -> Result<(), GbxError> {
    match (kind, value) {
        (FieldKind::U8, Value::U8(value)) => writer.write_u8(*value)?,
        (FieldKind::I16, Value::I16(value)) => writer.write_i16::<LE>(*value)?,
        (FieldKind::U16, Value::U16(value)) => writer.write_u16::<LE>(*value)?,
        (FieldKind::I32, Value::I32(value)) => writer.write_i32::<LE>(*value)?,
        (FieldKind::U32, Value::U32(value)) => writer.write_u32::<LE>(*value)?,
        (FieldKind::U64, Value::U64(value)) => writer.write_u64::<LE>(*value)?,
        (FieldKind::U128, Value::U128(value)) => writer.write_u128::<LE>(*value)?,
        (FieldKind::F32, Value::F32(value)) => writer.write_f32::<LE>(*value)?,
        (FieldKind::Bool, Value::Bool(value)) => writer.write_bool(*value)?,
        (FieldKind::String, Value::String(value)) => writer.write_string(value)?,
        (FieldKind::Id, Value::Id(value)) => writer.write_id(value)?,
        (FieldKind::Ident, Value::Ident(value)) => writer.write_ident(value)?,
        (FieldKind::NodeRef, Value::NodeRef(value)) => writer.write_node_ref(*value)?,
        (FieldKind::Time, Value::Time(value)) => writer.write_time(*value)?,
        (FieldKind::FileRef, Value::FileRef(value)) => writer.write_file_ref(value)?,
        (FieldKind::Vec2, Value::Vec2(value)) => writer.write_vec2(*value)?,
        (FieldKind::Vec3, Value::Vec3(value)) => writer.write_vec3(*value)?,
        (FieldKind::Int3, Value::Int3(value)) => writer.write_int3(*value)?,
        (FieldKind::Byte3, Value::Byte3(value)) => writer.write_byte3(*value)?,
        (FieldKind::Bytes(count), Value::Bytes(bytes)) if bytes.len() == count => {
            writer.write_all(bytes)?
        }
        (FieldKind::Rest | FieldKind::Scan, Value::Bytes(bytes)) => writer.write_all(bytes)?,
        _ => {
            return Err(GbxErrorInner::TypeMismatch {
                field: name,
                expected: kind.name(),
            }
            .into())
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        node::NodeTable,
        schema::{classes, layout},
        ClassId, ReadSettings, RemapPolicy,
    };
    use bytes::Bytes;

    fn chunk(fields: Vec<Field>) -> ChunkSchema {
        ChunkSchema::new(ClassId::new(0x0a001000), 0x001)
            .versions(0, 3)
            .fields(fields)
    }

    fn read(schema: &ChunkSchema, bytes: &[u8]) -> (Result<(), GbxError>, Record, usize) {
        let mut reader = GbxReader::new(Bytes::copy_from_slice(bytes), ReadSettings::default());
        let mut record = Record::new();
        let result = read_write(&mut ReaderWriter::Reader(&mut reader), schema, &mut record);
        (result, record, reader.remaining())
    }

    fn write(schema: &ChunkSchema, record: &mut Record) -> Result<Vec<u8>, GbxError> {
        let nodes = NodeTable::default();
        let mut writer = GbxWriter::new(&nodes, RemapPolicy::Latest);
        read_write(&mut ReaderWriter::Writer(&mut writer), schema, record)?;
        Ok(writer.into_inner())
    }

    #[test]
    fn conditional_field_present() {
        let schema = chunk(layout! {
            version: int,
            if version >= 2 { name: string }
        });
        let bytes = b"\x03\x00\x00\x00\x03\x00\x00\x00Foo";
        let (result, mut record, remaining) = read(&schema, bytes);
        result.unwrap();
        assert_eq!(remaining, 0);
        assert_eq!(record.get_i64("version"), Some(3));
        assert_eq!(record.get_str("name"), Some("Foo"));

        assert_eq!(write(&schema, &mut record).unwrap(), bytes);
    }

    #[test]
    fn conditional_field_absent() {
        let schema = chunk(layout! {
            version: int,
            if version >= 2 { name: string }
        });
        let (result, mut record, _) = read(&schema, b"\x01\x00\x00\x00");
        result.unwrap();
        assert!(record.get("name").is_none());

        // a stray value for an inactive branch is not written
        record.set("name", Value::String("ignored".into()));
        assert_eq!(write(&schema, &mut record).unwrap(), b"\x01\x00\x00\x00");
    }

    #[test]
    fn unsupported_version() {
        let schema = chunk(layout! { version: int, name: string });
        let (result, _, remaining) = read(&schema, b"\x09\x00\x00\x00\x03\x00\x00\x00Foo");
        assert!(matches!(
            *result.unwrap_err(),
            GbxErrorInner::ChunkVersionNotSupported { version: 9, .. }
        ));
        assert_eq!(remaining, 7);
    }

    #[test]
    fn arrays_see_enclosing_fields() {
        let schema = chunk(layout! {
            version: int,
            keys: [
                time: float,
                if version >= 1 { value: float } else { old: int16 }
            ],
        });

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        for (time, value) in [(0.5f32, 1.0f32), (1.5, 2.0)] {
            bytes.extend_from_slice(&time.to_le_bytes());
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let (result, mut record, remaining) = read(&schema, &bytes);
        result.unwrap();
        assert_eq!(remaining, 0);
        let keys = record.get("keys").and_then(Value::as_array).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].get("value"), Some(&Value::F32(2.0)));
        assert!(keys[0].get("old").is_none());

        assert_eq!(write(&schema, &mut record).unwrap(), bytes);
        assert_eq!(record.get("keys").and_then(Value::as_array).map(<[_]>::len), Some(2));
    }

    #[test]
    fn oversized_array_is_rejected() {
        let schema = chunk(layout! { keys: [ time: float ] });
        let (result, _, _) = read(&schema, b"\xff\xff\xff\x7f\x00\x00");
        assert!(matches!(*result.unwrap_err(), GbxErrorInner::ArrayTooLarge(0x7fff_ffff)));
    }

    #[test]
    fn missing_and_mismatched_fields() {
        let schema = chunk(layout! { version: int, name: string });
        let mut record = Record::new();
        record.set("version", Value::I32(1));
        assert!(matches!(
            *write(&schema, &mut record).unwrap_err(),
            GbxErrorInner::MissingField { field: "name" }
        ));

        record.set("name", Value::U32(1));
        assert!(matches!(
            *write(&schema, &mut record).unwrap_err(),
            GbxErrorInner::TypeMismatch {
                field: "name",
                expected: "String"
            }
        ));
    }

    #[test]
    fn masked_conditions_and_fixed_bytes() {
        let schema = chunk(layout! {
            flags: uint,
            if flags & 4 == 4 { checksum: bytes(4) }
            tail: byte,
        });
        let bytes = [0x0c, 0, 0, 0, 1, 2, 3, 4, 9];
        let (result, mut record, _) = read(&schema, &bytes);
        result.unwrap();
        assert_eq!(
            record.get("checksum"),
            Some(&Value::Bytes(Bytes::from_static(&[1, 2, 3, 4])))
        );
        assert_eq!(write(&schema, &mut record).unwrap(), bytes);

        record.set("checksum", Value::Bytes(Bytes::from_static(&[1, 2])));
        assert!(write(&schema, &mut record).is_err());
    }

    mod declared {
        use super::*;

        classes! {
            Sample 0x0a002000 {
                #[versions(0, 1)] 0x001 { version: int, names: [ name: id ] }
            }
        }

        #[test]
        fn ids_share_the_scope() {
            let definitions = definitions();
            let schema = definitions[0]
                .own_chunks()
                .next()
                .unwrap();
            assert_eq!(schema.id, class::Sample.chunk(1));

            let mut record = Record::new();
            record.set("version", Value::I32(1));
            let names = ["Stadium", "Stadium", "Valley"]
                .into_iter()
                .map(|name| {
                    let mut item = Record::new();
                    item.set("name", Value::Id(name.into()));
                    item
                })
                .collect();
            record.set("names", Value::Array(names));

            let bytes = write(schema, &mut record).unwrap();
            // version, count, lookback version, new, new string, back-reference, new
            assert_eq!(bytes.len(), 4 + 4 + 4 + 4 + 4 + 7 + 4 + 4 + 4 + 6);

            let (result, read_back, remaining) = read(schema, &bytes);
            result.unwrap();
            assert_eq!(remaining, 0);
            assert_eq!(read_back, record);
        }
    }
}
