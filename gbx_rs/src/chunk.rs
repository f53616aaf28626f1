use crate::{
    codec::{self, ReaderWriter},
    diagnostics::{Diagnostic, DiagnosticKind},
    node::NodeTable,
    reader::{GbxReader, IdState},
    schema::ChunkSchema,
    ChunkId, GbxError, ReadSettings, Record, Value,
};
use bytes::Bytes;

/// One chunk of a node's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Regular(RegularChunk),
    Skippable(SkippableChunk),
}

impl Chunk {
    pub fn id(&self) -> ChunkId {
        match self {
            Chunk::Regular(chunk) => chunk.id,
            Chunk::Skippable(chunk) => chunk.id,
        }
    }

    pub fn is_skippable(&self) -> bool {
        matches!(self, Chunk::Skippable(_))
    }

    /// Parsed fields, if the chunk has been parsed.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Chunk::Regular(chunk) => Some(&chunk.record),
            Chunk::Skippable(chunk) => chunk.record.as_ref(),
        }
    }

    pub fn record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Chunk::Regular(chunk) => Some(&mut chunk.record),
            Chunk::Skippable(chunk) => chunk.record.as_mut(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record()?.get(name)
    }

    pub fn version(&self) -> Option<i64> {
        self.record()?.get_i64("version")
    }
}

/// A chunk without length framing. Always parsed while reading since there
/// is no other way to find where it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularChunk {
    pub id: ChunkId,
    pub record: Record,
    raw: Bytes,
    truncated: bool,
}

impl RegularChunk {
    pub fn new(id: ChunkId) -> Self {
        RegularChunk {
            id,
            record: Record::new(),
            raw: Bytes::new(),
            truncated: false,
        }
    }

    pub(crate) fn read(id: ChunkId, record: Record, raw: Bytes, truncated: bool) -> Self {
        RegularChunk {
            id,
            record,
            raw,
            truncated,
        }
    }

    /// The bytes the chunk was read from, after its ID.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The stream ended inside this chunk. Written back as it was read.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// A length-framed chunk, kept as bytes until discovered.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippableChunk {
    pub id: ChunkId,
    data: Bytes,
    record: Option<Record>,
    /// Lookback scope as it was where the chunk was read.
    pub(crate) ids: IdState,
    known: bool,
    partial: bool,
}

impl SkippableChunk {
    /// A new, empty chunk whose fields will be written.
    pub fn new(id: ChunkId) -> Self {
        SkippableChunk {
            id,
            data: Bytes::new(),
            record: Some(Record::new()),
            ids: IdState::default(),
            known: true,
            partial: false,
        }
    }

    pub(crate) fn read(id: ChunkId, data: Bytes, ids: IdState, known: bool) -> Self {
        SkippableChunk {
            id,
            data,
            record: None,
            ids,
            known,
            partial: false,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether a schema exists for this chunk.
    pub fn is_known(&self) -> bool {
        self.known
    }

    /// The chunk has been parsed, or there is nothing in it to parse. An
    /// unknown chunk with data never is.
    pub fn is_discovered(&self) -> bool {
        self.record.is_some() || (!self.known && self.data.is_empty())
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn record_mut(&mut self) -> Option<&mut Record> {
        self.record.as_mut()
    }

    /// Discovery stopped before the end of the data, so the fields are not
    /// enough to write the chunk back.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub(crate) fn set_record(&mut self, record: Record, partial: bool) {
        self.record = Some(record);
        self.partial = partial;
    }

    /// Whether writing encodes the record instead of re-emitting the data.
    pub(crate) fn writes_record(&self) -> bool {
        self.record.is_some() && !self.partial
    }
}

/// A chunk of the header's user data. Every known header chunk is parsed
/// when the header is read.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderChunk {
    pub id: ChunkId,
    /// Size flag `0x80000000`, kept as read.
    pub heavy: bool,
    data: Bytes,
    record: Option<Record>,
    partial: bool,
}

impl HeaderChunk {
    pub fn new(id: ChunkId) -> Self {
        HeaderChunk {
            id,
            heavy: false,
            data: Bytes::new(),
            record: Some(Record::new()),
            partial: false,
        }
    }

    pub(crate) fn read(id: ChunkId, heavy: bool, data: Bytes) -> Self {
        HeaderChunk {
            id,
            heavy,
            data,
            record: None,
            partial: false,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn record_mut(&mut self) -> Option<&mut Record> {
        self.record.as_mut()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record()?.get(name)
    }

    pub fn is_discovered(&self) -> bool {
        self.record.is_some()
    }

    pub(crate) fn set_record(&mut self, record: Record, partial: bool) {
        self.record = Some(record);
        self.partial = partial;
    }

    pub(crate) fn writes_record(&self) -> bool {
        self.record.is_some() && !self.partial
    }
}

/// Result of decoding a length-framed payload.
pub(crate) enum Decoded {
    /// All fields were read. Carries the number of bytes left over.
    Complete { record: Record, unread: usize },
    /// The payload ended inside a field.
    Truncated { record: Record },
}

impl Decoded {
    /// The record, whether it falls short of the payload, and what is
    /// worth reporting about it.
    pub(crate) fn settle(self, length: usize) -> (Record, bool, Option<DiagnosticKind>) {
        match self {
            Decoded::Complete { record, unread: 0 } => (record, false, None),
            Decoded::Complete { record, unread } => (
                record,
                true,
                Some(DiagnosticKind::NotFullyParsed {
                    consumed: length - unread,
                    length,
                }),
            ),
            Decoded::Truncated { record } => (record, true, Some(DiagnosticKind::Truncated)),
        }
    }
}

/// Decodes `data` with `schema`. The lookback scope and the node table are
/// lent to a reader over the payload and handed back afterwards, along with
/// any diagnostics of nodes parsed along the way.
pub(crate) fn decode_framed(
    data: Bytes,
    schema: &ChunkSchema,
    ids: &mut IdState,
    nodes: &mut NodeTable,
    diagnostics: &mut Vec<Diagnostic>,
    settings: ReadSettings,
) -> Result<Decoded, GbxError> {
    let mut reader = GbxReader::new(data, settings)
        .with_ids(std::mem::take(ids))
        .with_nodes(std::mem::take(nodes));

    let mut record = Record::new();
    let result = codec::read_write(&mut ReaderWriter::Reader(&mut reader), schema, &mut record);
    let unread = reader.remaining();

    let (returned_ids, returned_nodes, mut nested) = reader.into_parts();
    *ids = returned_ids;
    *nodes = returned_nodes;
    diagnostics.append(&mut nested);

    match result {
        Ok(()) => Ok(Decoded::Complete { record, unread }),
        Err(err) if err.is_end_of_stream() => Ok(Decoded::Truncated { record }),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::layout, ClassId, GbxErrorInner};

    fn schema() -> ChunkSchema {
        ChunkSchema::new(ClassId::new(0x0a001000), 0x002)
            .skippable()
            .fields(layout! { version: int, name: id })
    }

    fn payload(version: i32, tail: &[u8]) -> Bytes {
        let mut data = Vec::new();
        data.extend_from_slice(&version.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&0x4000_0000u32.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(b"Foo");
        data.extend_from_slice(tail);
        Bytes::from(data)
    }

    #[test]
    fn framed_payload_lends_scope() {
        let mut ids = IdState::default();
        let mut nodes = NodeTable::default();
        let mut diagnostics = Vec::new();
        let decoded = decode_framed(
            payload(1, &[0xaa]),
            &schema(),
            &mut ids,
            &mut nodes,
            &mut diagnostics,
            ReadSettings::default(),
        )
        .unwrap();

        let Decoded::Complete { record, unread } = decoded else {
            panic!("payload should decode completely");
        };
        assert_eq!(unread, 1);
        assert_eq!(record.get_str("name"), Some("Foo"));
        assert_eq!(ids.strings, ["Foo"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn short_payload_is_truncated() {
        let data = payload(1, &[]);
        let data = data.slice(..data.len() - 2);
        let decoded = decode_framed(
            data,
            &schema(),
            &mut IdState::default(),
            &mut NodeTable::default(),
            &mut Vec::new(),
            ReadSettings::default(),
        )
        .unwrap();
        let Decoded::Truncated { record } = decoded else {
            panic!("payload should be truncated");
        };
        assert_eq!(record.get_i64("version"), Some(1));
        assert!(record.get("name").is_none());
    }

    #[test]
    fn other_failures_propagate() {
        let schema = schema().versions(0, 0);
        let err = decode_framed(
            payload(4, &[]),
            &schema,
            &mut IdState::default(),
            &mut NodeTable::default(),
            &mut Vec::new(),
            ReadSettings::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(*err, GbxErrorInner::ChunkVersionNotSupported { version: 4, .. }));
    }

    #[test]
    fn discovery_state() {
        let id = ChunkId::new(0x0a001002);
        let unknown = SkippableChunk::read(id, Bytes::new(), IdState::default(), false);
        assert!(unknown.is_discovered());
        assert!(unknown.is_empty());
        let opaque = SkippableChunk::read(id, payload(1, &[]), IdState::default(), false);
        assert!(!opaque.is_discovered());

        let mut known = SkippableChunk::read(id, payload(1, &[]), IdState::default(), true);
        assert!(!known.is_discovered());
        assert!(!known.writes_record());
        known.set_record(Record::new(), true);
        assert!(known.is_discovered());
        assert!(!known.writes_record());

        let chunk = Chunk::Skippable(SkippableChunk::new(id));
        assert!(chunk.record().is_some_and(Record::is_empty));
        assert_eq!(chunk.version(), None);
    }
}
