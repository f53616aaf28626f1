use crate::{
    chunk::{self, Chunk, Decoded, RegularChunk, SkippableChunk},
    codec::{self, ReaderWriter},
    diagnostics::{Diagnostic, DiagnosticKind},
    reader::{CursorExt, GbxReader, IdState},
    registry::Registry,
    schema::{ChunkSchema, ClassSchema},
    settings::Progress,
    writer::GbxWriter,
    ChunkId, ClassId, Context, GbxError, GbxErrorInner, ReadSettings, Record, Value, LAST_CHUNK_ID,
    SKIP_MARKER,
};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::{
    collections::{BTreeMap, HashSet},
    fmt::Display,
    io::{Seek, SeekFrom, Write},
};

/// Position of a node in the body's node table. The main node is `0`,
/// referenced nodes keep the index they were read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u32);

impl NodeIndex {
    pub const MAIN: NodeIndex = NodeIndex(0);

    pub const fn new(index: u32) -> Self {
        NodeIndex(index)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where parsing of a node gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultyChunk {
    pub id: ChunkId,
    pub previous: Option<ChunkId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    class_id: ClassId,
    chunks: Vec<Chunk>,
    faulty_chunk: Option<FaultyChunk>,
}

impl Node {
    pub fn new(class_id: ClassId) -> Self {
        Node {
            class_id,
            chunks: Vec::new(),
            faulty_chunk: None,
        }
    }

    /// The class ID as it was read.
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn class_name(&self) -> Option<&'static str> {
        Registry::get().class_name(self.class_id)
    }

    pub fn schema(&self) -> Option<&'static ClassSchema> {
        Registry::get().resolve_class(self.class_id)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.chunks.iter_mut()
    }

    fn position(&self, id: ChunkId) -> Option<usize> {
        let remap = Registry::get().remap_table();
        let id = remap.remap_chunk(id);
        self.chunks
            .iter()
            .position(|chunk| remap.remap_chunk(chunk.id()) == id)
    }

    /// Looks a chunk up by ID. Legacy IDs match their current equivalent.
    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.position(id).map(|position| &self.chunks[position])
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.position(id).map(|position| &mut self.chunks[position])
    }

    pub fn push_chunk(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    pub fn remove_chunk(&mut self, id: ChunkId) -> Option<Chunk> {
        self.position(id).map(|position| self.chunks.remove(position))
    }

    /// Adds an empty chunk declared by the class or one of its ancestors,
    /// placed before the first chunk with a higher ID. Fill in its record
    /// before writing.
    pub fn create_chunk(&mut self, id: ChunkId) -> Result<&mut Chunk, GbxError> {
        let registry = Registry::get();
        let class = registry
            .resolve_class(self.class_id)
            .ok_or(GbxErrorInner::UnknownClass(self.class_id))?;
        let schema = registry
            .resolve_chunk(class, id)
            .ok_or(GbxErrorInner::NoSuchChunk(id))?;
        if !schema.writes_fields() {
            return Err(GbxErrorInner::ReadOnlyChunk(id).into());
        }

        let chunk = if schema.is_skippable() {
            Chunk::Skippable(SkippableChunk::new(id))
        } else {
            Chunk::Regular(RegularChunk::new(id))
        };

        let remap = registry.remap_table();
        let position = self
            .chunks
            .iter()
            .position(|existing| remap.remap_chunk(existing.id()) > schema.id)
            .unwrap_or(self.chunks.len());
        self.chunks.insert(position, chunk);
        Ok(&mut self.chunks[position])
    }

    /// The value of the last parsed field called `name`, across chunks.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.chunks.iter().rev().find_map(|chunk| chunk.get(name))
    }

    pub fn faulty_chunk(&self) -> Option<FaultyChunk> {
        self.faulty_chunk
    }

    pub fn is_faulty(&self) -> bool {
        self.faulty_chunk.is_some()
    }
}

#[derive(Debug, Clone)]
enum Slot {
    /// Claimed by a reference whose node is still being read.
    Parsing,
    Parsed(Node),
}

/// Every node of a body, by index, plus the indices claimed by external
/// references.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeTable {
    slots: BTreeMap<u32, Slot>,
    externals: HashSet<u32>,
    /// Slots still in [`Slot::Parsing`], i.e. how deep the current read is.
    parsing: usize,
}

impl NodeTable {
    pub fn with_externals(externals: impl IntoIterator<Item = u32>) -> Self {
        NodeTable {
            slots: BTreeMap::new(),
            externals: externals.into_iter().collect(),
            parsing: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        self.slots.contains_key(&index.get())
    }

    pub fn begin(&mut self, index: NodeIndex) {
        if !matches!(self.slots.insert(index.get(), Slot::Parsing), Some(Slot::Parsing)) {
            self.parsing += 1;
        }
    }

    pub fn finish(&mut self, index: NodeIndex, node: Node) {
        if let Some(Slot::Parsing) = self.slots.insert(index.get(), Slot::Parsed(node)) {
            self.parsing -= 1;
        }
    }

    /// Nodes begun and not yet finished.
    pub fn depth(&self) -> usize {
        self.parsing
    }

    /// Highest index in use, by a node or an external reference.
    pub fn max_index(&self) -> Option<u32> {
        let internal = self.slots.keys().next_back().copied();
        let external = self.externals.iter().copied().max();
        internal.max(external)
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        match self.slots.get(&index.get()) {
            Some(Slot::Parsed(node)) => Some(node),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        match self.slots.get_mut(&index.get()) {
            Some(Slot::Parsed(node)) => Some(node),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.slots.iter().filter_map(|(index, slot)| match slot {
            Slot::Parsed(node) => Some((NodeIndex::new(*index), node)),
            Slot::Parsing => None,
        })
    }

    pub fn is_external(&self, index: u32) -> bool {
        self.externals.contains(&index)
    }

    pub fn externals(&self) -> impl Iterator<Item = u32> + '_ {
        self.externals.iter().copied()
    }
}

fn resolve_chunk(class: Option<&'static ClassSchema>, id: ChunkId) -> Option<&'static ChunkSchema> {
    class.and_then(|class| Registry::get().resolve_chunk(class, id))
}

/// Reads chunks until the end of the node. Problems are recorded as
/// diagnostics and on the node itself, never returned.
pub(crate) fn parse_node(reader: &mut GbxReader, class_id: ClassId, index: NodeIndex) -> Node {
    let registry = Registry::get();
    let class = registry.resolve_class(class_id);
    let mut node = Node::new(class_id);
    let mut previous: Option<ChunkId> = None;

    tracing::trace!("node {} class {}", index, class_id);
    if class.is_none() {
        reader
            .diagnostics
            .push(Diagnostic::new(index, class_id, None, DiagnosticKind::UnknownClass));
    }

    let diagnostic = |chunk_id: Option<ChunkId>, kind: DiagnosticKind| {
        Diagnostic::new(index, class_id, chunk_id, kind)
    };

    loop {
        if reader.settings.is_cancelled() {
            if reader.remaining() > 0 {
                reader.diagnostics.push(diagnostic(previous, DiagnosticKind::Cancelled));
                let _ = reader.seek(SeekFrom::End(0));
            }
            break;
        }

        let Ok(raw_id) = reader.read_u32::<LE>() else {
            reader.diagnostics.push(diagnostic(None, DiagnosticKind::Truncated));
            break;
        };

        if raw_id == LAST_CHUNK_ID {
            break;
        }

        if raw_id == 0 {
            // seen after some node references, tolerated as padding
            tracing::debug!("Zero chunk ID in node {} after {:?}", index, previous);
            continue;
        }

        let chunk_id = ChunkId::new(raw_id);
        let start = reader.position() as usize;
        let schema = resolve_chunk(class, chunk_id);
        // a known regular chunk may start with a field equal to the marker
        let marked = schema.map_or(true, ChunkSchema::is_skippable)
            && reader.peek_u32_le().ok() == Some(SKIP_MARKER);

        if marked {
            let framed = reader
                .read_u32::<LE>()
                .and_then(|_| reader.read_u32::<LE>())
                .map_err(GbxError::from)
                .and_then(|length| reader.read_bytes(length as usize));
            let data = match framed {
                Ok(data) => data,
                Err(_) => {
                    let _ = reader.seek(SeekFrom::End(0));
                    let raw = reader.slice(start, reader.len());
                    reader
                        .diagnostics
                        .push(diagnostic(Some(chunk_id), DiagnosticKind::Truncated));
                    node.chunks.push(Chunk::Regular(RegularChunk::read(
                        chunk_id,
                        Default::default(),
                        raw,
                        true,
                    )));
                    break;
                }
            };

            match schema {
                None => {
                    reader.diagnostics.push(diagnostic(
                        Some(chunk_id),
                        DiagnosticKind::UnknownSkippableChunk { length: data.len() },
                    ));
                    node.chunks.push(Chunk::Skippable(SkippableChunk::read(
                        chunk_id,
                        data,
                        IdState::default(),
                        false,
                    )));
                }
                Some(schema) => {
                    let snapshot = if schema.has_own_ids() {
                        IdState::default()
                    } else {
                        reader.ids.clone()
                    };
                    let mut chunk = SkippableChunk::read(chunk_id, data, snapshot, true);
                    if (schema.is_eager() || reader.settings.discover_skippable) && !schema.is_ignored() {
                        discover_while_reading(reader, schema, &mut chunk, index, class_id);
                    }
                    node.chunks.push(Chunk::Skippable(chunk));
                }
            }
        } else {
            let Some(schema) = schema.filter(|schema| !schema.is_skippable() && !schema.is_ignored())
            else {
                // nothing says where this chunk ends
                reader.diagnostics.push(diagnostic(
                    Some(chunk_id),
                    DiagnosticKind::UnrecognizedUnskippableChunk { previous },
                ));
                node.faulty_chunk = Some(FaultyChunk {
                    id: chunk_id,
                    previous,
                });
                break;
            };

            let outer_ids = schema
                .has_own_ids()
                .then(|| std::mem::take(&mut reader.ids));
            let mut record = Default::default();
            let result = codec::read_write(&mut ReaderWriter::Reader(&mut *reader), schema, &mut record)
                .with_context(|| format!("Reading chunk {}", chunk_id));
            if let Some(ids) = outer_ids {
                reader.ids = ids;
            }

            match result {
                Ok(()) => {
                    let raw = reader.slice(start, reader.position() as usize);
                    node.chunks
                        .push(Chunk::Regular(RegularChunk::read(chunk_id, record, raw, false)));
                }
                Err(err) if err.is_end_of_stream() => {
                    // the rest of the stream belongs to this chunk
                    let raw = reader.slice(start, reader.len());
                    let _ = reader.seek(SeekFrom::End(0));
                    if !reader.settings.is_cancelled() {
                        reader
                            .diagnostics
                            .push(diagnostic(Some(chunk_id), DiagnosticKind::Truncated));
                    }
                    node.chunks
                        .push(Chunk::Regular(RegularChunk::read(chunk_id, record, raw, true)));
                    break;
                }
                Err(err) => {
                    reader.diagnostics.push(diagnostic(
                        Some(chunk_id),
                        DiagnosticKind::ChunkFailed {
                            reason: err.to_string(),
                        },
                    ));
                    node.faulty_chunk = Some(FaultyChunk {
                        id: chunk_id,
                        previous,
                    });
                    break;
                }
            }
        }

        previous = Some(chunk_id);
        reader.settings.report(Progress {
            consumed: reader.position() as usize,
            total: reader.len(),
        });
    }

    node
}

/// Eager discovery shares the live lookback scope and node table, unless the
/// chunk has a scope of its own.
fn discover_while_reading(
    reader: &mut GbxReader,
    schema: &ChunkSchema,
    chunk: &mut SkippableChunk,
    index: NodeIndex,
    class_id: ClassId,
) {
    let settings = ReadSettings {
        progress: None,
        ..reader.settings.clone()
    };
    let mut fresh = IdState::default();
    let ids = if schema.has_own_ids() {
        &mut fresh
    } else {
        &mut reader.ids
    };

    let decoded = chunk::decode_framed(
        chunk.data().clone(),
        schema,
        ids,
        &mut reader.nodes,
        &mut reader.diagnostics,
        settings,
    );
    let outcome = settle(chunk, decoded, index, class_id);
    reader.diagnostics.extend(outcome);
}

/// Stores a discovery result on the chunk, returning what is worth
/// reporting.
fn settle(
    chunk: &mut SkippableChunk,
    decoded: Result<Decoded, GbxError>,
    index: NodeIndex,
    class_id: ClassId,
) -> Option<Diagnostic> {
    let kind = match decoded {
        Ok(decoded) => {
            let (record, partial, kind) = decoded.settle(chunk.len());
            chunk.set_record(record, partial);
            kind?
        }
        Err(err) => DiagnosticKind::ChunkFailed {
            reason: err.to_string(),
        },
    };
    Some(Diagnostic::new(index, class_id, Some(chunk.id), kind))
}

/// Parses a skippable chunk of a node already in `nodes`. Returns whether
/// the chunk was discovered by this call; chunks that are unknown, ignored
/// or already discovered are left alone.
pub(crate) fn discover(
    nodes: &mut NodeTable,
    diagnostics: &mut Vec<Diagnostic>,
    index: NodeIndex,
    chunk_id: ChunkId,
) -> Result<bool, GbxError> {
    let node = nodes
        .get(index)
        .ok_or(GbxErrorInner::NoSuchNode(index.get()))?;
    let class_id = node.class_id();
    let Some(Chunk::Skippable(chunk)) = node.chunk(chunk_id) else {
        return Err(GbxErrorInner::NoSuchChunk(chunk_id).into());
    };
    if chunk.is_discovered() {
        return Ok(false);
    }
    let Some(schema) = resolve_chunk(node.schema(), chunk_id).filter(|schema| !schema.is_ignored())
    else {
        return Ok(false);
    };

    let data = chunk.data().clone();
    let mut ids = chunk.ids.clone();
    let decoded = chunk::decode_framed(
        data,
        schema,
        &mut ids,
        nodes,
        diagnostics,
        ReadSettings::default(),
    )
    .with_context(|| format!("Discovering chunk {} of node {}", chunk_id, index))?;

    let Some(Chunk::Skippable(chunk)) = nodes
        .get_mut(index)
        .and_then(|node| node.chunk_mut(chunk_id))
    else {
        return Err(GbxErrorInner::NoSuchChunk(chunk_id).into());
    };
    diagnostics.extend(settle(chunk, Ok(decoded), index, class_id));
    Ok(true)
}

/// Writes the node's chunk stream, ending with the terminal chunk ID.
pub(crate) fn write_node(writer: &mut GbxWriter<'_>, node: &Node) -> Result<(), GbxError> {
    if let Some(faulty) = node.faulty_chunk {
        tracing::warn!(
            "Writing {} without the chunks from {} on",
            node.class_id,
            faulty.id
        );
    }

    let class = node.schema();
    for chunk in &node.chunks {
        writer.write_chunk_id(chunk.id())?;
        match chunk {
            Chunk::Regular(chunk) if chunk.is_truncated() => {
                writer.claim(&chunk.record);
                writer.write_all(chunk.raw())?;
            }

            Chunk::Regular(chunk) => {
                let schema = resolve_chunk(class, chunk.id)
                    .ok_or(GbxErrorInner::NoSuchChunk(chunk.id))?;
                write_fields(writer, schema, &chunk.record)
                    .with_context(|| format!("Writing chunk {}", chunk.id))?;
            }

            Chunk::Skippable(chunk) => {
                writer.write_u32::<LE>(SKIP_MARKER)?;
                match resolve_chunk(class, chunk.id)
                    .filter(|schema| schema.writes_fields() && chunk.writes_record())
                {
                    Some(schema) => {
                        let position = writer.begin_length()?;
                        if let Some(record) = chunk.record() {
                            write_fields(writer, schema, record)
                                .with_context(|| format!("Writing chunk {}", chunk.id))?;
                        }
                        writer.end_length(position);
                    }
                    None => {
                        if let Some(record) = chunk.record() {
                            writer.claim(record);
                        }
                        writer.write_u32::<LE>(chunk.len() as u32)?;
                        writer.write_all(chunk.data())?;
                    }
                }
            }
        }
    }

    writer.write_u32::<LE>(LAST_CHUNK_ID)?;
    Ok(())
}

pub(crate) fn write_fields(
    writer: &mut GbxWriter<'_>,
    schema: &ChunkSchema,
    record: &Record,
) -> Result<(), GbxError> {
    let outer_ids = schema
        .has_own_ids()
        .then(|| std::mem::take(&mut writer.ids));
    let mut record = record.clone();
    let result = codec::read_write(&mut ReaderWriter::Writer(&mut *writer), schema, &mut record);
    if let Some(ids) = outer_ids {
        writer.ids = ids;
    }
    result
}
