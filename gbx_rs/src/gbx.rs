use crate::{
    chunk::{self, Chunk, HeaderChunk},
    diagnostics::{Diagnostic, DiagnosticKind},
    node::{self, Node, NodeTable},
    reader::{GbxReader, IdState},
    refs::RefTable,
    registry::Registry,
    writer::GbxWriter,
    ByteFormat, ChunkId, ClassId, Compression, Context, GbxError, GbxErrorInner, NodeIndex,
    ReadSettings, RemapPolicy, WriteSettings,
};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use bytes::Bytes;
use std::{
    collections::HashSet,
    io::{Cursor, Read, Write},
};

const MAGIC: &[u8; 3] = b"GBX";

/// Size flag of a header chunk entry.
const HEAVY_BIT: u32 = 0x8000_0000;

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: u16,
    pub ref_table_compression: Compression,
    pub body_compression: Compression,
    /// Present from version 4, usually `b'R'`.
    pub unknown: Option<u8>,
    /// As read. Use [`Registry::remap`] for the current ID.
    pub class_id: ClassId,
    /// User data chunks, present from version 6.
    pub chunks: Vec<HeaderChunk>,
    /// Node count declared by the file. Written back unless the body needs
    /// more.
    pub num_nodes: u32,
    pub diagnostics: Vec<Diagnostic>,
}

impl Header {
    pub fn new(class_id: ClassId) -> Self {
        Header {
            version: 6,
            ref_table_compression: Compression::Uncompressed,
            body_compression: Compression::Compressed,
            unknown: Some(b'R'),
            class_id,
            chunks: Vec::new(),
            num_nodes: 1,
            diagnostics: Vec::new(),
        }
    }

    /// Looks a header chunk up by ID. Legacy IDs match their current
    /// equivalent.
    pub fn chunk(&self, id: ChunkId) -> Option<&HeaderChunk> {
        let remap = Registry::get().remap_table();
        let id = remap.remap_chunk(id);
        self.chunks
            .iter()
            .find(|chunk| remap.remap_chunk(chunk.id) == id)
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut HeaderChunk> {
        let remap = Registry::get().remap_table();
        let id = remap.remap_chunk(id);
        self.chunks
            .iter_mut()
            .find(|chunk| remap.remap_chunk(chunk.id) == id)
    }

    pub fn class_name(&self) -> Option<&'static str> {
        Registry::get().class_name(self.class_id)
    }

    fn read(reader: &mut GbxReader) -> Result<Header, GbxError> {
        let (version, ref_table_compression, body_compression, unknown, class_id) =
            read_preamble(reader)?;

        let chunks = if version >= 6 {
            let size = reader.read_u32::<LE>().context("Reading user data size")?;
            tracing::debug!("user data size: {}", size);
            let data = reader
                .read_bytes(size as usize)
                .context("Reading user data")?;
            read_user_data(data).context("Reading header chunks")?
        } else {
            Vec::new()
        };

        let num_nodes = reader.read_u32::<LE>().context("Reading number of nodes")?;
        tracing::debug!("num nodes: {}", num_nodes);

        let mut header = Header {
            version,
            ref_table_compression,
            body_compression,
            unknown,
            class_id,
            chunks,
            num_nodes,
            diagnostics: Vec::new(),
        };
        header.discover_chunks();
        Ok(header)
    }

    /// Parses every known header chunk in file order. They share one
    /// lookback scope.
    fn discover_chunks(&mut self) {
        let registry = Registry::get();
        let Some(class) = registry.resolve_class(self.class_id) else {
            if !self.chunks.is_empty() {
                self.diagnostics.push(Diagnostic::new(
                    NodeIndex::MAIN,
                    self.class_id,
                    None,
                    DiagnosticKind::UnknownClass,
                ));
            }
            return;
        };

        let mut ids = IdState::default();
        let mut nodes = NodeTable::default();
        for chunk in &mut self.chunks {
            let Some(schema) = registry
                .resolve_header_chunk(class, chunk.id)
                .filter(|schema| !schema.is_ignored())
            else {
                tracing::trace!("header chunk {} kept as bytes", chunk.id);
                continue;
            };

            let mut fresh = IdState::default();
            let scope = if schema.has_own_ids() { &mut fresh } else { &mut ids };
            let decoded = chunk::decode_framed(
                chunk.data().clone(),
                schema,
                scope,
                &mut nodes,
                &mut self.diagnostics,
                ReadSettings::default(),
            );

            let kind = match decoded {
                Ok(decoded) => {
                    let (record, partial, kind) = decoded.settle(chunk.data().len());
                    chunk.set_record(record, partial);
                    kind
                }
                Err(err) => Some(DiagnosticKind::ChunkFailed {
                    reason: err.to_string(),
                }),
            };
            if let Some(kind) = kind {
                self.diagnostics.push(Diagnostic::new(
                    NodeIndex::MAIN,
                    self.class_id,
                    Some(chunk.id),
                    kind,
                ));
            }
        }
    }

    /// The user data block: entry table, then each chunk's data.
    fn write_user_data(&self, policy: RemapPolicy) -> Result<Vec<u8>, GbxError> {
        let registry = Registry::get();
        let class = registry.resolve_class(self.class_id);
        let nodes = NodeTable::default();

        let mut data = GbxWriter::new(&nodes, policy);
        let mut sizes = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            let start = data.len();
            let schema = class
                .and_then(|class| registry.resolve_header_chunk(class, chunk.id))
                .filter(|schema| schema.writes_fields() && chunk.writes_record());
            match (schema, chunk.record()) {
                (Some(schema), Some(record)) => node::write_fields(&mut data, schema, record)
                    .with_context(|| format!("Writing header chunk {}", chunk.id))?,
                _ => data.write_all(chunk.data())?,
            }
            sizes.push((data.len() - start) as u32);
        }

        let mut block = GbxWriter::new(&nodes, policy);
        block.write_u32::<LE>(self.chunks.len() as u32)?;
        for (chunk, size) in self.chunks.iter().zip(sizes) {
            block.write_chunk_id(chunk.id)?;
            let size = if chunk.heavy { size | HEAVY_BIT } else { size };
            block.write_u32::<LE>(size)?;
        }
        block.write_all(&data.into_inner())?;
        Ok(block.into_inner())
    }
}

fn read_preamble(
    reader: &mut GbxReader,
) -> Result<(u16, Compression, Compression, Option<u8>, ClassId), GbxError> {
    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic).context("Reading magic")?;
    if &magic != MAGIC {
        return Err(GbxErrorInner::NotGbx.into());
    }

    let version = reader.read_u16::<LE>().context("Reading version")?;
    tracing::debug!("version: {}", version);
    if version < 3 {
        return Err(GbxErrorInner::VersionNotSupported(version).into());
    }

    let byte_format: ByteFormat = reader
        .read_u8()
        .context("Reading byte format")?
        .try_into()
        .context("Parsing byte format")?;
    tracing::debug!("byte format: {:?}", byte_format);
    if byte_format == ByteFormat::Text {
        return Err(GbxErrorInner::TextFormatNotSupported.into());
    }

    let ref_table_compression: Compression = reader
        .read_u8()
        .context("Reading ref table compression")?
        .try_into()
        .context("Parsing ref table compression")?;
    tracing::debug!("ref table compression: {}", ref_table_compression);

    let body_compression: Compression = reader
        .read_u8()
        .context("Reading body compression")?
        .try_into()
        .context("Parsing body compression")?;
    tracing::debug!("body compression: {}", body_compression);

    let unknown = if version >= 4 {
        Some(reader.read_u8().context("Reading unknown byte")?)
    } else {
        None
    };

    let class_id = ClassId::new(reader.read_u32::<LE>().context("Reading class ID")?);
    tracing::debug!("class id: {}", class_id);

    Ok((version, ref_table_compression, body_compression, unknown, class_id))
}

fn read_user_data(data: Bytes) -> Result<Vec<HeaderChunk>, GbxError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = GbxReader::new(data, ReadSettings::default());
    let count = reader
        .read_u32::<LE>()
        .context("Reading number of header chunks")?;
    if count as usize > reader.remaining() / 8 {
        return Err(GbxErrorInner::ArrayTooLarge(count).into());
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = ChunkId::new(reader.read_u32::<LE>().context("Reading header chunk ID")?);
        let size = reader.read_u32::<LE>().context("Reading header chunk size")?;
        let heavy = size & HEAVY_BIT != 0;
        let size = size & !HEAVY_BIT;
        tracing::debug!("header chunk {} size {}{}", id, size, if heavy { " (heavy)" } else { "" });
        entries.push((id, heavy, size));
    }

    entries
        .into_iter()
        .map(|(id, heavy, size)| {
            let data = reader
                .read_bytes(size as usize)
                .with_context(|| format!("Reading data of header chunk {}", id))?;
            Ok(HeaderChunk::read(id, heavy, data))
        })
        .collect()
}

/// Reads just enough of a file to tell its class. The ID is remapped to its
/// current equivalent.
pub fn read_class_id(data: &[u8]) -> Result<ClassId, GbxError> {
    let mut reader = GbxReader::new(Bytes::copy_from_slice(data), ReadSettings::default());
    let (.., class_id) = read_preamble(&mut reader)?;
    Ok(Registry::get().remap(class_id))
}

/// The nodes of a file. The main node is at [`NodeIndex::MAIN`], nodes it
/// references keep the index they were read with.
#[derive(Debug, Clone, Default)]
pub struct Body {
    nodes: NodeTable,
    /// Node count the file declared. Indices below it may be in use by
    /// nodes inside chunks kept as bytes.
    reserved: u32,
    pub diagnostics: Vec<Diagnostic>,
}

impl Body {
    /// A body holding only `main`.
    pub fn new(main: Node) -> Self {
        let mut nodes = NodeTable::default();
        nodes.finish(NodeIndex::MAIN, main);
        Body {
            nodes,
            reserved: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn main_node(&self) -> Option<&Node> {
        self.nodes.get(NodeIndex::MAIN)
    }

    pub fn main_node_mut(&mut self) -> Option<&mut Node> {
        self.nodes.get_mut(NodeIndex::MAIN)
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    /// Adds a node that other nodes can reference with
    /// [`NodeRef::Internal`](crate::NodeRef::Internal). Returns its index,
    /// which no node of the file can be using.
    pub fn insert_node(&mut self, node: Node) -> NodeIndex {
        let mut next = self
            .nodes
            .max_index()
            .map_or(1, |max| max.saturating_add(1))
            .max(self.reserved)
            .max(1);
        while self.nodes.is_external(next) {
            next += 1;
        }
        let index = NodeIndex::new(next);
        self.nodes.finish(index, node);
        index
    }

    /// Parses a skippable chunk that was left as bytes. Returns whether this
    /// call parsed it. Nodes read along the way join the body.
    pub fn discover(&mut self, index: NodeIndex, chunk_id: ChunkId) -> Result<bool, GbxError> {
        node::discover(&mut self.nodes, &mut self.diagnostics, index, chunk_id)
    }

    /// Discovers every known skippable chunk, including those of nodes that
    /// only show up while discovering. Failures become diagnostics. Returns
    /// how many chunks were discovered.
    pub fn discover_all(&mut self) -> usize {
        let mut settled: HashSet<(NodeIndex, ChunkId)> = HashSet::new();
        let mut total = 0;
        loop {
            let pending: Vec<(NodeIndex, ChunkId)> = self
                .nodes
                .iter()
                .flat_map(|(index, node)| {
                    node.chunks().iter().filter_map(move |chunk| match chunk {
                        Chunk::Skippable(chunk) if !chunk.is_discovered() => Some((index, chunk.id)),
                        _ => None,
                    })
                })
                .filter(|key| !settled.contains(key))
                .collect();

            let mut found = 0;
            for (index, chunk_id) in pending {
                match self.discover(index, chunk_id) {
                    Ok(true) => found += 1,
                    Ok(false) => {}
                    Err(err) => {
                        if let Some(node) = self.nodes.get(index) {
                            let class_id = node.class_id();
                            self.diagnostics.push(Diagnostic::new(
                                index,
                                class_id,
                                Some(chunk_id),
                                DiagnosticKind::ChunkFailed {
                                    reason: err.to_string(),
                                },
                            ));
                        }
                    }
                }
                settled.insert((index, chunk_id));
            }

            if found == 0 {
                break;
            }
            total += found;
        }
        tracing::debug!("discovered {} chunks", total);
        total
    }
}

/// A whole file.
#[derive(Debug, Clone)]
pub struct Gbx {
    pub header: Header,
    pub ref_table: RefTable,
    pub body: Body,
}

impl Gbx {
    /// A file of version 6 whose main node is `main`.
    pub fn new(main: Node) -> Self {
        Gbx {
            header: Header::new(main.class_id()),
            ref_table: RefTable::default(),
            body: Body::new(main),
        }
    }

    pub fn read(data: impl Into<Bytes>) -> Result<Gbx, GbxError> {
        Gbx::read_with(data, ReadSettings::default())
    }

    pub fn read_with(data: impl Into<Bytes>, settings: ReadSettings) -> Result<Gbx, GbxError> {
        let mut reader = GbxReader::new(data.into(), settings.clone());
        let header = Header::read(&mut reader).context("Reading header")?;
        if header.ref_table_compression == Compression::Compressed {
            tracing::debug!("ref table marked compressed, reading it as plain");
        }
        let ref_table = RefTable::read(&mut reader, header.version).context("Reading ref table")?;

        let body_data = match header.body_compression {
            Compression::Compressed => {
                let uncompressed = reader
                    .read_u32::<LE>()
                    .context("Reading uncompressed body size")?;
                let compressed = reader
                    .read_u32::<LE>()
                    .context("Reading compressed body size")?;
                tracing::debug!("body size: {} ({} compressed)", uncompressed, compressed);
                let data = reader
                    .read_bytes(compressed as usize)
                    .context("Reading compressed body")?;
                let body = lzokay_native::decompress(&mut Cursor::new(&data[..]), None)
                    .context("Decompressing body")?;
                if body.len() != uncompressed as usize {
                    tracing::warn!(
                        "Body decompressed to {} bytes, header says {}",
                        body.len(),
                        uncompressed
                    );
                }
                Bytes::from(body)
            }
            Compression::Uncompressed => reader.read_rest()?,
        };

        let mut reader = GbxReader::new(body_data, settings)
            .with_nodes(NodeTable::with_externals(ref_table.node_indices()));
        reader.nodes.begin(NodeIndex::MAIN);
        let main = node::parse_node(&mut reader, header.class_id, NodeIndex::MAIN);
        reader.nodes.finish(NodeIndex::MAIN, main);
        let (_, nodes, diagnostics) = reader.into_parts();
        tracing::debug!("{} nodes, {} diagnostics", nodes.len(), diagnostics.len());

        let body = Body {
            nodes,
            reserved: header.num_nodes,
            diagnostics,
        };
        Ok(Gbx {
            header,
            ref_table,
            body,
        })
    }

    /// Reads only the header, leaving the rest of the file alone.
    pub fn read_header(data: impl Into<Bytes>) -> Result<Header, GbxError> {
        let mut reader = GbxReader::new(data.into(), ReadSettings::default());
        Header::read(&mut reader).context("Reading header")
    }

    pub fn main_node(&self) -> Option<&Node> {
        self.body.main_node()
    }

    /// Header diagnostics, then body diagnostics.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.header
            .diagnostics
            .iter()
            .chain(self.body.diagnostics.iter())
    }

    pub fn write(&self) -> Result<Vec<u8>, GbxError> {
        self.write_with(WriteSettings::default())
    }

    pub fn write_with(&self, settings: WriteSettings) -> Result<Vec<u8>, GbxError> {
        let main = self
            .body
            .main_node()
            .ok_or(GbxErrorInner::NoSuchNode(NodeIndex::MAIN.get()))?;

        // nodes inside chunks kept as bytes only count through the declared number
        let mut body = GbxWriter::new(&self.body.nodes, settings.remap);
        node::write_node(&mut body, main).context("Writing main node")?;
        let num_nodes = body.node_count().max(self.header.num_nodes);
        let body = body.into_inner();

        let header = &self.header;
        let mut out = GbxWriter::new(&self.body.nodes, settings.remap);
        out.write_all(MAGIC)?;
        out.write_u16::<LE>(header.version)?;
        out.write_u8(ByteFormat::Binary.into())?;
        out.write_u8(header.ref_table_compression.into())?;
        let body_compression = settings.body_compression.unwrap_or(header.body_compression);
        out.write_u8(body_compression.into())?;
        if header.version >= 4 {
            out.write_u8(header.unknown.unwrap_or(b'R'))?;
        }
        out.write_class_id(main.class_id())?;

        if header.version >= 6 {
            let user_data = header
                .write_user_data(settings.remap)
                .context("Writing header chunks")?;
            out.write_u32::<LE>(user_data.len() as u32)?;
            out.write_all(&user_data)?;
        } else if !header.chunks.is_empty() {
            tracing::warn!(
                "Version {} has no user data, dropping {} header chunks",
                header.version,
                header.chunks.len()
            );
        }
        out.write_u32::<LE>(num_nodes)?;

        self.ref_table
            .write(&mut out, header.version)
            .context("Writing ref table")?;

        match body_compression {
            Compression::Compressed => {
                let compressed = lzokay_native::compress(&body).context("Compressing body")?;
                tracing::debug!("body size: {} ({} compressed)", body.len(), compressed.len());
                out.write_u32::<LE>(body.len() as u32)?;
                out.write_u32::<LE>(compressed.len() as u32)?;
                out.write_all(&compressed)?;
            }
            Compression::Uncompressed => out.write_all(&body)?,
        }

        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{class, Value, LAST_CHUNK_ID};

    fn file(version: u16, body_compression: u8, class_id: u32, user_data: Option<&[u8]>) -> Vec<u8> {
        let mut data = b"GBX".to_vec();
        data.extend_from_slice(&version.to_le_bytes());
        data.extend_from_slice(&[b'B', b'U', body_compression]);
        if version >= 4 {
            data.push(b'R');
        }
        data.extend_from_slice(&class_id.to_le_bytes());
        if let Some(user_data) = user_data {
            data.extend_from_slice(&(user_data.len() as u32).to_le_bytes());
            data.extend_from_slice(user_data);
        }
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data
    }

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|value| value.to_le_bytes()).collect()
    }

    #[test]
    fn preamble_errors() {
        assert!(matches!(*Gbx::read(b"GBY".to_vec()).unwrap_err(), GbxErrorInner::NotGbx));

        let mut old = file(6, b'U', 0x03043000, Some(&[0, 0, 0, 0]));
        old[3] = 2;
        assert!(matches!(
            *Gbx::read(old).unwrap_err(),
            GbxErrorInner::VersionNotSupported(2)
        ));

        let mut text = file(6, b'U', 0x03043000, Some(&[0, 0, 0, 0]));
        text[5] = b'T';
        let err = Gbx::read(text).unwrap_err();
        assert!(matches!(*err, GbxErrorInner::TextFormatNotSupported));
        assert!(err.is_malformed_container());

        let mut bad = file(6, b'U', 0x03043000, Some(&[0, 0, 0, 0]));
        bad[7] = b'X';
        assert!(matches!(
            *Gbx::read(bad).unwrap_err(),
            GbxErrorInner::InvalidCompressionState(b'X')
        ));
    }

    #[test]
    fn version_three_has_no_unknown_byte_or_user_data() {
        let mut data = file(3, b'U', 0x24003000, None);
        data.extend(words(&[LAST_CHUNK_ID]));
        let gbx = Gbx::read(data.clone()).unwrap();
        assert_eq!(gbx.header.unknown, None);
        assert!(gbx.header.chunks.is_empty());
        assert_eq!(gbx.header.class_id, ClassId::new(0x24003000));
        assert_eq!(gbx.header.class_name(), Some("Game::CGameCtnChallenge"));

        let written = gbx
            .write_with(WriteSettings::default().remap(RemapPolicy::Preserve))
            .unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn class_id_peek_remaps() {
        let data = file(6, b'C', 0x24003000, Some(&[0, 0, 0, 0]));
        assert_eq!(read_class_id(&data).unwrap(), class::CGameCtnChallenge);
        assert!(read_class_id(b"GBX").is_err());
    }

    #[test]
    fn header_chunks_share_one_scope() {
        let mut info = vec![0u8];
        info.extend(words(&[3, 0x4000_0000, 3]));
        info.extend_from_slice(b"Uid");
        info.extend(words(&[0x4000_0000, 7]));
        info.extend_from_slice(b"Stadium");
        info.extend(words(&[0x4000_0000, 5]));
        info.extend_from_slice(b"Nadeo");
        info.extend(words(&[3]));
        info.extend_from_slice(b"Map");
        info.extend(words(&[0x11]));

        // no lookback version here, and the ident refers back to the previous chunk
        let mut desc = vec![0u8];
        desc.extend(words(&[0x4000_0001, 0x4000_0002, 0x4000_0003, 3]));
        desc.extend_from_slice(b"Map");
        desc.push(6);

        let mut user_data = words(&[3, 0x03043002, info.len() as u32]);
        user_data.extend(words(&[0x03043003, desc.len() as u32 | HEAVY_BIT]));
        user_data.extend(words(&[0x03043007, 2]));
        user_data.extend_from_slice(&info);
        user_data.extend_from_slice(&desc);
        user_data.extend_from_slice(&[1, 2]);

        let mut data = file(6, b'U', 0x03043000, Some(&user_data));
        data.extend(words(&[LAST_CHUNK_ID]));
        let gbx = Gbx::read(data.clone()).unwrap();

        let header = &gbx.header;
        assert_eq!(header.chunks.len(), 3);
        assert!(header.diagnostics.is_empty());
        assert_eq!(
            header.chunk(ChunkId::new(0x03043002)).unwrap().get("u01"),
            Some(&Value::U32(0x11))
        );

        let desc = header.chunk(ChunkId::new(0x24003003)).unwrap();
        assert!(desc.heavy);
        assert_eq!(desc.get("kind"), Some(&Value::U8(6)));
        let Some(Value::Ident(map_info)) = desc.get("map_info") else {
            panic!("map info should be an ident");
        };
        assert_eq!(map_info.collection.as_str(), Some("Stadium"));

        let thumbnail = header.chunk(ChunkId::new(0x03043007)).unwrap();
        assert!(!thumbnail.is_discovered());
        assert_eq!(&thumbnail.data()[..], &[1, 2]);

        assert_eq!(gbx.write().unwrap(), data);
    }

    #[test]
    fn compressed_body_round_trip() {
        let mut body = words(&[0x03043022, 7, 0x0304301c, crate::SKIP_MARKER, 4, 2]);
        body.extend(words(&[LAST_CHUNK_ID]));
        let compressed = lzokay_native::compress(&body).unwrap();

        let mut data = file(6, b'C', 0x03043000, Some(&[0, 0, 0, 0]));
        data.extend(words(&[body.len() as u32, compressed.len() as u32]));
        data.extend_from_slice(&compressed);

        let mut gbx = Gbx::read(data).unwrap();
        assert_eq!(gbx.body.discover_all(), 1);
        assert_eq!(gbx.body.discover_all(), 0);
        let main = gbx.main_node().unwrap();
        assert_eq!(main.get("u01"), Some(&Value::I32(7)));
        assert_eq!(main.get("play_mode"), Some(&Value::I32(2)));

        let plain = gbx
            .write_with(WriteSettings::default().body_compression(Compression::Uncompressed))
            .unwrap();
        assert!(plain.ends_with(&body));

        let again = Gbx::read(gbx.write().unwrap()).unwrap();
        assert_eq!(again.header.body_compression, Compression::Compressed);
        assert_eq!(again.main_node().unwrap().get("u01"), Some(&Value::I32(7)));
    }

    #[test]
    fn inserted_nodes_avoid_external_indices() {
        let mut body = Body::new(Node::new(class::CGameCtnChallenge));
        body.nodes = NodeTable::with_externals([1]);
        body.nodes.finish(NodeIndex::MAIN, Node::new(class::CGameCtnChallenge));
        let index = body.insert_node(Node::new(class::CGameCtnCollectorList));
        assert_eq!(index, NodeIndex::new(2));
        assert_eq!(body.len(), 2);

        // indices the file declared stay free
        body.reserved = 5;
        let index = body.insert_node(Node::new(class::CGameCtnCollectorList));
        assert_eq!(index, NodeIndex::new(5));
    }
}
