use crate::{
    diagnostics::Diagnostic,
    node::{self, NodeTable},
    settings::ReadSettings,
    ChunkId, ClassId, Context, FileRef, GbxError, GbxErrorInner, Id, Ident, NodeIndex, NodeRef,
    TimeInt, LAST_CHUNK_ID,
};
use byteorder::{ReadBytesExt, LE};
use bytes::Bytes;
use std::{
    fmt::Debug,
    io::{Cursor, Seek},
    ops::{Deref, DerefMut},
};

pub trait CursorExt {
    fn peek_u32_le(&mut self) -> Result<u32, GbxError>;
}

impl<T: AsRef<[u8]>> CursorExt for Cursor<T> {
    fn peek_u32_le(&mut self) -> Result<u32, GbxError> {
        let value = self.read_u32::<LE>()?;
        self.seek_relative(-4)?;
        Ok(value)
    }
}

/// One lookback scope. The body, the header and chunks with their own
/// scope each get one.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct IdState {
    pub version: Option<u32>,
    pub strings: Vec<String>,
}

pub(crate) struct GbxReader {
    inner: Cursor<Bytes>,
    pub ids: IdState,
    pub nodes: NodeTable,
    pub diagnostics: Vec<Diagnostic>,
    pub settings: ReadSettings,
}

impl Debug for GbxReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GbxReader")
            .field("position", &self.inner.position())
            .field("len", &self.inner.get_ref().len())
            .field("ids", &self.ids)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Deref for GbxReader {
    type Target = Cursor<Bytes>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for GbxReader {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl GbxReader {
    pub fn new(data: Bytes, settings: ReadSettings) -> Self {
        GbxReader {
            inner: Cursor::new(data),
            ids: IdState::default(),
            nodes: NodeTable::default(),
            diagnostics: Vec::new(),
            settings,
        }
    }

    pub fn with_ids(mut self, ids: IdState) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_nodes(mut self, nodes: NodeTable) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn into_parts(self) -> (IdState, NodeTable, Vec<Diagnostic>) {
        (self.ids, self.nodes, self.diagnostics)
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.inner.position() as usize)
    }

    fn ensure(&self, count: usize) -> Result<(), GbxError> {
        if self.remaining() < count {
            return Err(GbxErrorInner::UnexpectedEndOfStream.into());
        }
        Ok(())
    }

    /// Zero-copy slice of the underlying buffer.
    pub fn slice(&self, start: usize, end: usize) -> Bytes {
        self.inner.get_ref().slice(start..end)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes, GbxError> {
        self.ensure(count)?;
        let start = self.position() as usize;
        let bytes = self.slice(start, start + count);
        self.seek_relative(count as i64)
            .context("Seeking after reading bytes")?;
        Ok(bytes)
    }

    pub fn read_rest(&mut self) -> Result<Bytes, GbxError> {
        let remaining = self.remaining();
        self.read_bytes(remaining)
    }

    pub fn read_string(&mut self) -> Result<String, GbxError> {
        let count = self.read_u32::<LE>().context("Reading string length")? as usize;
        let bytes = self.read_bytes(count).context("Reading string data")?;
        Ok(String::from_utf8(bytes.to_vec()).context("Decoding string data")?)
    }

    pub fn read_bool(&mut self) -> Result<bool, GbxError> {
        Ok(self.read_u32::<LE>()? != 0)
    }

    pub fn read_id(&mut self) -> Result<Id, GbxError> {
        if self.ids.version.is_none() {
            let version = self.read_u32::<LE>().context("Reading lookback version")?;
            if version != 3 {
                tracing::debug!("lookback version {}", version);
            }
            self.ids.version = Some(version);
        }

        let index = self.read_u32::<LE>().context("Reading lookback index")?;
        if index == 0xffff_ffff {
            return Ok(Id::Empty);
        }

        let top = index >> 30;
        if (index & 0x3fff) == 0 && (top == 1 || top == 2) {
            let string = self
                .read_string()
                .context("Reading first occurrence of lookback string")?;
            tracing::trace!("new string {:?}", string);
            self.ids.strings.push(string.clone());
            return Ok(Id::String(string));
        }

        if (index & 0x3fff) == 0x3fff {
            return match top {
                2 => Ok(Id::Unassigned),
                3 => Ok(Id::Empty),
                _ => Err(GbxErrorInner::InvalidLookbackString(index).into()),
            };
        }

        if top == 0 {
            return Ok(Id::Number(index));
        }

        let position = ((index & 0x3fff) - 1) as usize;
        match self.ids.strings.get(position) {
            Some(string) => Ok(Id::String(string.clone())),
            None => Err(GbxErrorInner::InvalidLookbackString(index).into()),
        }
    }

    pub fn read_ident(&mut self) -> Result<Ident, GbxError> {
        Ok(Ident {
            id: self.read_id().context("Reading ident ID")?,
            collection: self.read_id().context("Reading ident collection")?,
            author: self.read_id().context("Reading ident author")?,
        })
    }

    /// Reads a node reference, parsing the node inline on its first
    /// occurrence.
    pub fn read_node_ref(&mut self) -> Result<NodeRef, GbxError> {
        let index = self
            .read_u32::<LE>()
            .context("Reading node reference index")?;

        if index == 0 || index == 0xffff_ffff {
            return Ok(NodeRef::Null);
        }

        if self.nodes.is_external(index) {
            tracing::trace!("external node {}", index);
            return Ok(NodeRef::External(index));
        }

        let node_index = NodeIndex::new(index);
        if self.nodes.contains(node_index) {
            return Ok(NodeRef::Internal(node_index));
        }

        let class_id = self
            .read_u32::<LE>()
            .context("Reading node reference class ID")?;
        if class_id == 0xffff_ffff {
            return Ok(NodeRef::Null);
        }

        let limit = self.settings.max_node_depth;
        if self.nodes.depth() >= limit {
            return Err(GbxErrorInner::NodesTooDeep { index, limit }.into());
        }

        self.nodes.begin(node_index);
        let node = node::parse_node(self, ClassId::new(class_id), node_index);
        let faulty = node.faulty_chunk().map(|faulty| faulty.id);
        self.nodes.finish(node_index, node);

        if let Some(chunk_id) = faulty {
            // the stream position is lost along with the nested node
            return Err(GbxErrorInner::FaultyNestedNode { index, chunk_id }.into());
        }

        Ok(NodeRef::Internal(node_index))
    }

    pub fn read_time(&mut self) -> Result<TimeInt, GbxError> {
        Ok(TimeInt(self.read_i32::<LE>().context("Reading time")?))
    }

    pub fn read_vec2(&mut self) -> Result<[f32; 2], GbxError> {
        Ok([self.read_f32::<LE>()?, self.read_f32::<LE>()?])
    }

    pub fn read_vec3(&mut self) -> Result<[f32; 3], GbxError> {
        Ok([
            self.read_f32::<LE>()?,
            self.read_f32::<LE>()?,
            self.read_f32::<LE>()?,
        ])
    }

    pub fn read_int3(&mut self) -> Result<[i32; 3], GbxError> {
        Ok([
            self.read_i32::<LE>()?,
            self.read_i32::<LE>()?,
            self.read_i32::<LE>()?,
        ])
    }

    pub fn read_byte3(&mut self) -> Result<[u8; 3], GbxError> {
        Ok([self.read_u8()?, self.read_u8()?, self.read_u8()?])
    }

    pub fn read_file_ref(&mut self) -> Result<FileRef, GbxError> {
        let version = self.read_u8().context("Reading file reference version")?;
        let checksum = if version >= 3 {
            let mut checksum = [0u8; 32];
            checksum.copy_from_slice(
                &self
                    .read_bytes(32)
                    .context("Reading file reference checksum")?,
            );
            Some(checksum)
        } else {
            None
        };
        let path = self.read_string().context("Reading file reference path")?;
        let locator_url = if FileRef::has_locator_url(version, &path) {
            Some(
                self.read_string()
                    .context("Reading file reference locator URL")?,
            )
        } else {
            None
        };
        Ok(FileRef {
            version,
            checksum,
            path,
            locator_url,
        })
    }

    /// Consumes bytes until something that looks like the next chunk of
    /// the same class, or the end of the node.
    pub fn scan(&mut self, chunk_id: ChunkId) -> Result<Bytes, GbxError> {
        let start = self.position() as usize;
        loop {
            if self.remaining() < 4 {
                tracing::warn!("Scan of chunk {} reached end of stream", chunk_id);
                self.seek(std::io::SeekFrom::End(0))?;
                break;
            }
            let next = self.peek_u32_le().context("Scanning chunk")?;
            let next_chunk = ChunkId::new(next);
            if next == LAST_CHUNK_ID
                || (next_chunk.class() == chunk_id.class() && next_chunk.index() > chunk_id.index())
            {
                break;
            }
            self.seek_relative(1).context("Scanning chunk")?;
        }
        let end = self.position() as usize;
        tracing::debug!("Scanned {} bytes of chunk {}", end - start, chunk_id);
        Ok(self.slice(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8]) -> GbxReader {
        GbxReader::new(Bytes::copy_from_slice(bytes), ReadSettings::default())
    }

    #[test]
    fn string_without_terminator() {
        let mut r = reader(b"\x03\x00\x00\x00Foo");
        assert_eq!(r.read_string().unwrap(), "Foo");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_string_is_end_of_stream() {
        let mut r = reader(b"\x05\x00\x00\x00Foo");
        assert!(r.read_string().unwrap_err().is_end_of_stream());

        let mut r = reader(b"\x05\x00");
        assert!(r.read_string().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn lookback_strings() {
        let mut data = Vec::new();
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&0x4000_0000u32.to_le_bytes());
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(b"Stadium");
        data.extend_from_slice(&0x4000_0001u32.to_le_bytes());
        data.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
        data.extend_from_slice(&0xbfff_ffffu32.to_le_bytes());
        data.extend_from_slice(&26u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0x4000_0002u32.to_le_bytes());

        let mut r = reader(&data);
        assert_eq!(r.read_id().unwrap(), Id::String("Stadium".into()));
        assert_eq!(r.read_id().unwrap(), Id::String("Stadium".into()));
        assert_eq!(r.read_id().unwrap(), Id::Empty);
        assert_eq!(r.read_id().unwrap(), Id::Unassigned);
        assert_eq!(r.read_id().unwrap(), Id::Number(26));
        let zero = r.read_id().unwrap();
        assert_eq!(zero, Id::Number(0));
        assert!(zero.is_empty());
        assert!(matches!(
            *r.read_id().unwrap_err(),
            GbxErrorInner::InvalidLookbackString(0x4000_0002)
        ));
        assert_eq!(r.ids.version, Some(3));
        assert_eq!(r.ids.strings, ["Stadium"]);
    }

    #[test]
    fn file_ref_versions() {
        let mut data = vec![1u8];
        data.extend_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(b"a.zip");
        data.extend_from_slice(&0u32.to_le_bytes());
        let mut r = reader(&data);
        let file = r.read_file_ref().unwrap();
        assert_eq!(file.path, "a.zip");
        assert_eq!(file.locator_url.as_deref(), Some(""));
        assert_eq!(file.checksum, None);

        let mut data = vec![0u8];
        data.extend_from_slice(&0u32.to_le_bytes());
        let mut r = reader(&data);
        assert_eq!(r.read_file_ref().unwrap().locator_url, None);
    }

    #[test]
    fn scan_stops_at_next_chunk() {
        let mut data = vec![1, 2, 3, 4, 5];
        data.extend_from_slice(&0x0304_304au32.to_le_bytes());
        let mut r = reader(&data);
        let scanned = r.scan(ChunkId::new(0x0304_3049)).unwrap();
        assert_eq!(&scanned[..], &[1, 2, 3, 4, 5]);
        assert_eq!(r.peek_u32_le().unwrap(), 0x0304_304a);

        let mut data = vec![9, 9];
        data.extend_from_slice(&LAST_CHUNK_ID.to_le_bytes());
        let mut r = reader(&data);
        assert_eq!(r.scan(ChunkId::new(0x0304_3049)).unwrap().len(), 2);
    }
}
