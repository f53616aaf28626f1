use crate::{
    node::{self, NodeTable},
    reader::IdState,
    registry::Registry,
    Chunk, ChunkId, ClassId, Context, FileRef, GbxError, GbxErrorInner, Id, Ident, NodeIndex,
    NodeRef, Record, RemapPolicy, TimeInt, Value,
};
use byteorder::{WriteBytesExt, LE};
use std::{
    collections::HashSet,
    io::Write,
    ops::{Deref, DerefMut},
};

pub(crate) struct GbxWriter<'n> {
    inner: Vec<u8>,
    pub ids: IdState,
    nodes: &'n NodeTable,
    policy: RemapPolicy,
    /// Nodes already written inline, by the index they keep in the file.
    written: HashSet<NodeIndex>,
}

impl Deref for GbxWriter<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for GbxWriter<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<'n> GbxWriter<'n> {
    pub fn new(nodes: &'n NodeTable, policy: RemapPolicy) -> Self {
        GbxWriter {
            inner: Vec::new(),
            ids: IdState::default(),
            nodes,
            policy,
            written: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner
    }

    /// Highest node index written, plus one.
    pub fn node_count(&self) -> u32 {
        let internal = self.written.iter().map(|index| index.get()).max().unwrap_or(0);
        let external = self.nodes.externals().max().unwrap_or(0);
        internal.max(external).saturating_add(1)
    }

    pub fn write_class_id(&mut self, id: ClassId) -> Result<(), GbxError> {
        let id = Registry::get().remap_table().apply(id, self.policy);
        self.write_u32::<LE>(id.get())?;
        Ok(())
    }

    pub fn write_chunk_id(&mut self, id: ChunkId) -> Result<(), GbxError> {
        let id = Registry::get().remap_table().apply_chunk(id, self.policy);
        self.write_u32::<LE>(id.get())?;
        Ok(())
    }

    /// Writes a `u32` placeholder, returning where to patch the length.
    pub fn begin_length(&mut self) -> Result<usize, GbxError> {
        let position = self.inner.len();
        self.write_u32::<LE>(0)?;
        Ok(position)
    }

    pub fn end_length(&mut self, position: usize) {
        let length = (self.inner.len() - position - 4) as u32;
        self.inner[position..position + 4].copy_from_slice(&length.to_le_bytes());
    }

    pub fn write_string(&mut self, string: &str) -> Result<(), GbxError> {
        self.write_u32::<LE>(string.len() as u32)
            .context("Writing string length")?;
        self.write_all(string.as_bytes())
            .context("Writing string data")?;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), GbxError> {
        self.write_u32::<LE>(value as u32)?;
        Ok(())
    }

    pub fn write_id(&mut self, id: &Id) -> Result<(), GbxError> {
        if self.ids.version.is_none() {
            self.write_u32::<LE>(3).context("Writing lookback version")?;
            self.ids.version = Some(3);
        }

        match id {
            Id::Empty => self.write_u32::<LE>(0xffff_ffff)?,
            Id::String(string) if string.is_empty() => self.write_u32::<LE>(0xffff_ffff)?,
            Id::Unassigned => self.write_u32::<LE>(0xbfff_ffff)?,
            Id::Number(number) => self.write_u32::<LE>(*number)?,
            Id::String(string) => {
                match self.ids.strings.iter().position(|known| known == string) {
                    Some(position) => {
                        self.write_u32::<LE>(0x4000_0000 | (position as u32 + 1))?;
                    }
                    None => {
                        if self.ids.strings.len() >= 0x3ffe {
                            tracing::warn!("Lookback table full, {:?} will not be found again", string);
                        }
                        self.write_u32::<LE>(0x4000_0000)?;
                        self.write_string(string)
                            .context("Writing first occurrence of lookback string")?;
                        self.ids.strings.push(string.clone());
                    }
                }
            }
        }

        Ok(())
    }

    pub fn write_ident(&mut self, ident: &Ident) -> Result<(), GbxError> {
        self.write_id(&ident.id).context("Writing ident ID")?;
        self.write_id(&ident.collection)
            .context("Writing ident collection")?;
        self.write_id(&ident.author).context("Writing ident author")?;
        Ok(())
    }

    /// Writes a node reference, writing the node inline the first time it
    /// is referenced. Nodes keep the index they have in the body.
    pub fn write_node_ref(&mut self, node_ref: NodeRef) -> Result<(), GbxError> {
        match node_ref {
            NodeRef::Null => self.write_u32::<LE>(0xffff_ffff)?,
            NodeRef::External(index) => self.write_u32::<LE>(index)?,
            NodeRef::Internal(index) if self.written.contains(&index) => {
                self.write_u32::<LE>(index.get())?;
            }
            NodeRef::Internal(index) => {
                // index 0 reads back as null
                if index == NodeIndex::MAIN {
                    return Err(GbxErrorInner::NoSuchNode(index.get()).into());
                }

                let nodes = self.nodes;
                let node = nodes
                    .get(index)
                    .ok_or(GbxErrorInner::NoSuchNode(index.get()))?;
                self.written.insert(index);
                tracing::trace!("node {} written inline", index);

                self.write_u32::<LE>(index.get())
                    .context("Writing node reference index")?;
                self.write_class_id(node.class_id())
                    .context("Writing node reference class ID")?;
                node::write_node(self, node).with_context(|| format!("Writing node {}", index))?;
            }
        }
        Ok(())
    }

    /// Marks the nodes `record` refers to as written. Used for chunks whose
    /// bytes are copied as read, which already hold those nodes inline.
    pub fn claim(&mut self, record: &Record) {
        for (_, value) in record.iter() {
            match value {
                Value::NodeRef(NodeRef::Internal(index)) => {
                    if !self.written.insert(*index) {
                        continue;
                    }
                    let nodes = self.nodes;
                    if let Some(node) = nodes.get(*index) {
                        for record in node.chunks().iter().filter_map(Chunk::record) {
                            self.claim(record);
                        }
                    }
                }
                Value::Array(elements) => {
                    for element in elements {
                        self.claim(element);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn write_time(&mut self, time: TimeInt) -> Result<(), GbxError> {
        self.write_i32::<LE>(time.0)?;
        Ok(())
    }

    pub fn write_vec2(&mut self, value: [f32; 2]) -> Result<(), GbxError> {
        for component in value {
            self.write_f32::<LE>(component)?;
        }
        Ok(())
    }

    pub fn write_vec3(&mut self, value: [f32; 3]) -> Result<(), GbxError> {
        for component in value {
            self.write_f32::<LE>(component)?;
        }
        Ok(())
    }

    pub fn write_int3(&mut self, value: [i32; 3]) -> Result<(), GbxError> {
        for component in value {
            self.write_i32::<LE>(component)?;
        }
        Ok(())
    }

    pub fn write_byte3(&mut self, value: [u8; 3]) -> Result<(), GbxError> {
        self.write_all(&value)?;
        Ok(())
    }

    pub fn write_file_ref(&mut self, file: &FileRef) -> Result<(), GbxError> {
        self.write_u8(file.version)
            .context("Writing file reference version")?;
        if file.version >= 3 {
            let checksum = file.checksum.unwrap_or([0; 32]);
            self.write_all(&checksum)
                .context("Writing file reference checksum")?;
        }
        self.write_string(&file.path)
            .context("Writing file reference path")?;
        if FileRef::has_locator_url(file.version, &file.path) {
            self.write_string(file.locator_url.as_deref().unwrap_or(""))
                .context("Writing file reference locator URL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reader::GbxReader, ReadSettings};
    use bytes::Bytes;

    #[test]
    fn lookback_round_trip() {
        let nodes = NodeTable::default();
        let mut w = GbxWriter::new(&nodes, RemapPolicy::Latest);
        let ids = [
            Id::from("Stadium"),
            Id::from("Stadium"),
            Id::Empty,
            Id::Unassigned,
            Id::Number(26),
            Id::from("Nadeo"),
            Id::from("Nadeo"),
        ];
        for id in &ids {
            w.write_id(id).unwrap();
        }
        let bytes = w.into_inner();

        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0x4000_0000u32.to_le_bytes());
        assert_eq!(&bytes[19..23], &0x4000_0001u32.to_le_bytes());

        let mut r = GbxReader::new(Bytes::from(bytes), ReadSettings::default());
        for id in &ids {
            assert_eq!(&r.read_id().unwrap(), id);
        }
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn length_patching() {
        let nodes = NodeTable::default();
        let mut w = GbxWriter::new(&nodes, RemapPolicy::Latest);
        let position = w.begin_length().unwrap();
        w.write_string("Foo").unwrap();
        w.end_length(position);
        assert_eq!(&w[..4], &7u32.to_le_bytes());
    }

    #[test]
    fn file_ref_round_trip() {
        let file = FileRef {
            version: 3,
            checksum: Some([7; 32]),
            path: "Skins\\Any\\Sign.zip".into(),
            locator_url: Some("https://example.com/Sign.zip".into()),
        };
        let nodes = NodeTable::default();
        let mut w = GbxWriter::new(&nodes, RemapPolicy::Latest);
        w.write_file_ref(&file).unwrap();

        let mut r = GbxReader::new(Bytes::from(w.into_inner()), ReadSettings::default());
        assert_eq!(r.read_file_ref().unwrap(), file);
    }

    #[test]
    fn class_ids_follow_policy() {
        let nodes = NodeTable::default();
        let mut w = GbxWriter::new(&nodes, RemapPolicy::Latest);
        w.write_class_id(ClassId::new(0x24003000)).unwrap();
        assert_eq!(&w[..], &0x03043000u32.to_le_bytes());

        let mut w = GbxWriter::new(&nodes, RemapPolicy::Legacy);
        w.write_chunk_id(ChunkId::new(0x0304301f)).unwrap();
        assert_eq!(&w[..], &0x2400301fu32.to_le_bytes());
    }
}
