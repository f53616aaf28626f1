use crate::{reader::GbxReader, writer::GbxWriter, Context, GbxError, GbxErrorInner};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};

/// Name of the folder every reference table path starts from. It is not
/// stored in the file.
pub const ROOT_FOLDER: &str = "Root";

const MAX_FOLDER_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub name: String,
    pub folders: Vec<Folder>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Folder {
            name: name.into(),
            folders: Vec::new(),
        }
    }

    fn read_children(reader: &mut GbxReader, count: u32, depth: usize) -> Result<Vec<Folder>, GbxError> {
        if count as usize > reader.remaining() {
            return Err(GbxErrorInner::ArrayTooLarge(count).into());
        }
        if count > 0 && depth >= MAX_FOLDER_DEPTH {
            return Err(GbxErrorInner::FoldersTooDeep(MAX_FOLDER_DEPTH).into());
        }
        let mut folders = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = reader.read_string().context("Reading folder name")?;
            let children = reader
                .read_u32::<LE>()
                .context("Reading number of subfolders")?;
            tracing::trace!("{}folder {:?}", "  ".repeat(depth), name);
            let folders_below = Folder::read_children(reader, children, depth + 1)
                .with_context(|| format!("Reading subfolders of {}", name))?;
            folders.push(Folder {
                name,
                folders: folders_below,
            });
        }
        Ok(folders)
    }

    fn write_children(&self, writer: &mut GbxWriter<'_>) -> Result<(), GbxError> {
        writer.write_u32::<LE>(self.folders.len() as u32)?;
        for folder in &self.folders {
            writer.write_string(&folder.name)?;
            folder.write_children(writer)?;
        }
        Ok(())
    }

    /// Depth-first, parents before their children, root excluded.
    pub fn flatten(&self) -> Vec<&Folder> {
        let mut all = Vec::new();
        for folder in &self.folders {
            all.push(folder);
            all.extend(folder.flatten());
        }
        all
    }
}

impl Default for Folder {
    fn default() -> Self {
        Folder::new(ROOT_FOLDER)
    }
}

/// Where an external node lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalFile {
    /// A file next to this one, relative to a folder of the table.
    Path { name: String, folder_index: u32 },
    /// A game resource, by index.
    Resource(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalNode {
    pub flags: u32,
    pub file: ExternalFile,
    /// Index the body uses to refer to this node.
    pub node_index: u32,
    /// Present from version 5.
    pub use_file: Option<bool>,
}

impl ExternalNode {
    fn is_resource(flags: u32) -> bool {
        flags & 4 != 0
    }
}

/// Other files whose nodes the body refers to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefTable {
    pub ancestor_level: u32,
    pub root: Folder,
    pub externals: Vec<ExternalNode>,
}

impl RefTable {
    pub fn is_empty(&self) -> bool {
        self.externals.is_empty()
    }

    /// Node indices claimed by external references.
    pub fn node_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.externals.iter().map(|external| external.node_index)
    }

    pub(crate) fn read(reader: &mut GbxReader, version: u16) -> Result<RefTable, GbxError> {
        let count = reader
            .read_u32::<LE>()
            .context("Reading number of external nodes")?;
        if count == 0 {
            tracing::trace!("no external nodes");
            return Ok(RefTable::default());
        }
        if count as usize > reader.remaining() {
            return Err(GbxErrorInner::ArrayTooLarge(count).into());
        }

        let ancestor_level = reader.read_u32::<LE>().context("Reading ancestor level")?;
        let folders = reader
            .read_u32::<LE>()
            .context("Reading number of folders")?;
        let root = Folder {
            name: ROOT_FOLDER.to_owned(),
            folders: Folder::read_children(reader, folders, 0).context("Reading folders")?,
        };

        let mut externals = Vec::with_capacity(count as usize);
        for i in 0..count {
            let external = RefTable::read_external(reader, version)
                .with_context(|| format!("Reading external node {}", i))?;
            externals.push(external);
        }

        tracing::debug!("{} external nodes", externals.len());
        Ok(RefTable {
            ancestor_level,
            root,
            externals,
        })
    }

    fn read_external(reader: &mut GbxReader, version: u16) -> Result<ExternalNode, GbxError> {
        let flags = reader.read_u32::<LE>().context("Reading flags")?;
        let (name, resource) = if ExternalNode::is_resource(flags) {
            let index = reader.read_u32::<LE>().context("Reading resource index")?;
            (None, index)
        } else {
            (Some(reader.read_string().context("Reading file name")?), 0)
        };
        let node_index = reader.read_u32::<LE>().context("Reading node index")?;
        let use_file = if version >= 5 {
            Some(reader.read_bool().context("Reading use file")?)
        } else {
            None
        };
        let file = match name {
            Some(name) => ExternalFile::Path {
                name,
                folder_index: reader.read_u32::<LE>().context("Reading folder index")?,
            },
            None => ExternalFile::Resource(resource),
        };

        Ok(ExternalNode {
            flags,
            file,
            node_index,
            use_file,
        })
    }

    pub(crate) fn write(&self, writer: &mut GbxWriter<'_>, version: u16) -> Result<(), GbxError> {
        writer.write_u32::<LE>(self.externals.len() as u32)?;
        if self.externals.is_empty() {
            return Ok(());
        }

        writer.write_u32::<LE>(self.ancestor_level)?;
        self.root.write_children(writer).context("Writing folders")?;

        for external in &self.externals {
            // the flag decides the layout, so keep it consistent with the file kind
            let flags = match external.file {
                ExternalFile::Path { .. } => external.flags & !4,
                ExternalFile::Resource(_) => external.flags | 4,
            };
            writer.write_u32::<LE>(flags)?;
            match &external.file {
                ExternalFile::Path { name, .. } => writer.write_string(name)?,
                ExternalFile::Resource(index) => writer.write_u32::<LE>(*index)?,
            }
            writer.write_u32::<LE>(external.node_index)?;
            if version >= 5 {
                writer.write_bool(external.use_file.unwrap_or(false))?;
            }
            if let ExternalFile::Path { folder_index, .. } = external.file {
                writer.write_u32::<LE>(folder_index)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::NodeTable, ReadSettings, RemapPolicy};
    use bytes::Bytes;

    fn string(data: &mut Vec<u8>, value: &str) {
        data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        data.extend_from_slice(value.as_bytes());
    }

    fn word(data: &mut Vec<u8>, value: u32) {
        data.extend_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn nested_folders() {
        let mut data = Vec::new();
        word(&mut data, 2);
        word(&mut data, 1);
        // one folder at the top with two children, each without folders
        word(&mut data, 1);
        string(&mut data, "Skins");
        word(&mut data, 2);
        string(&mut data, "Signs");
        word(&mut data, 0);
        string(&mut data, "Blocks");
        word(&mut data, 0);
        // by path
        word(&mut data, 1);
        string(&mut data, "Sign.Texture.Gbx");
        word(&mut data, 3);
        word(&mut data, 1);
        word(&mut data, 2);
        // by resource
        word(&mut data, 4);
        word(&mut data, 77);
        word(&mut data, 5);
        word(&mut data, 0);

        let mut reader = GbxReader::new(Bytes::from(data.clone()), ReadSettings::default());
        let table = RefTable::read(&mut reader, 6).unwrap();
        assert_eq!(reader.remaining(), 0);

        assert_eq!(table.root.name, ROOT_FOLDER);
        assert_eq!(table.ancestor_level, 1);
        let skins = &table.root.folders[0];
        assert_eq!(skins.folders.len(), 2);
        assert!(skins.folders.iter().all(|folder| folder.folders.is_empty()));
        let names: Vec<_> = table.root.flatten().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Skins", "Signs", "Blocks"]);

        assert_eq!(
            table.externals[0].file,
            ExternalFile::Path {
                name: "Sign.Texture.Gbx".into(),
                folder_index: 2
            }
        );
        assert_eq!(table.externals[0].use_file, Some(true));
        assert_eq!(table.externals[1].file, ExternalFile::Resource(77));
        assert_eq!(table.node_indices().collect::<Vec<_>>(), [3, 5]);

        let nodes = NodeTable::default();
        let mut writer = GbxWriter::new(&nodes, RemapPolicy::Latest);
        table.write(&mut writer, 6).unwrap();
        assert_eq!(writer.into_inner(), data);
    }

    #[test]
    fn empty_table_is_one_word() {
        let mut reader = GbxReader::new(Bytes::from_static(&[0, 0, 0, 0]), ReadSettings::default());
        let table = RefTable::read(&mut reader, 6).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.root.name, ROOT_FOLDER);

        let nodes = NodeTable::default();
        let mut writer = GbxWriter::new(&nodes, RemapPolicy::Latest);
        table.write(&mut writer, 6).unwrap();
        assert_eq!(writer.into_inner(), [0, 0, 0, 0]);
    }

    #[test]
    fn deeply_nested_folders_are_rejected() {
        let nested = |depth: usize| {
            let mut data = Vec::new();
            word(&mut data, 1);
            word(&mut data, 0);
            word(&mut data, 1);
            for level in 0..depth {
                string(&mut data, "F");
                word(&mut data, if level + 1 == depth { 0 } else { 1 });
            }
            word(&mut data, 4);
            word(&mut data, 9);
            word(&mut data, 1);
            word(&mut data, 0);
            data
        };

        let mut reader = GbxReader::new(Bytes::from(nested(MAX_FOLDER_DEPTH)), ReadSettings::default());
        let table = RefTable::read(&mut reader, 6).unwrap();
        assert_eq!(table.root.flatten().len(), MAX_FOLDER_DEPTH);

        let mut reader = GbxReader::new(Bytes::from(nested(100_000)), ReadSettings::default());
        let err = RefTable::read(&mut reader, 6).unwrap_err();
        assert!(matches!(*err, GbxErrorInner::FoldersTooDeep(MAX_FOLDER_DEPTH)));
    }

    #[test]
    fn old_versions_have_no_use_file() {
        let mut data = Vec::new();
        word(&mut data, 1);
        word(&mut data, 0);
        word(&mut data, 0);
        word(&mut data, 4);
        word(&mut data, 9);
        word(&mut data, 1);
        let mut reader = GbxReader::new(Bytes::from(data), ReadSettings::default());
        let table = RefTable::read(&mut reader, 4).unwrap();
        assert_eq!(table.externals[0].use_file, None);
        assert_eq!(reader.remaining(), 0);
    }
}
