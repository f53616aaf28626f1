use std::{fmt::Display, ops::Deref};

mod chunk;
mod class_id;
mod classes;
mod codec;
mod diagnostics;
mod gbx;
mod node;
mod reader;
mod refs;
mod registry;
mod remap;
mod schema;
mod settings;
mod value;
mod writer;

pub use chunk::{Chunk, HeaderChunk, RegularChunk, SkippableChunk};
pub use class_id::{ChunkId, ClassId};
pub use classes::class;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use gbx::{read_class_id, Body, Gbx, Header};
pub use node::{FaultyChunk, Node, NodeIndex};
pub use refs::{ExternalFile, ExternalNode, Folder, RefTable, ROOT_FOLDER};
pub use registry::Registry;
pub use remap::{RemapPolicy, RemapTable};
pub use schema::{ChunkSchema, ClassSchema, FieldKind};
pub use settings::{Progress, ReadSettings, WriteSettings};
pub use value::{FileRef, Id, Ident, NodeRef, Record, TimeInt, Value};

/// Terminates the chunk stream of every node.
pub const LAST_CHUNK_ID: u32 = 0xfacade01;

/// "SKIP" in little endian, precedes the length of a skippable chunk.
pub const SKIP_MARKER: u32 = 0x53_4b_49_50;

pub(crate) trait Context<T> {
    fn context<C>(self, context: C) -> Result<T, GbxError>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    fn with_context<F, C>(self, context_fn: F) -> Result<T, GbxError>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display + Send + Sync + 'static;
}

impl<T, E: Into<GbxError>> Context<T> for Result<T, E> {
    fn context<C>(self, context: C) -> Result<T, GbxError>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        match self {
            Ok(t) => Ok(t),
            Err(err) => Err(GbxError::Context {
                context: context.to_string(),
                inner: Box::new(err.into()),
            }),
        }
    }

    fn with_context<F, C>(self, context_fn: F) -> Result<T, GbxError>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display + Send + Sync + 'static,
    {
        match self {
            Ok(t) => Ok(t),
            Err(err) => Err(GbxError::Context {
                context: context_fn().to_string(),
                inner: Box::new(err.into()),
            }),
        }
    }
}

#[derive(Debug)]
pub enum GbxError {
    Root(GbxErrorInner),
    Context {
        context: String,
        inner: Box<GbxError>,
    },
}

impl<T: Into<GbxErrorInner>> From<T> for GbxError {
    fn from(value: T) -> Self {
        GbxError::Root(value.into())
    }
}

impl Display for GbxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GbxError::Root(inner) => write!(f, "{}", inner),
            GbxError::Context { context, inner } => {
                Display::fmt(inner, f)?;
                write!(f, "\n  {}", context)
            }
        }
    }
}

impl std::error::Error for GbxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.deref())
    }
}

impl Deref for GbxError {
    type Target = GbxErrorInner;

    fn deref(&self) -> &Self::Target {
        match self {
            GbxError::Root(inner) => inner,
            GbxError::Context { inner, .. } => {
                let box_ref = Box::as_ref(inner);
                <GbxError as Deref>::deref(box_ref)
            }
        }
    }
}

impl GbxError {
    /// Ran out of bytes. Tolerated at chunk boundaries, truncates instead of failing.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(**self, GbxErrorInner::UnexpectedEndOfStream)
    }

    /// Errors that say the file itself is not something we can read at all.
    pub fn is_malformed_container(&self) -> bool {
        matches!(
            **self,
            GbxErrorInner::NotGbx
                | GbxErrorInner::VersionNotSupported(_)
                | GbxErrorInner::InvalidByteFormat(_)
                | GbxErrorInner::TextFormatNotSupported
                | GbxErrorInner::InvalidCompressionState(_)
                | GbxErrorInner::Lzo(_)
        )
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum GbxErrorInner {
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,

    #[error("Not a GBX file")]
    NotGbx,

    #[error("GBX version {0} not supported")]
    VersionNotSupported(u16),

    #[error("Could not decompress")]
    Lzo(#[from] lzokay_native::Error),

    #[error("Invalid byte format {0}")]
    InvalidByteFormat(u8),

    #[error("Text GBX files are not supported")]
    TextFormatNotSupported,

    #[error("Invalid compression state {0}")]
    InvalidCompressionState(u8),

    #[error("Invalid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid lookback string {0:08x}, file may be corrupted")]
    InvalidLookbackString(u32),

    #[error("Unknown class {0}")]
    UnknownClass(ClassId),

    #[error("Unrecognized chunk {chunk_id} (previous chunk {previous:?})")]
    UnrecognizedChunk {
        chunk_id: ChunkId,
        previous: Option<ChunkId>,
    },

    #[error("Chunk {chunk_id} version {version} not supported")]
    ChunkVersionNotSupported { chunk_id: ChunkId, version: i64 },

    #[error("Missing field {field}")]
    MissingField { field: &'static str },

    #[error("Field {field} should be {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Node {index} stopped at faulty chunk {chunk_id}")]
    FaultyNestedNode { index: u32, chunk_id: ChunkId },

    #[error("No such chunk with ID {0}")]
    NoSuchChunk(ChunkId),

    #[error("No node at index {0}")]
    NoSuchNode(u32),

    #[error("Chunk {0} can only be re-emitted as read")]
    ReadOnlyChunk(ChunkId),

    #[error("Array of {0} elements is too large")]
    ArrayTooLarge(u32),

    #[error("Node {index} is nested more than {limit} nodes deep")]
    NodesTooDeep { index: u32, limit: usize },

    #[error("Reference table folders are nested more than {0} deep")]
    FoldersTooDeep(usize),

    #[error("Time of {0} hundredths does not fit")]
    TimeOutOfRange(i128),
}

impl From<std::io::Error> for GbxErrorInner {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            GbxErrorInner::UnexpectedEndOfStream
        } else {
            GbxErrorInner::Io(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteFormat {
    Text,
    Binary,
}

impl TryFrom<u8> for ByteFormat {
    type Error = GbxErrorInner;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'B' => Ok(ByteFormat::Binary),
            b'T' => Ok(ByteFormat::Text),
            _ => Err(GbxErrorInner::InvalidByteFormat(value)),
        }
    }
}

impl From<ByteFormat> for u8 {
    fn from(value: ByteFormat) -> Self {
        match value {
            ByteFormat::Binary => b'B',
            ByteFormat::Text => b'T',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Compression {
    Compressed,
    Uncompressed,
}

impl TryFrom<u8> for Compression {
    type Error = GbxErrorInner;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'C' => Ok(Compression::Compressed),
            b'U' => Ok(Compression::Uncompressed),
            _ => Err(GbxErrorInner::InvalidCompressionState(value)),
        }
    }
}

impl From<Compression> for u8 {
    fn from(value: Compression) -> Self {
        match value {
            Compression::Compressed => b'C',
            Compression::Uncompressed => b'U',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_end_of_stream() {
        let err: GbxError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short").into();
        assert!(err.is_end_of_stream());

        let wrapped: Result<(), GbxError> = Err(err).context("Reading thing");
        let wrapped = wrapped.unwrap_err();
        assert!(wrapped.is_end_of_stream());
        assert!(wrapped.to_string().contains("Reading thing"));
    }

    #[test]
    fn format_flags() {
        assert_eq!(ByteFormat::try_from(b'B').unwrap(), ByteFormat::Binary);
        assert!(ByteFormat::try_from(b'X').is_err());
        assert_eq!(Compression::try_from(b'C').unwrap(), Compression::Compressed);
        assert_eq!(u8::from(Compression::Uncompressed), b'U');
        assert!(matches!(
            Compression::try_from(b'Z'),
            Err(GbxErrorInner::InvalidCompressionState(b'Z'))
        ));
    }
}
