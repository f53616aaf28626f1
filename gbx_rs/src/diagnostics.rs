use crate::{ChunkId, ClassId, NodeIndex};
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// No schema for the class. Its chunks are kept raw where possible.
    UnknownClass,
    /// Kept as an opaque payload.
    UnknownSkippableChunk { length: usize },
    /// Parsing of the node stopped here.
    UnrecognizedUnskippableChunk { previous: Option<ChunkId> },
    /// The stream ended inside a chunk.
    Truncated,
    /// Discovery finished before the end of the payload.
    NotFullyParsed { consumed: usize, length: usize },
    /// A chunk failed to parse for another reason.
    ChunkFailed { reason: String },
    Cancelled,
}

/// Something the reader noticed but recovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub node: NodeIndex,
    pub class_id: ClassId,
    pub chunk_id: Option<ChunkId>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub(crate) fn new(node: NodeIndex, class_id: ClassId, chunk_id: Option<ChunkId>, kind: DiagnosticKind) -> Self {
        let diagnostic = Diagnostic {
            node,
            class_id,
            chunk_id,
            kind,
        };
        diagnostic.log();
        diagnostic
    }

    /// Whether parsing of the node stopped early because of this.
    pub fn is_fatal_for_node(&self) -> bool {
        matches!(
            self.kind,
            DiagnosticKind::UnrecognizedUnskippableChunk { .. }
                | DiagnosticKind::Truncated
                | DiagnosticKind::ChunkFailed { .. }
                | DiagnosticKind::Cancelled
        )
    }

    fn log(&self) {
        match self.kind {
            DiagnosticKind::UnknownSkippableChunk { .. } => tracing::trace!("{}", self),
            DiagnosticKind::UnrecognizedUnskippableChunk { .. }
            | DiagnosticKind::ChunkFailed { .. } => tracing::error!("{}", self),
            DiagnosticKind::Cancelled => tracing::debug!("{}", self),
            _ => tracing::warn!("{}", self),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {} ({})", self.node, self.class_id)?;
        if let Some(chunk_id) = self.chunk_id {
            write!(f, " chunk {}", chunk_id)?;
        }
        match &self.kind {
            DiagnosticKind::UnknownClass => write!(f, ": unknown class"),
            DiagnosticKind::UnknownSkippableChunk { length } => {
                write!(f, ": unknown skippable chunk, {} bytes kept", length)
            }
            DiagnosticKind::UnrecognizedUnskippableChunk { previous: Some(previous) } => {
                write!(f, ": unrecognized chunk after {}, rest of node lost", previous)
            }
            DiagnosticKind::UnrecognizedUnskippableChunk { previous: None } => {
                write!(f, ": unrecognized first chunk, rest of node lost")
            }
            DiagnosticKind::Truncated => write!(f, ": stream ended inside chunk"),
            DiagnosticKind::NotFullyParsed { consumed, length } => {
                write!(f, ": only {} of {} bytes parsed", consumed, length)
            }
            DiagnosticKind::ChunkFailed { reason } => write!(f, ": {}", reason.replace('\n', ";")),
            DiagnosticKind::Cancelled => write!(f, ": cancelled"),
        }
    }
}
