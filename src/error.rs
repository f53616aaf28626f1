use gbx_rs::{ChunkId, NodeIndex};

/// How a re-read file differs from the one it was written from.
#[derive(Debug, thiserror::Error, strum::IntoStaticStr)]
pub enum Mismatch {
    #[error("Node count changed from {before} to {after}")]
    NodeCount { before: usize, after: usize },

    #[error("Node {node} has {after} chunks, was {before}")]
    ChunkCount {
        node: NodeIndex,
        before: usize,
        after: usize,
    },

    #[error("Node {node} chunk {position} is {after}, was {before}")]
    ChunkOrder {
        node: NodeIndex,
        position: usize,
        before: ChunkId,
        after: ChunkId,
    },

    #[error("Node {node} chunk {chunk_id} has different fields")]
    Fields { node: NodeIndex, chunk_id: ChunkId },

    #[error("Header chunk {chunk_id} has different fields")]
    HeaderFields { chunk_id: ChunkId },
}

impl Mismatch {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}
