use crate::{Compression, RemapPolicy};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Bytes of the current stream consumed after a chunk was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub consumed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.consumed as f32 / self.total as f32
        }
    }
}

/// How many nodes may be nested inside each other, the main node included.
pub const DEFAULT_MAX_NODE_DEPTH: usize = 64;

#[derive(Clone, derivative::Derivative)]
#[derivative(Debug, Default)]
pub struct ReadSettings {
    /// Discover every known skippable chunk while reading.
    pub discover_skippable: bool,
    /// A node reference nested deeper than this fails its chunk.
    #[derivative(Default(value = "DEFAULT_MAX_NODE_DEPTH"))]
    pub max_node_depth: usize,
    /// Checked between chunks. Reading stops as if the stream ended.
    pub cancel: Option<Arc<AtomicBool>>,
    #[derivative(Debug = "ignore")]
    pub progress: Option<Arc<dyn Fn(Progress) + Send + Sync>>,
}

impl ReadSettings {
    pub fn discover_skippable(mut self, discover: bool) -> Self {
        self.discover_skippable = discover;
        self
    }

    pub fn max_node_depth(mut self, depth: usize) -> Self {
        self.max_node_depth = depth;
        self
    }

    pub fn cancel_with(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn on_progress(mut self, progress: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub(crate) fn report(&self, progress: Progress) {
        if let Some(report) = &self.progress {
            report(progress);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSettings {
    pub remap: RemapPolicy,
    /// Body compression to use instead of the one the file was read with.
    pub body_compression: Option<Compression>,
}

impl WriteSettings {
    pub fn remap(mut self, remap: RemapPolicy) -> Self {
        self.remap = remap;
        self
    }

    pub fn body_compression(mut self, compression: Compression) -> Self {
        self.body_compression = Some(compression);
        self
    }
}
