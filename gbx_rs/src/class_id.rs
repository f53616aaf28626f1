use std::fmt::{Debug, Display};

/// 32-bit class identifier. The low 12 bits are always zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub const fn new(id: u32) -> Self {
        ClassId(id & 0xffff_f000)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Chunk `index` of this class.
    pub const fn chunk(self, index: u16) -> ChunkId {
        ChunkId(self.0 | (index as u32 & 0xfff))
    }

    /// The engine byte, e.g. `0x03` for Game.
    pub const fn engine(self) -> u8 {
        (self.0 >> 24) as u8
    }
}

/// `class | sequence`. The class bits name the class that declared the
/// chunk, which is not necessarily the class of the node holding it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u32);

impl ChunkId {
    pub const fn new(id: u32) -> Self {
        ChunkId(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn class(self) -> ClassId {
        ClassId::new(self.0)
    }

    pub const fn index(self) -> u16 {
        (self.0 & 0xfff) as u16
    }

    pub const fn with_class(self, class: ClassId) -> ChunkId {
        class.chunk(self.index())
    }
}

impl From<u32> for ChunkId {
    fn from(value: u32) -> Self {
        ChunkId(value)
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl Debug for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassId({:08x})", self.0)
    }
}

impl Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl Debug for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChunkId({:08x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_bits() {
        let chunk = ChunkId::new(0x0304301f);
        assert_eq!(chunk.class(), ClassId::new(0x03043000));
        assert_eq!(chunk.index(), 0x01f);
        assert_eq!(
            chunk.with_class(ClassId::new(0x24003000)).get(),
            0x2400301f
        );
        assert_eq!(ClassId::new(0x0304301f).get(), 0x03043000);
        assert_eq!(ClassId::new(0x2e001000).engine(), 0x2e);
        assert_eq!(format!("{}", chunk), "0304301f");
    }
}
