use crate::{ChunkId, ClassId};
use std::collections::HashMap;

/// Which generation of class IDs to emit when writing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RemapPolicy {
    /// Legacy IDs are written as their current equivalent.
    #[default]
    Latest,
    /// IDs are written exactly as they were read.
    Preserve,
    /// Current IDs are written as the most recent legacy ID mapping to them.
    Legacy,
}

/// Legacy → current class ID table.
#[derive(Debug, Default, Clone)]
pub struct RemapTable {
    forward: HashMap<ClassId, ClassId>,
    backward: HashMap<ClassId, ClassId>,
}

impl RemapTable {
    /// Parses `old -> new` lines of hex IDs. Unparseable lines are skipped.
    pub fn parse(text: &str) -> RemapTable {
        let mut order: Vec<(ClassId, ClassId)> = Vec::new();

        for line in text.lines() {
            let Some((old, new)) = line.split_once(" -> ") else {
                continue;
            };
            let (Ok(old), Ok(new)) = (
                u32::from_str_radix(old.trim(), 16),
                u32::from_str_radix(new.trim(), 16),
            ) else {
                tracing::debug!("Skipping remap line {:?}", line);
                continue;
            };
            let (old, new) = (ClassId::new(old), ClassId::new(new));

            // anything that pointed at `old` now points at `new`
            for (_, value) in order.iter_mut().filter(|(_, value)| *value == old) {
                *value = new;
            }
            match order.iter_mut().find(|(key, _)| *key == old) {
                Some(entry) => entry.1 = new,
                None => order.push((old, new)),
            }
        }

        let mut forward: HashMap<ClassId, ClassId> = order.iter().copied().collect();

        // chains declared out of order
        loop {
            let mut changed = false;
            for key in order.iter().map(|(key, _)| *key) {
                let value = forward[&key];
                if let Some(&next) = forward.get(&value) {
                    if next != value && next != key {
                        forward.insert(key, next);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        // self-maps and cycles never remap
        let looping: Vec<ClassId> = forward
            .iter()
            .filter(|(key, value)| key == value || forward.contains_key(*value))
            .map(|(key, _)| *key)
            .collect();
        for key in looping {
            tracing::warn!("Dropping cyclic class ID mapping for {}", key);
            forward.remove(&key);
        }

        let mut backward = HashMap::new();
        for (key, _) in order.iter() {
            if let Some(value) = forward.get(key) {
                backward.insert(*value, *key);
            }
        }

        tracing::debug!("{} class ID mappings", forward.len());
        RemapTable { forward, backward }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn remap(&self, id: ClassId) -> ClassId {
        self.forward.get(&id).copied().unwrap_or(id)
    }

    pub fn remap_chunk(&self, id: ChunkId) -> ChunkId {
        id.with_class(self.remap(id.class()))
    }

    /// The latest legacy ID that maps to `id`, if any.
    pub fn legacy(&self, id: ClassId) -> Option<ClassId> {
        self.backward.get(&id).copied()
    }

    /// The class ID to write for `id` under `policy`.
    pub fn apply(&self, id: ClassId, policy: RemapPolicy) -> ClassId {
        match policy {
            RemapPolicy::Latest => self.remap(id),
            RemapPolicy::Preserve => id,
            RemapPolicy::Legacy => {
                let current = self.remap(id);
                self.legacy(current).unwrap_or(current)
            }
        }
    }

    pub fn apply_chunk(&self, id: ChunkId, policy: RemapPolicy) -> ChunkId {
        id.with_class(self.apply(id.class(), policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
21080000 -> 24003000
24003000 -> 03043000
2400C000 -> 0305B000
this is not a mapping
24061000 -> 03078000
24062000 -> 03078000
";

    fn id(value: u32) -> ClassId {
        ClassId::new(value)
    }

    #[test]
    fn chains_collapse() {
        let table = RemapTable::parse(TABLE);
        assert_eq!(table.remap(id(0x21080000)), id(0x03043000));
        assert_eq!(table.remap(id(0x24003000)), id(0x03043000));
        assert_eq!(table.remap(id(0x03043000)), id(0x03043000));
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn out_of_order_chain() {
        let table = RemapTable::parse("24003000 -> 03043000\n21080000 -> 24003000\n");
        assert_eq!(table.remap(id(0x21080000)), id(0x03043000));
    }

    #[test]
    fn remap_is_idempotent() {
        let table = RemapTable::parse(TABLE);
        for raw in [
            0x21080000, 0x24003000, 0x03043000, 0x2400c000, 0x24061000, 0x24062000, 0x0a0b0000,
        ] {
            let once = table.remap(id(raw));
            assert_eq!(table.remap(once), once, "{:08x}", raw);

            let chunk = ChunkId::new(raw | 0x01f);
            let once = table.remap_chunk(chunk);
            assert_eq!(table.remap_chunk(once), once);
            assert_eq!(once.index(), 0x01f);
        }
    }

    #[test]
    fn policies() {
        let table = RemapTable::parse(TABLE);
        let legacy = id(0x24003000);
        let current = id(0x03043000);

        assert_eq!(table.apply(legacy, RemapPolicy::Latest), current);
        assert_eq!(table.apply(legacy, RemapPolicy::Preserve), legacy);
        assert_eq!(table.apply(current, RemapPolicy::Legacy), legacy);
        assert_eq!(table.apply(id(0x21080000), RemapPolicy::Legacy), legacy);
        // last declared legacy ID wins
        assert_eq!(table.apply(id(0x03078000), RemapPolicy::Legacy), id(0x24062000));
        // nothing to go back to
        assert_eq!(table.apply(id(0x2e001000), RemapPolicy::Legacy), id(0x2e001000));

        assert_eq!("legacy".parse::<RemapPolicy>().unwrap(), RemapPolicy::Legacy);
        assert_eq!(RemapPolicy::default().to_string(), "latest");
    }
}
