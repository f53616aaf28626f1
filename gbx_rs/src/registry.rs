use crate::{
    classes,
    schema::{ChunkSchema, ClassSchema},
    ChunkId, ClassId, RemapTable,
};
use std::{collections::HashMap, sync::LazyLock};

static CLASS_NAMES: &str = include_str!("../resources/ClassId.txt");
static CLASS_MAPPINGS: &str = include_str!("../resources/ClassIdMappings.txt");

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::build);

/// Everything known about classes: names, legacy ID mappings and the
/// compiled-in schemas. Built once, read-only afterwards.
#[derive(Debug)]
pub struct Registry {
    names: HashMap<ClassId, String>,
    remap: RemapTable,
    classes: HashMap<ClassId, ClassSchema>,
}

impl Registry {
    pub fn get() -> &'static Registry {
        &REGISTRY
    }

    fn build() -> Registry {
        let names = parse_names(CLASS_NAMES);
        tracing::debug!("{} class names", names.len());

        let remap = RemapTable::parse(CLASS_MAPPINGS);
        let registry = Registry::from_parts(names, remap, classes::definitions());
        tracing::debug!("{} class schemas", registry.classes.len());
        registry
    }

    pub(crate) fn from_parts(
        names: HashMap<ClassId, String>,
        remap: RemapTable,
        definitions: Vec<ClassSchema>,
    ) -> Registry {
        let mut classes: HashMap<ClassId, ClassSchema> = HashMap::new();
        for schema in definitions {
            if classes.contains_key(&schema.id) {
                tracing::warn!("Class {} declared twice", schema.name);
            }
            classes.insert(schema.id, schema);
        }

        let parents: HashMap<ClassId, Option<ClassId>> = classes
            .values()
            .map(|schema| (schema.id, schema.parent))
            .collect();

        for schema in classes.values_mut() {
            let mut ancestors = vec![schema.id];
            let mut parent = schema.parent;
            while let Some(id) = parent {
                if ancestors.contains(&id) {
                    tracing::warn!("Inheritance cycle through {}", id);
                    break;
                }
                ancestors.push(id);
                parent = match parents.get(&id) {
                    Some(parent) => *parent,
                    None => {
                        tracing::warn!("Parent {} of {} has no schema", id, schema.name);
                        None
                    }
                };
            }
            schema.ancestors = ancestors;
        }

        Registry {
            names,
            remap,
            classes,
        }
    }

    pub fn remap_table(&self) -> &RemapTable {
        &self.remap
    }

    pub fn remap(&self, id: ClassId) -> ClassId {
        self.remap.remap(id)
    }

    /// `Engine::Class` name, after remapping.
    pub fn class_name(&self, id: ClassId) -> Option<&str> {
        self.names
            .get(&self.remap(id))
            .or_else(|| self.names.get(&id))
            .map(String::as_str)
    }

    pub fn resolve_class(&self, id: ClassId) -> Option<&ClassSchema> {
        self.classes.get(&self.remap(id))
    }

    /// Looks the chunk up in `class` and then in each ancestor, nearest
    /// first.
    pub fn resolve_chunk(&self, class: &ClassSchema, chunk_id: ChunkId) -> Option<&ChunkSchema> {
        let chunk_id = self.remap.remap_chunk(chunk_id);
        class
            .ancestors()
            .iter()
            .filter_map(|ancestor| self.classes.get(ancestor))
            .find_map(|ancestor| ancestor.chunks.get(&chunk_id))
    }

    pub fn resolve_header_chunk(&self, class: &ClassSchema, chunk_id: ChunkId) -> Option<&ChunkSchema> {
        let chunk_id = self.remap.remap_chunk(chunk_id);
        class
            .ancestors()
            .iter()
            .filter_map(|ancestor| self.classes.get(ancestor))
            .find_map(|ancestor| ancestor.header_chunks.get(&chunk_id))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassSchema> {
        self.classes.values()
    }
}

/// `XX Engine` lines followed by indented `  YYY Class` lines, giving
/// class `0xXXYYY000`.
fn parse_names(text: &str) -> HashMap<ClassId, String> {
    let mut names = HashMap::new();
    let mut engine: Option<(u32, &str)> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(class_line) = line.strip_prefix("  ") {
            let Some((engine_id, engine_name)) = engine else {
                tracing::debug!("Class line before any engine: {:?}", line);
                continue;
            };
            let (class, name) = class_line.split_once(' ').unwrap_or((class_line, ""));
            let Ok(class) = u32::from_str_radix(class, 16) else {
                tracing::debug!("Invalid class ID {:?}, skipping", class);
                continue;
            };
            let id = ClassId::new((engine_id << 24) | (class << 12));
            names.insert(id, format!("{}::{}", engine_name, name.trim()));
        } else {
            let (id, name) = line.split_once(' ').unwrap_or((line, ""));
            match u32::from_str_radix(id, 16) {
                Ok(id) => engine = Some((id, name.trim())),
                Err(_) => tracing::debug!("Invalid engine ID {:?}, skipping", id),
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{class, schema::layout};

    #[test]
    fn names() {
        let names = parse_names("03 Game\n  043 CGameCtnChallenge\n2E GameData\n  001 CGameCtnCollector\nnonsense\n  zzz Bad\n");
        assert_eq!(
            names.get(&ClassId::new(0x03043000)).map(String::as_str),
            Some("Game::CGameCtnChallenge")
        );
        assert_eq!(
            names.get(&ClassId::new(0x2e001000)).map(String::as_str),
            Some("GameData::CGameCtnCollector")
        );
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn legacy_ids_resolve() {
        let registry = Registry::get();
        let legacy = registry.resolve_class(ClassId::new(0x24003000)).unwrap();
        assert_eq!(legacy.id, class::CGameCtnChallenge);
        assert_eq!(
            registry.class_name(ClassId::new(0x24003000)),
            Some("Game::CGameCtnChallenge")
        );
        assert!(registry.resolve_class(ClassId::new(0x0a0b0000)).is_none());
    }

    #[test]
    fn inherited_chunks_resolve_nearest_first() {
        let base = ClassId::new(0x0a001000);
        let middle = ClassId::new(0x0a002000);
        let leaf = ClassId::new(0x0a003000);
        let definitions = vec![
            ClassSchema::new("Base", base, None)
                .chunk(ChunkSchema::new(base, 1).fields(layout! { a: int })),
            ClassSchema::new("Middle", middle, Some(base))
                .chunk(ChunkSchema::new(middle, 1).fields(layout! { b: int })),
            ClassSchema::new("Leaf", leaf, Some(middle)),
        ];
        let registry = Registry::from_parts(HashMap::new(), RemapTable::default(), definitions);

        let leaf = registry.resolve_class(leaf).unwrap();
        assert_eq!(leaf.ancestors(), &[ClassId::new(0x0a003000), middle, base]);

        let chunk = registry.resolve_chunk(leaf, base.chunk(1)).unwrap();
        assert_eq!(chunk.id, base.chunk(1));
        let chunk = registry.resolve_chunk(leaf, middle.chunk(1)).unwrap();
        assert_eq!(chunk.layout().len(), 1);
        assert!(registry.resolve_chunk(leaf, leaf.id.chunk(1)).is_none());
    }

    #[test]
    fn compiled_in_inheritance() {
        let registry = Registry::get();
        let item = registry.resolve_class(class::CGameItemModel).unwrap();
        assert_eq!(
            item.ancestors(),
            &[class::CGameItemModel, class::CGameCtnCollector, class::CMwNod]
        );
        let collector_chunk = class::CGameCtnCollector.chunk(0x00c);
        assert!(registry.resolve_chunk(item, collector_chunk).is_some());
        let header = class::CGameCtnCollector.chunk(0x003);
        assert!(registry.resolve_header_chunk(item, header).is_some());
        assert!(registry.resolve_chunk(item, header).is_none());
    }
}
