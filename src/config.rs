use anyhow::Context;
use gbx_rs::{Compression, ReadSettings, RemapPolicy, WriteSettings};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub read: ReadConfig,
    pub write: WriteConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadConfig {
    /// Discover every known skippable chunk while reading.
    pub discover_skippable: bool,
    /// How deep node references may nest. The library default when unset.
    pub max_node_depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteConfig {
    /// `latest`, `preserve` or `legacy`.
    pub remap: String,
    /// `compressed` or `uncompressed`. Keeps the file's own when unset.
    pub body_compression: Option<String>,
}

impl Default for WriteConfig {
    fn default() -> Self {
        WriteConfig {
            remap: RemapPolicy::default().to_string(),
            body_compression: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsConfig {
    pub max_concurrent: usize,
    /// File extension to pick up when walking directories, compared
    /// case-insensitively.
    pub extension: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        JobsConfig {
            max_concurrent: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(4),
            extension: String::from("gbx"),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Reading config file {}", path.display()))?;
        let config = toml::from_str::<Config>(&content).context("Parsing config file")?;

        // fail early on bad names rather than once per file
        config.write_settings()?;
        if config.read.max_node_depth == Some(0) {
            anyhow::bail!("read.max_node_depth must be at least 1");
        }
        if config.jobs.max_concurrent == 0 {
            anyhow::bail!("jobs.max_concurrent must be at least 1");
        }
        Ok(config)
    }

    pub fn read_settings(&self) -> ReadSettings {
        let settings = ReadSettings::default().discover_skippable(self.read.discover_skippable);
        match self.read.max_node_depth {
            Some(depth) => settings.max_node_depth(depth),
            None => settings,
        }
    }

    pub fn write_settings(&self) -> anyhow::Result<WriteSettings> {
        let remap: RemapPolicy = self
            .write
            .remap
            .parse()
            .with_context(|| format!("Unknown remap policy {:?}", self.write.remap))?;
        let mut settings = WriteSettings::default().remap(remap);
        if let Some(compression) = &self.write.body_compression {
            let compression: Compression = compression
                .parse()
                .with_context(|| format!("Unknown body compression {:?}", compression))?;
            settings = settings.body_compression(compression);
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_is_optional() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.read.discover_skippable);
        assert_eq!(
            config.read_settings().max_node_depth,
            ReadSettings::default().max_node_depth
        );
        assert_eq!(config.write_settings().unwrap(), WriteSettings::default());
        assert!(config.jobs.max_concurrent >= 1);
    }

    #[test]
    fn names_are_parsed() {
        let config: Config = toml::from_str(
            r#"
            [read]
            discover_skippable = true
            max_node_depth = 16

            [write]
            remap = "legacy"
            body_compression = "uncompressed"

            [jobs]
            max_concurrent = 2
            "#,
        )
        .unwrap();
        let settings = config.write_settings().unwrap();
        assert_eq!(settings.remap, RemapPolicy::Legacy);
        assert_eq!(settings.body_compression, Some(Compression::Uncompressed));
        assert!(config.read_settings().discover_skippable);
        assert_eq!(config.read_settings().max_node_depth, 16);
        assert_eq!(config.jobs.max_concurrent, 2);
    }

    #[test]
    fn bad_names_are_rejected() {
        let config: Config = toml::from_str("[write]\nremap = \"newest\"").unwrap();
        assert!(config.write_settings().is_err());
        assert!(toml::from_str::<Config>("[write]\nremapping = \"latest\"").is_err());
    }
}
