use field_mapper_converter::{ConversionOptions, ConverterConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Config mapping `legacyField` to `CANON_KEY` through `lookup(...)`,
/// backing up into the temp dir.
pub fn config_in(temp: &TempDir) -> ConverterConfig {
    let mut config = ConverterConfig::default();
    config.backup.dir = Some(temp.path().join("backups"));
    config
        .fields
        .insert("legacyField".to_string(), "CANON_KEY".to_string());
    config.accessor.expression = Some("lookup".to_string());
    config.accessor.module = Some("lookup".to_string());
    config
}

pub fn auto_options() -> ConversionOptions {
    ConversionOptions {
        auto_approve: true,
        interactive: false,
        ..Default::default()
    }
}

pub fn write_file(dir: &Path, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
