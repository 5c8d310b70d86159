use crate::config::schema::{ConverterConfig, ValidationError};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Configuration file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "field-mapper.toml";

const SECTIONS: &str = "[accessor], [backup], [fields], [[learned.safe]], [[learned.risky]], [verify]";

#[derive(Debug)]
pub enum ConfigError {
    /// An explicitly named config file does not exist
    NotFound { path: PathBuf },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// `origin` is `None` for configs parsed from a string
    Toml {
        origin: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        origin: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn origin(&self) -> Option<&Path> {
        match self {
            ConfigError::NotFound { path } | ConfigError::Io { path, .. } => Some(path),
            ConfigError::Toml { origin, .. } | ConfigError::Validation { origin, .. } => {
                origin.as_deref()
            }
        }
    }
}

struct Origin<'a>(Option<&'a Path>);

impl fmt::Display for Origin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, "{}", path.display()),
            None => f.write_str("inline config"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "field-mapper config {} does not exist", path.display())
            }
            ConfigError::Io { path, source } => {
                write!(f, "cannot read field-mapper config {}: {}", path.display(), source)
            }
            ConfigError::Toml { origin, source } => write!(
                f,
                "{} is not a valid field-mapper config (sections: {}): {}",
                Origin(origin.as_deref()),
                SECTIONS,
                source
            ),
            ConfigError::Validation { origin, source } => {
                writeln!(
                    f,
                    "{}: {} problem(s) in the field table, accessor, learned patterns or limits",
                    Origin(origin.as_deref()),
                    source.issues.len()
                )?;
                for line in source.to_string().lines() {
                    writeln!(f, "  - {line}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::NotFound { .. } => None,
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

fn parse(input: &str, origin: Option<&Path>) -> Result<ConverterConfig, ConfigError> {
    let config: ConverterConfig =
        toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml {
            origin: origin.map(Path::to_path_buf),
            source,
        })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation {
            origin: origin.map(Path::to_path_buf),
            source,
        })?;

    tracing::debug!(
        origin = %Origin(origin),
        fields = config.fields.len(),
        learned_safe = config.learned.safe.len(),
        learned_risky = config.learned.risky.len(),
        accessor = %config.accessor().expression,
        max_backups = config.max_backups(),
        "loaded field-mapper config"
    );
    Ok(config)
}

/// Parse and validate a config held in memory.
pub fn load_from_str(input: &str) -> Result<ConverterConfig, ConfigError> {
    parse(input, None)
}

/// Parse and validate a config file; errors name the file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConverterConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    parse(&contents, Some(path))
}

/// Load `explicit` if given, else the default file in `dir` if it exists,
/// else the built-in defaults.
pub fn load_or_default(
    explicit: Option<&Path>,
    dir: &Path,
) -> Result<ConverterConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    if candidate.is_file() {
        tracing::debug!(path = %candidate.display(), "loading default config");
        return load_from_path(candidate);
    }
    Ok(ConverterConfig::default())
}
