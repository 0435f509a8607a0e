use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod buffer2;
pub mod file_utils;
pub mod log_setup;
pub mod parallel;
pub mod test_utils;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|os_str| os_str.to_str())
}

/// Text formats accepted for configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_file_name(file_name: &str) -> FileFormatResult<Self> {
        let extension = get_file_extension(file_name)
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or(FileExtensionError::MissingFileExtension)?;

        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(FileExtensionError::UnsupportedFileExtension(
                file_name.to_string(),
            )),
        }
    }
}

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> SerdeFormatResult<String> {
    let mut text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

pub fn deserialize<T: DeserializeOwned>(
    serialized: &str,
    format: FileFormat,
) -> SerdeFormatResult<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}
