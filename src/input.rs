//! Common routines for handling input data.
use crate::error::{ProcessingError, ProcessingResult};
use anyhow::{Context, Result};
use flate2::bufread::MultiGzDecoder;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

pub mod xml;
pub use xml::{Element, ElementReader};

/// The first two bytes of every gzip stream
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path)
        .with_context(|| format!("Could not read file {}", file_path.display()))?;
    let toml_data = toml::from_str(&toml_str)
        .with_context(|| format!("Could not parse TOML file {}", file_path.display()))?;

    Ok(toml_data)
}

/// Open a simulation output file for buffered, streaming reading.
///
/// Files starting with the gzip magic bytes are decompressed on the fly (multi-member streams are
/// supported); anything else is read as-is.
pub fn open_input(file_path: &Path) -> ProcessingResult<Box<dyn BufRead>> {
    let io_error = |source| ProcessingError::Io {
        path: file_path.to_path_buf(),
        source,
    };

    let file = File::open(file_path).map_err(io_error)?;
    let mut reader = BufReader::new(file);
    let is_gzip = reader.fill_buf().map_err(io_error)?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Stream the elements with the given local name from an XML file.
///
/// The file handle is owned by the returned reader and closed when it is dropped.
pub fn read_elements(
    file_path: &Path,
    element_name: &str,
) -> ProcessingResult<ElementReader<Box<dyn BufRead>>> {
    let input = open_input(file_path)?;
    Ok(ElementReader::new(input, file_path, element_name))
}
