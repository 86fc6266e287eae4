//! Code for writing metadata about a run to file
use crate::emission::AggregationTable;
use crate::vehicle::VehicleRegistry;
use anyhow::{Context, Result};
use chrono::prelude::*;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
pub const METADATA_FILE_NAME: &str = "metadata.toml";

/// Information about the program build via `built` crate
mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Get information about program version from git
fn get_git_hash() -> String {
    let Some(hash) = built_info::GIT_COMMIT_HASH_SHORT else {
        return "unknown".into();
    };

    if built_info::GIT_DIRTY == Some(true) {
        format!("{hash}-dirty")
    } else {
        hash.into()
    }
}

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    summary: SummaryMetadata,
    program: ProgramMetadata<'a>,
    platform: PlatformMetadata,
}

/// The input files for a run
pub struct RunInputs<'a> {
    /// Path to the vehicle file
    pub vehicle_file: &'a Path,
    /// Path to the event file
    pub event_file: &'a Path,
    /// Path to a replacement classification table, if one was used
    pub classification_file: Option<&'a Path>,
}

/// Information about the run
#[derive(Serialize)]
struct RunMetadata<'a> {
    vehicle_file: &'a Path,
    event_file: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    classification_file: Option<&'a Path>,
    /// The date and time on which the report was written
    datetime: String,
}

impl<'a> RunMetadata<'a> {
    fn new(inputs: &RunInputs<'a>) -> Self {
        let dt = Local::now();
        Self {
            vehicle_file: inputs.vehicle_file,
            event_file: inputs.event_file,
            classification_file: inputs.classification_file,
            datetime: dt.to_rfc2822(),
        }
    }
}

/// Counts and totals for the run, useful for comparing scenarios without opening the workbook
#[derive(Serialize)]
struct SummaryMetadata {
    vehicle_count: usize,
    warm_emission_event_count: usize,
    entry_count: usize,
    total_fc_mj: f64,
    total_co2e: f64,
}

impl SummaryMetadata {
    fn new(registry: &VehicleRegistry, table: &AggregationTable) -> Self {
        let total = table.total();
        Self {
            vehicle_count: registry.len(),
            warm_emission_event_count: table.event_count(),
            entry_count: table.len(),
            total_fc_mj: total.fc_mj,
            total_co2e: total.co2e,
        }
    }
}

#[derive(Serialize)]
struct ProgramMetadata<'a> {
    name: &'a str,
    version: &'a str,
    target: &'a str,
    is_debug: bool,
    rustc_version: &'a str,
    build_time_utc: &'a str,
    git_commit_hash: String,
}

impl Default for ProgramMetadata<'_> {
    fn default() -> Self {
        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit_hash: get_git_hash(),
        }
    }
}

/// Information about the platform on which the program is running.
///
/// The fields correspond to different data available from the [`PlatformInfo`] struct.
#[derive(Serialize)]
struct PlatformMetadata {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    fn new() -> Result<Self> {
        let info = PlatformInfo::new()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .context("Unable to determine platform info")?;
        Ok(Self {
            sysname: info.sysname().to_string_lossy().into(),
            nodename: info.nodename().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            version: info.version().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        })
    }
}

/// Write metadata to the specified output folder in TOML format
pub fn write_metadata(
    output_dir: &Path,
    inputs: &RunInputs,
    registry: &VehicleRegistry,
    table: &AggregationTable,
) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata::new(inputs),
        summary: SummaryMetadata::new(registry, table),
        program: ProgramMetadata::default(),
        platform: PlatformMetadata::new()?,
    };
    let file_path = output_dir.join(METADATA_FILE_NAME);
    fs::write(&file_path, toml::to_string(&metadata)?)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{registry, table};
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    fn test_write_metadata(registry: VehicleRegistry, table: AggregationTable) {
        let dir = tempdir().unwrap();
        let inputs = RunInputs {
            vehicle_file: Path::new("vehicles.xml.gz"),
            event_file: Path::new("events.xml.gz"),
            classification_file: None,
        };
        write_metadata(dir.path(), &inputs, &registry, &table).unwrap();

        let contents = fs::read_to_string(dir.path().join(METADATA_FILE_NAME)).unwrap();
        let value: toml::Table = toml::from_str(&contents).unwrap();
        assert_eq!(value["run"]["event_file"].as_str(), Some("events.xml.gz"));
        assert!(value["run"].get("classification_file").is_none());
        assert_eq!(value["summary"]["vehicle_count"].as_integer(), Some(3));
        assert_eq!(
            value["summary"]["warm_emission_event_count"].as_integer(),
            Some(2)
        );
        assert_eq!(value["summary"]["total_fc_mj"].as_float(), Some(15.0));
    }
}
