//! Aggregation of emission events from transport micro-simulation output.
//!
//! The pipeline is split into three strictly sequential steps: loading the vehicle registry
//! ([`vehicle::load_vehicle_registry`]), aggregating warm emission events
//! ([`emission::aggregate_emissions`]) and exporting the summary views ([`output`]).
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod emission;
pub mod error;
pub mod id;
pub mod input;
pub mod log;
pub mod output;
pub mod pollutant;
pub mod settings;
pub mod vehicle;

#[cfg(test)]
mod fixture;

/// The name of the folder in the user's config directory where settings are stored
const CONFIG_DIR_NAME: &str = "emissions-report";

/// Get the directory where program configuration files are stored
pub fn get_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(CONFIG_DIR_NAME);

    path
}
