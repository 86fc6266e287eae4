//! Fixtures for tests
use crate::emission::{AggregationTable, EmissionTotals, WARM_EMISSION_EVENT_TYPE};
use crate::input::Element;
use crate::vehicle::{Classifier, VehicleCategory, VehicleRegistry};
use flate2::Compression;
use flate2::write::GzEncoder;
use rstest::fixture;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A `vehicle` element with the given ID and type
pub fn vehicle(id: &str, raw_type: &str) -> Element {
    Element::new("vehicle", 0)
        .with_attribute("id", id)
        .with_attribute("type", raw_type)
}

/// A complete `warmEmissionEvent` element
pub fn warm_event(vehicle_id: &str, time: f64, link_id: &str, fc_mj: f64, co2e: f64) -> Element {
    Element::new("event", 0)
        .with_attribute("time", &time.to_string())
        .with_attribute("type", WARM_EMISSION_EVENT_TYPE)
        .with_attribute("vehicleId", vehicle_id)
        .with_attribute("linkId", link_id)
        .with_attribute("FC_MJ", &fc_mj.to_string())
        .with_attribute("CO2e", &co2e.to_string())
}

/// Write `contents` to a gzip-compressed file
pub fn write_gzip(file_path: &Path, contents: &str) {
    let file = File::create(file_path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

#[fixture]
pub fn registry() -> VehicleRegistry {
    let mut registry = VehicleRegistry::new();
    registry.insert("v1", "car");
    registry.insert("v2", "microcar");
    registry.insert("v3", "heavy40t");
    registry
}

#[fixture]
pub fn classifier() -> Classifier {
    Classifier::default()
}

#[fixture]
pub fn table() -> AggregationTable {
    let mut table = AggregationTable::new();
    table.add(VehicleCategory::Car, 0, "L1", EmissionTotals::new(10.0, 1.0));
    table.add(VehicleCategory::Car, 1, "L1", EmissionTotals::new(5.0, 0.5));
    table
}
