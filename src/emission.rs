//! Aggregation of warm emission events by vehicle category, hour and link.
use crate::error::{ProcessingError, ProcessingResult};
use crate::id::LinkID;
use crate::input::{Element, read_elements};
use crate::vehicle::{Classifier, VehicleCategory, VehicleRegistry};
use log::{info, trace};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// The local name of the elements in an event file which define events
const EVENT_ELEMENT_NAME: &str = "event";

/// The value of the `type` attribute for the events which are aggregated
pub const WARM_EMISSION_EVENT_TYPE: &str = "warmEmissionEvent";

/// The number of seconds of simulation time in each hour bucket
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Running totals of fuel consumption and CO2-equivalent emissions.
///
/// Units are whatever the simulation's event attributes use (MJ and grams respectively for MATSim).
#[derive(Debug, Clone, Copy, Default, PartialEq, derive_more::Add, derive_more::AddAssign)]
pub struct EmissionTotals {
    /// Fuel consumption (`FC_MJ`)
    pub fc_mj: f64,
    /// CO2-equivalent emissions (`CO2e`)
    pub co2e: f64,
}

impl EmissionTotals {
    /// Create a new [`EmissionTotals`]
    pub fn new(fc_mj: f64, co2e: f64) -> Self {
        Self { fc_mj, co2e }
    }
}

impl std::iter::Sum for EmissionTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, totals| acc + totals)
    }
}

/// The key for a single leaf of an [`AggregationTable`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmissionKey {
    /// The category of the emitting vehicle
    pub category: VehicleCategory,
    /// Simulation hour, i.e. `floor(time / 3600)`. May exceed 23 for multi-day runs.
    pub hour: u32,
    /// The link on which the emissions occurred
    pub link_id: LinkID,
}

/// Emission totals for each combination of vehicle category, hour and link.
///
/// Entries are only created for combinations which actually occur.
#[derive(Debug, Default, PartialEq)]
pub struct AggregationTable {
    totals: HashMap<EmissionKey, EmissionTotals>,
    link_ids: HashSet<LinkID>,
    event_count: usize,
}

impl AggregationTable {
    /// Create a new, empty [`AggregationTable`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single event's emissions to the totals for the given key
    pub fn add(
        &mut self,
        category: VehicleCategory,
        hour: u32,
        link_id: &str,
        totals: EmissionTotals,
    ) {
        let link_id = if let Some(link_id) = self.link_ids.get(link_id) {
            link_id.clone()
        } else {
            let link_id = LinkID::new(link_id);
            self.link_ids.insert(link_id.clone());
            link_id
        };

        let key = EmissionKey {
            category,
            hour,
            link_id,
        };
        *self.totals.entry(key).or_default() += totals;
        self.event_count += 1;
    }

    /// Get the totals for the given key, if any events were recorded for it
    pub fn get(
        &self,
        category: VehicleCategory,
        hour: u32,
        link_id: &str,
    ) -> Option<EmissionTotals> {
        let key = EmissionKey {
            category,
            hour,
            link_id: link_id.into(),
        };
        self.totals.get(&key).copied()
    }

    /// Iterate over the leaves of the table in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&EmissionKey, &EmissionTotals)> {
        self.totals.iter()
    }

    /// The number of distinct (category, hour, link) combinations
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// The number of events which have been added
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// The sum over all leaves
    pub fn total(&self) -> EmissionTotals {
        self.totals.values().copied().sum()
    }
}

/// Convert a simulation time in seconds to an hour bucket.
///
/// Returns `None` for negative or non-finite times and for times whose hour does not fit in a
/// `u32`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hour_bucket(time: f64) -> Option<u32> {
    if !time.is_finite() || time < 0.0 {
        return None;
    }

    let hour = (time / SECONDS_PER_HOUR).floor();
    if hour > f64::from(u32::MAX) {
        return None;
    }

    Some(hour as u32)
}

/// The fields of a warm emission event needed for aggregation
#[derive(Debug, PartialEq)]
struct WarmEmissionEvent<'a> {
    vehicle_id: &'a str,
    link_id: &'a str,
    hour: u32,
    totals: EmissionTotals,
}

impl<'a> WarmEmissionEvent<'a> {
    /// Extract the required fields from an `event` element.
    ///
    /// All fields are required: a missing or invalid one is an error, as substituting a default
    /// would silently under-count emissions.
    fn from_element(element: &'a Element) -> ProcessingResult<Self> {
        let time = element.required_f64("time")?;
        let hour = hour_bucket(time).ok_or_else(|| {
            ProcessingError::data(element.position, format!("Invalid event time: {time}"))
        })?;
        let vehicle_id = element.required_attribute("vehicleId")?;
        let link_id = element.required_attribute("linkId")?;
        let fc_mj = required_finite(element, "FC_MJ")?;
        let co2e = required_finite(element, "CO2e")?;

        Ok(Self {
            vehicle_id,
            link_id,
            hour,
            totals: EmissionTotals::new(fc_mj, co2e),
        })
    }
}

/// Read an emission value, which must be a finite number
fn required_finite(element: &Element, key: &str) -> ProcessingResult<f64> {
    let value = element.required_f64(key)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProcessingError::data(
            element.position,
            format!("Attribute {key} must be finite, got {value}"),
        ))
    }
}

/// Aggregate a sequence of `event` elements.
///
/// Only events whose `type` is [`WARM_EMISSION_EVENT_TYPE`] are considered; others are ignored.
/// Vehicles absent from `registry` are classified as having the raw type `"unknown"`.
///
/// On error, no partial table is returned.
pub fn aggregate_events<I>(
    elements: I,
    registry: &VehicleRegistry,
    classifier: &Classifier,
) -> ProcessingResult<AggregationTable>
where
    I: IntoIterator<Item = ProcessingResult<Element>>,
{
    let mut table = AggregationTable::new();
    for element in elements {
        let element = element?;
        if element.attribute("type") != Some(WARM_EMISSION_EVENT_TYPE) {
            continue;
        }

        let event = WarmEmissionEvent::from_element(&element)?;
        let category = classifier.classify(registry.get_or_unknown(event.vehicle_id));
        trace!(
            "Event for vehicle {} ({category}) at hour {} on link {}",
            event.vehicle_id, event.hour, event.link_id
        );
        table.add(category, event.hour, event.link_id, event.totals);
    }

    Ok(table)
}

/// Aggregate the warm emission events in a (usually gzip-compressed) event XML file.
///
/// The file is streamed, so memory use is bounded by the size of the resulting table.
pub fn aggregate_emissions(
    file_path: &Path,
    registry: &VehicleRegistry,
    classifier: &Classifier,
) -> ProcessingResult<AggregationTable> {
    info!("Reading emission events from {}", file_path.display());
    let table = aggregate_events(
        read_elements(file_path, EVENT_ELEMENT_NAME)?,
        registry,
        classifier,
    )?;
    info!(
        "Aggregated {} warm emission event(s) into {} entries",
        table.event_count(),
        table.len()
    );

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{classifier, registry, warm_event};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, Some(0))]
    #[case(3599.0, Some(0))]
    #[case(3600.0, Some(1))]
    #[case(7199.999, Some(1))]
    #[case(90000.0, Some(25))]
    #[case(-1.0, None)]
    #[case(f64::NAN, None)]
    #[case(f64::INFINITY, None)]
    #[case(f64::from(u32::MAX) * SECONDS_PER_HOUR, Some(u32::MAX))]
    #[case((f64::from(u32::MAX) + 1.0) * SECONDS_PER_HOUR, None)]
    #[case(1e14, None)]
    fn test_hour_bucket(#[case] time: f64, #[case] expected: Option<u32>) {
        assert_eq!(hour_bucket(time), expected);
    }

    #[test]
    fn test_table_add_accumulates() {
        let mut table = AggregationTable::new();
        table.add(VehicleCategory::Car, 0, "L1", EmissionTotals::new(1.0, 0.1));
        table.add(VehicleCategory::Car, 0, "L1", EmissionTotals::new(2.0, 0.2));
        table.add(VehicleCategory::Car, 1, "L1", EmissionTotals::new(4.0, 0.4));

        assert_eq!(table.len(), 2);
        assert_eq!(table.event_count(), 3);
        let totals = table.get(VehicleCategory::Car, 0, "L1").unwrap();
        assert_approx_eq!(f64, totals.fc_mj, 3.0);
        assert_approx_eq!(f64, totals.co2e, 0.3, epsilon = 1e-12);
        assert_eq!(table.get(VehicleCategory::Car, 0, "L2"), None);
        assert_eq!(table.get(VehicleCategory::Microcar, 0, "L1"), None);
    }

    #[rstest]
    fn test_aggregate_events(registry: VehicleRegistry, classifier: Classifier) {
        let events = [
            Ok(warm_event("v1", 100.0, "A", 1.0, 0.1)),
            Ok(warm_event("v1", 4000.0, "A", 2.0, 0.2)),
            Ok(warm_event("v2", 200.0, "B", 0.5, 0.05)),
        ];
        let table = aggregate_events(events, &registry, &classifier).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get(VehicleCategory::Car, 0, "A"),
            Some(EmissionTotals::new(1.0, 0.1))
        );
        assert_eq!(
            table.get(VehicleCategory::Car, 1, "A"),
            Some(EmissionTotals::new(2.0, 0.2))
        );
        assert_eq!(
            table.get(VehicleCategory::Microcar, 0, "B"),
            Some(EmissionTotals::new(0.5, 0.05))
        );
    }

    #[rstest]
    fn test_aggregate_events_conserves_totals(
        registry: VehicleRegistry,
        classifier: Classifier,
    ) {
        let values = [(1.25, 0.5), (3.0, 1.0), (0.125, 0.25), (7.5, 2.0), (10.0, 4.0)];
        let events = values.iter().enumerate().map(|(i, (fc_mj, co2e))| {
            let vehicle_id = if i % 2 == 0 { "v1" } else { "v3" };
            let link_id = if i % 3 == 0 { "A" } else { "B" };
            #[allow(clippy::cast_precision_loss)]
            let time = i as f64 * 2000.0;
            Ok(warm_event(vehicle_id, time, link_id, *fc_mj, *co2e))
        });
        let table = aggregate_events(events, &registry, &classifier).unwrap();

        let total = table.total();
        assert_approx_eq!(f64, total.fc_mj, values.iter().map(|(f, _)| f).sum::<f64>());
        assert_approx_eq!(f64, total.co2e, values.iter().map(|(_, c)| c).sum::<f64>());
        assert_eq!(table.event_count(), values.len());
    }

    #[rstest]
    fn test_aggregate_events_ignores_other_types(
        registry: VehicleRegistry,
        classifier: Classifier,
    ) {
        let events = [
            Ok(Element::new("event", 0)
                .with_attribute("type", "coldEmissionEvent")
                .with_attribute("vehicleId", "v1")
                .with_attribute("time", "10")
                .with_attribute("linkId", "A")
                .with_attribute("FC_MJ", "5")
                .with_attribute("CO2e", "1")),
            Ok(Element::new("event", 50)
                .with_attribute("type", "entered link")
                .with_attribute("time", "10")),
            Ok(Element::new("event", 80)),
        ];
        let table = aggregate_events(events, &registry, &classifier).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.event_count(), 0);
    }

    #[rstest]
    fn test_aggregate_events_unknown_vehicle(registry: VehicleRegistry, classifier: Classifier) {
        let events = [Ok(warm_event("nobody", 0.0, "A", 1.0, 0.1))];
        let table = aggregate_events(events, &registry, &classifier).unwrap();
        assert_eq!(
            table.get(VehicleCategory::Unknown, 0, "A"),
            Some(EmissionTotals::new(1.0, 0.1))
        );
    }

    #[rstest]
    #[case("FC_MJ")]
    #[case("CO2e")]
    #[case("time")]
    #[case("vehicleId")]
    #[case("linkId")]
    fn test_aggregate_events_missing_attribute(
        registry: VehicleRegistry,
        classifier: Classifier,
        #[case] missing: &str,
    ) {
        let mut incomplete =
            Element::new("event", 100).with_attribute("type", WARM_EMISSION_EVENT_TYPE);
        for (key, value) in [
            ("time", "10"),
            ("vehicleId", "v1"),
            ("linkId", "A"),
            ("FC_MJ", "1.0"),
            ("CO2e", "0.1"),
        ] {
            if key != missing {
                incomplete = incomplete.with_attribute(key, value);
            }
        }

        let events = [Ok(warm_event("v1", 0.0, "A", 1.0, 0.1)), Ok(incomplete)];
        let result = aggregate_events(events, &registry, &classifier);
        assert!(matches!(
            result,
            Err(ProcessingError::Data { position: 100, .. })
        ));
    }

    #[rstest]
    #[case("time", "noon")]
    #[case("time", "-5")]
    #[case("time", "1e20")]
    #[case("FC_MJ", "lots")]
    #[case("CO2e", "NaN")]
    fn test_aggregate_events_invalid_value(
        registry: VehicleRegistry,
        classifier: Classifier,
        #[case] key: &str,
        #[case] value: &str,
    ) {
        let mut event = Element::new("event", 0).with_attribute("type", WARM_EMISSION_EVENT_TYPE);
        for (k, v) in [
            ("time", "10"),
            ("vehicleId", "v1"),
            ("linkId", "A"),
            ("FC_MJ", "1.0"),
            ("CO2e", "0.1"),
        ] {
            event = event.with_attribute(k, if k == key { value } else { v });
        }

        let result = aggregate_events([Ok(event)], &registry, &classifier);
        assert!(matches!(result, Err(ProcessingError::Data { .. })));
    }
}
