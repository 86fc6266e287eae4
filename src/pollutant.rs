//! Whole-file totals for each pollutant recorded on emission events.
use crate::error::ProcessingResult;
use crate::input::{Element, read_elements};
use indexmap::IndexMap;
use log::info;
use std::path::Path;

/// The event types which carry pollutant attributes
const EMISSION_EVENT_TYPES: [&str; 2] = ["coldEmissionEvent", "warmEmissionEvent"];

/// The pollutant attributes which are summed, in reporting order
pub const POLLUTANTS: [&str; 23] = [
    "HC",
    "CO",
    "NOx",
    "FC",
    "FC_MJ",
    "PM",
    "PN",
    "CO2_TOTAL",
    "CO2_rep",
    "NO2",
    "CH4",
    "NMHC",
    "Pb",
    "SO2",
    "N2O",
    "NH3",
    "PM_non_exhaust",
    "Benzene",
    "PM2_5",
    "BC_exhaust",
    "PM2_5_non_exhaust",
    "BC_non_exhaust",
    "CO2e",
];

/// Sums of each pollutant over all cold and warm emission events
#[derive(Debug, PartialEq)]
pub struct PollutantTotals {
    totals: IndexMap<&'static str, f64>,
    event_count: usize,
}

impl Default for PollutantTotals {
    fn default() -> Self {
        Self {
            totals: POLLUTANTS.iter().map(|pollutant| (*pollutant, 0.0)).collect(),
            event_count: 0,
        }
    }
}

impl PollutantTotals {
    /// Add the pollutants of a single event. Pollutants absent from the event are skipped.
    fn add_event(&mut self, element: &Element) -> ProcessingResult<()> {
        for (pollutant, total) in &mut self.totals {
            if element.attribute(pollutant).is_some() {
                *total += element.required_f64(pollutant)?;
            }
        }
        self.event_count += 1;

        Ok(())
    }

    /// Get the total for one pollutant
    pub fn get(&self, pollutant: &str) -> Option<f64> {
        self.totals.get(pollutant).copied()
    }

    /// Iterate over pollutants and their totals in reporting order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.totals.iter().map(|(pollutant, total)| (*pollutant, *total))
    }

    /// The number of emission events counted
    pub fn event_count(&self) -> usize {
        self.event_count
    }
}

/// Sum the pollutants over a sequence of `event` elements
pub fn sum_pollutants<I>(elements: I) -> ProcessingResult<PollutantTotals>
where
    I: IntoIterator<Item = ProcessingResult<Element>>,
{
    let mut totals = PollutantTotals::default();
    for element in elements {
        let element = element?;
        if element
            .attribute("type")
            .is_some_and(|kind| EMISSION_EVENT_TYPES.contains(&kind))
        {
            totals.add_event(&element)?;
        }
    }

    Ok(totals)
}

/// Sum the pollutants over all emission events in an event file
pub fn read_pollutant_totals(file_path: &Path) -> ProcessingResult<PollutantTotals> {
    info!("Summing pollutants in {}", file_path.display());
    let totals = sum_pollutants(read_elements(file_path, "event")?)?;
    info!("Counted {} emission event(s)", totals.event_count());

    Ok(totals)
}
