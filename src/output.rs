//! The module responsible for writing output data to disk.
use crate::emission::{AggregationTable, EmissionTotals};
use crate::id::LinkID;
use crate::vehicle::VehicleCategory;
use anyhow::{Context, Result, ensure};
use log::info;
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which scenario-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "emissions_results";

/// The prefix of the workbook file name (followed by the scenario name)
const WORKBOOK_FILE_PREFIX: &str = "emissions_summary";

/// The name of the sheet summarising emissions by vehicle category and hour
pub const SUMMARY_BY_TIME_SHEET_NAME: &str = "Summary_By_Time";

/// The name of the sheet summarising emissions by vehicle category and link
pub const SUMMARY_BY_LINK_SHEET_NAME: &str = "Summary_By_LinkId";

/// The output file name for the optional CSV copy of the by-time summary
const SUMMARY_BY_TIME_FILE_NAME: &str = "summary_by_time.csv";

/// The output file name for the optional CSV copy of the by-link summary
const SUMMARY_BY_LINK_FILE_NAME: &str = "summary_by_link.csv";

/// Column headers for the by-time summary
pub const SUMMARY_BY_TIME_HEADERS: [&str; 4] = ["vehicleCategory", "Time", "Sum_FC_MJ", "Sum_CO2e"];

/// Column headers for the by-link summary
pub const SUMMARY_BY_LINK_HEADERS: [&str; 4] = ["vehicleCategory", "LinkId", "Sum_FC_MJ", "Sum_CO2e"];

/// Get the scenario name for an event file, i.e. the name of the folder containing it
pub fn get_scenario_name(event_file: &Path) -> Result<String> {
    let event_file = event_file
        .canonicalize() // canonicalise in case the user has specified a relative path
        .with_context(|| format!("Could not resolve path to {}", event_file.display()))?;

    let scenario_name = event_file
        .parent()
        .and_then(Path::file_name)
        .context("Event file cannot be in root folder")?
        .to_str()
        .context("Invalid chars in scenario dir name")?;

    Ok(scenario_name.to_string())
}

/// Get the default output folder for the given scenario
pub fn get_output_dir(scenario_name: &str) -> PathBuf {
    [OUTPUT_DIRECTORY_ROOT, scenario_name].iter().collect()
}

/// Get the file name of the workbook for the given scenario
pub fn get_workbook_file_name(scenario_name: &str) -> String {
    format!("{WORKBOOK_FILE_PREFIX}_{scenario_name}.xlsx")
}

/// Create a new output directory, if it doesn't already exist.
///
/// An existing directory which is not empty is only reused if `allow_overwrite` is true.
///
/// # Returns
///
/// Whether files in an existing directory may be overwritten.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    if let Ok(mut entries) = fs::read_dir(output_dir) {
        if entries.next().is_none() {
            // Empty folder
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Please delete the folder or pass the \
             --overwrite command-line option."
        );

        return Ok(true);
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(false)
}

/// Represents a row in the by-time summary
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct TimeSummaryRow {
    /// The vehicle category
    #[serde(rename = "vehicleCategory")]
    pub vehicle_category: VehicleCategory,
    /// The simulation hour
    #[serde(rename = "Time")]
    pub time: u32,
    /// Fuel consumption summed over all links
    #[serde(rename = "Sum_FC_MJ")]
    pub sum_fc_mj: f64,
    /// CO2-equivalent emissions summed over all links
    #[serde(rename = "Sum_CO2e")]
    pub sum_co2e: f64,
}

/// Represents a row in the by-link summary
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct LinkSummaryRow {
    /// The vehicle category
    #[serde(rename = "vehicleCategory")]
    pub vehicle_category: VehicleCategory,
    /// The link ID
    #[serde(rename = "LinkId")]
    pub link_id: LinkID,
    /// Fuel consumption summed over all hours
    #[serde(rename = "Sum_FC_MJ")]
    pub sum_fc_mj: f64,
    /// CO2-equivalent emissions summed over all hours
    #[serde(rename = "Sum_CO2e")]
    pub sum_co2e: f64,
}

/// The two summary views of an [`AggregationTable`].
///
/// Both are re-summed from the per-link leaves of the same table, so they always agree with it.
/// Rows are sorted by category, then by hour or link ID.
#[derive(Debug, PartialEq)]
pub struct EmissionsReport {
    /// Totals by vehicle category and hour
    pub by_time: Vec<TimeSummaryRow>,
    /// Totals by vehicle category and link
    pub by_link: Vec<LinkSummaryRow>,
}

impl EmissionsReport {
    /// Derive both views from the table
    pub fn from_table(table: &AggregationTable) -> Self {
        Self {
            by_time: summarise_by_time(table),
            by_link: summarise_by_link(table),
        }
    }

    /// Write both views to an Excel workbook, as two sheets
    pub fn write_workbook(&self, file_path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        self.fill_workbook(&mut workbook)
            .context("Failed to build workbook")?;
        workbook
            .save(file_path)
            .with_context(|| format!("Failed to write {}", file_path.display()))?;
        info!("Wrote summary workbook to {}", file_path.display());

        Ok(())
    }

    /// Add the summary sheets to the workbook
    fn fill_workbook(&self, workbook: &mut Workbook) -> Result<(), XlsxError> {
        let sheet = workbook
            .add_worksheet()
            .set_name(SUMMARY_BY_TIME_SHEET_NAME)?;
        write_header(sheet, &SUMMARY_BY_TIME_HEADERS)?;
        for (row_num, row) in (1..).zip(&self.by_time) {
            sheet.write_string(row_num, 0, row.vehicle_category.to_string())?;
            sheet.write_number(row_num, 1, row.time)?;
            sheet.write_number(row_num, 2, row.sum_fc_mj)?;
            sheet.write_number(row_num, 3, row.sum_co2e)?;
        }

        let sheet = workbook
            .add_worksheet()
            .set_name(SUMMARY_BY_LINK_SHEET_NAME)?;
        write_header(sheet, &SUMMARY_BY_LINK_HEADERS)?;
        for (row_num, row) in (1..).zip(&self.by_link) {
            sheet.write_string(row_num, 0, row.vehicle_category.to_string())?;
            sheet.write_string(row_num, 1, row.link_id.as_str())?;
            sheet.write_number(row_num, 2, row.sum_fc_mj)?;
            sheet.write_number(row_num, 3, row.sum_co2e)?;
        }

        Ok(())
    }

    /// Write both views to CSV files in the given folder
    pub fn write_csv(&self, output_dir: &Path) -> Result<()> {
        write_csv_rows(&output_dir.join(SUMMARY_BY_TIME_FILE_NAME), &self.by_time)?;
        write_csv_rows(&output_dir.join(SUMMARY_BY_LINK_FILE_NAME), &self.by_link)?;

        Ok(())
    }
}

/// Write a header row to the top of a worksheet
fn write_header(sheet: &mut Worksheet, headers: &[&str]) -> Result<(), XlsxError> {
    for (col_num, header) in (0..).zip(headers) {
        sheet.write_string(0, col_num, *header)?;
    }

    Ok(())
}

/// Serialise rows to a CSV file
fn write_csv_rows<T: Serialize>(file_path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Failed to create {}", file_path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {}", file_path.display());

    Ok(())
}

/// Sum the table's totals over links, for each vehicle category and hour
pub fn summarise_by_time(table: &AggregationTable) -> Vec<TimeSummaryRow> {
    let mut sums: BTreeMap<(VehicleCategory, u32), EmissionTotals> = BTreeMap::new();
    for (key, totals) in table.iter() {
        *sums.entry((key.category, key.hour)).or_default() += *totals;
    }

    sums.into_iter()
        .map(|((vehicle_category, time), totals)| TimeSummaryRow {
            vehicle_category,
            time,
            sum_fc_mj: totals.fc_mj,
            sum_co2e: totals.co2e,
        })
        .collect()
}

/// Sum the table's totals over hours, for each vehicle category and link
pub fn summarise_by_link(table: &AggregationTable) -> Vec<LinkSummaryRow> {
    let mut sums: BTreeMap<(VehicleCategory, &LinkID), EmissionTotals> = BTreeMap::new();
    for (key, totals) in table.iter() {
        *sums.entry((key.category, &key.link_id)).or_default() += *totals;
    }

    sums.into_iter()
        .map(|((vehicle_category, link_id), totals)| LinkSummaryRow {
            vehicle_category,
            link_id: link_id.clone(),
            sum_fc_mj: totals.fc_mj,
            sum_co2e: totals.co2e,
        })
        .collect()
}

/// Write the two summary views of a table to an Excel workbook
pub fn export(table: &AggregationTable, output_path: &Path) -> Result<()> {
    EmissionsReport::from_table(table).write_workbook(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::table;
    use calamine::{Data, Reader, Xlsx, open_workbook};
    use float_cmp::assert_approx_eq;
    use itertools::{Itertools, assert_equal};
    use rstest::rstest;
    use std::fs::File;
    use std::io::{BufRead, BufReader};
    use tempfile::tempdir;

    #[rstest]
    fn test_summarise_by_time(table: AggregationTable) {
        let expected = [
            TimeSummaryRow {
                vehicle_category: VehicleCategory::Car,
                time: 0,
                sum_fc_mj: 10.0,
                sum_co2e: 1.0,
            },
            TimeSummaryRow {
                vehicle_category: VehicleCategory::Car,
                time: 1,
                sum_fc_mj: 5.0,
                sum_co2e: 0.5,
            },
        ];
        assert_equal(summarise_by_time(&table), expected);
    }

    #[rstest]
    fn test_summarise_by_link(table: AggregationTable) {
        let expected = LinkSummaryRow {
            vehicle_category: VehicleCategory::Car,
            link_id: "L1".into(),
            sum_fc_mj: 15.0,
            sum_co2e: 1.5,
        };
        assert_equal(summarise_by_link(&table), [expected]);
    }

    #[test]
    fn test_summaries_consistent_with_table() {
        let mut table = AggregationTable::new();
        let categories = [
            VehicleCategory::Car,
            VehicleCategory::PublicTransport,
            VehicleCategory::Unknown,
        ];
        for (i, (category, hour, link)) in categories
            .into_iter()
            .cartesian_product(0..30)
            .cartesian_product(["A", "B", "C"])
            .map(|((category, hour), link)| (category, hour, link))
            .enumerate()
        {
            #[allow(clippy::cast_precision_loss)]
            let value = (i % 7) as f64 * 0.25;
            table.add(category, hour, link, EmissionTotals::new(value, value * 2.0));
        }

        let report = EmissionsReport::from_table(&table);
        assert_eq!(report.by_time.len(), 3 * 30);
        assert_eq!(report.by_link.len(), 3 * 3);

        let total = table.total();
        let time_fc_mj: f64 = report.by_time.iter().map(|row| row.sum_fc_mj).sum();
        let link_co2e: f64 = report.by_link.iter().map(|row| row.sum_co2e).sum();
        assert_approx_eq!(f64, time_fc_mj, total.fc_mj, epsilon = 1e-9);
        assert_approx_eq!(f64, link_co2e, total.co2e, epsilon = 1e-9);

        // Each key appears exactly once
        assert!(
            report
                .by_link
                .iter()
                .map(|row| (row.vehicle_category, &row.link_id))
                .all_unique()
        );
    }

    #[test]
    fn test_summaries_empty_table() {
        let report = EmissionsReport::from_table(&AggregationTable::new());
        assert!(report.by_time.is_empty());
        assert!(report.by_link.is_empty());
    }

    #[rstest]
    fn test_write_csv(table: AggregationTable) {
        let dir = tempdir().unwrap();
        let report = EmissionsReport::from_table(&table);
        report.write_csv(dir.path()).unwrap();

        // Read back and compare
        let records: Vec<TimeSummaryRow> =
            csv::Reader::from_path(dir.path().join(SUMMARY_BY_TIME_FILE_NAME))
                .unwrap()
                .into_deserialize()
                .try_collect()
                .unwrap();
        assert_eq!(records, report.by_time);
        let records: Vec<LinkSummaryRow> =
            csv::Reader::from_path(dir.path().join(SUMMARY_BY_LINK_FILE_NAME))
                .unwrap()
                .into_deserialize()
                .try_collect()
                .unwrap();
        assert_eq!(records, report.by_link);

        // Headers should match those used in the workbook
        for (file_name, headers) in [
            (SUMMARY_BY_TIME_FILE_NAME, SUMMARY_BY_TIME_HEADERS),
            (SUMMARY_BY_LINK_FILE_NAME, SUMMARY_BY_LINK_HEADERS),
        ] {
            let file = File::open(dir.path().join(file_name)).unwrap();
            let header = BufReader::new(file).lines().next().unwrap().unwrap();
            assert_eq!(header, headers.join(","));
        }
    }

    /// A row of string cells
    fn string_cells(values: &[&str]) -> Vec<Data> {
        values.iter().map(|value| Data::String((*value).into())).collect()
    }

    #[rstest]
    fn test_fill_workbook_sheets(table: AggregationTable) {
        let mut workbook = Workbook::new();
        EmissionsReport::from_table(&table)
            .fill_workbook(&mut workbook)
            .unwrap();
        assert!(workbook.worksheet_from_name(SUMMARY_BY_TIME_SHEET_NAME).is_ok());
        assert!(workbook.worksheet_from_name(SUMMARY_BY_LINK_SHEET_NAME).is_ok());
    }

    #[rstest]
    fn test_export(table: AggregationTable) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("summary.xlsx");
        export(&table, &file_path).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&file_path).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            [SUMMARY_BY_TIME_SHEET_NAME, SUMMARY_BY_LINK_SHEET_NAME]
        );

        let by_time: Vec<Vec<Data>> = workbook
            .worksheet_range(SUMMARY_BY_TIME_SHEET_NAME)
            .unwrap()
            .rows()
            .map(<[Data]>::to_vec)
            .collect();
        assert_eq!(
            by_time,
            [
                string_cells(&SUMMARY_BY_TIME_HEADERS),
                vec![
                    Data::String("car".into()),
                    Data::Float(0.0),
                    Data::Float(10.0),
                    Data::Float(1.0)
                ],
                vec![
                    Data::String("car".into()),
                    Data::Float(1.0),
                    Data::Float(5.0),
                    Data::Float(0.5)
                ],
            ]
        );

        let by_link: Vec<Vec<Data>> = workbook
            .worksheet_range(SUMMARY_BY_LINK_SHEET_NAME)
            .unwrap()
            .rows()
            .map(<[Data]>::to_vec)
            .collect();
        assert_eq!(
            by_link,
            [
                string_cells(&SUMMARY_BY_LINK_HEADERS),
                vec![
                    Data::String("car".into()),
                    Data::String("L1".into()),
                    Data::Float(15.0),
                    Data::Float(1.5)
                ],
            ]
        );
    }

    #[rstest]
    fn test_export_unwritable(table: AggregationTable) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("missing").join("summary.xlsx");
        assert!(export(&table, &file_path).is_err());
    }

    #[test]
    fn test_create_output_directory() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("results").join("scenario");

        // New folder
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());

        // Existing empty folder
        assert!(!create_output_directory(&output_dir, false).unwrap());

        // Existing non-empty folder
        fs::write(output_dir.join("file.txt"), "").unwrap();
        assert!(create_output_directory(&output_dir, false).is_err());
        assert!(create_output_directory(&output_dir, true).unwrap());
    }

    #[test]
    fn test_scenario_name_and_paths() {
        let dir = tempdir().unwrap();
        let scenario_dir = dir.path().join("micro000-iter0");
        fs::create_dir(&scenario_dir).unwrap();
        let event_file = scenario_dir.join("output_event_emission.xml.gz");
        fs::write(&event_file, "").unwrap();

        let scenario_name = get_scenario_name(&event_file).unwrap();
        assert_eq!(scenario_name, "micro000-iter0");
        assert_eq!(
            get_output_dir(&scenario_name),
            Path::new("emissions_results").join("micro000-iter0")
        );
        assert_eq!(
            get_workbook_file_name(&scenario_name),
            "emissions_summary_micro000-iter0.xlsx"
        );

        // Event file doesn't exist
        assert!(get_scenario_name(&scenario_dir.join("missing.xml.gz")).is_err());
    }
}
