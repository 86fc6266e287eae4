//! Vehicle categories and the registry mapping vehicle IDs to their raw types.
use crate::error::ProcessingResult;
use crate::id::VehicleID;
use crate::input::{Element, read_elements, read_toml};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// The local name of the elements in a vehicle file which define vehicles
const VEHICLE_ELEMENT_NAME: &str = "vehicle";

/// The raw type assumed for vehicles which are absent from the registry
pub const UNKNOWN_VEHICLE_TYPE: &str = "unknown";

/// Coarse grouping of vehicle types used when reporting emissions
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum VehicleCategory {
    /// Private cars (including ride-hailing)
    #[strum(serialize = "car")]
    #[serde(rename = "car")]
    Car,
    /// Heavy goods vehicles
    #[strum(serialize = "HGV")]
    #[serde(rename = "HGV")]
    HeavyGoodsVehicle,
    /// Light commercial vehicles
    #[strum(serialize = "LCV")]
    #[serde(rename = "LCV")]
    LightCommercialVehicle,
    /// Microcars
    #[strum(serialize = "microcar")]
    #[serde(rename = "microcar")]
    Microcar,
    /// Public transport
    #[strum(serialize = "pt")]
    #[serde(rename = "pt")]
    PublicTransport,
    /// Anything which doesn't match a known vehicle type
    #[strum(serialize = "unknown")]
    #[serde(rename = "unknown")]
    Unknown,
}

/// The default assignment of raw vehicle types to categories.
///
/// Raw types which do not appear here are categorised as [`VehicleCategory::Unknown`].
pub const DEFAULT_CLASSIFICATION: &[(VehicleCategory, &[&str])] = &[
    (VehicleCategory::Car, &["car", "ride", "vwCaddy", "golf1.4"]),
    (
        VehicleCategory::HeavyGoodsVehicle,
        &["heavy40t", "medium18t", "freight", "truck"],
    ),
    (
        VehicleCategory::LightCommercialVehicle,
        &["mercedes313", "light8t"],
    ),
    (VehicleCategory::Microcar, &["microcar"]),
    (
        VehicleCategory::PublicTransport,
        &[
            "Tram_veh_type",
            "Ferry_veh_type",
            "Bus_veh_type",
            "RE_RB_veh_type",
            "S-Bahn_veh_type",
            "U-Bahn_veh_type",
        ],
    ),
];

/// Assigns raw vehicle types to [`VehicleCategory`]s.
///
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    categories: HashMap<String, VehicleCategory>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_groups(
            DEFAULT_CLASSIFICATION
                .iter()
                .map(|(category, types)| (*category, types.iter().copied())),
        )
        .expect("Default classification table is invalid")
    }
}

impl Classifier {
    /// Create a [`Classifier`] from groups of raw types belonging to each category.
    ///
    /// It is an error for one raw type to be assigned to more than one category.
    pub fn from_groups<I, T, S>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (VehicleCategory, T)>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut categories = HashMap::new();
        for (category, raw_types) in groups {
            for raw_type in raw_types {
                let raw_type = raw_type.as_ref();
                let existing = categories.insert(raw_type.to_string(), category);
                ensure!(
                    existing.is_none_or(|existing| existing == category),
                    "Vehicle type {raw_type} is assigned to more than one category"
                );
            }
        }

        Ok(Self { categories })
    }

    /// Read a classification table from a TOML file.
    ///
    /// The file maps category names to lists of raw types, e.g.:
    ///
    /// ```toml
    /// car = ["car", "ride"]
    /// microcar = ["microcar"]
    /// ```
    pub fn from_path(file_path: &Path) -> Result<Self> {
        let groups: IndexMap<String, Vec<String>> = read_toml(file_path)?;
        let groups: Vec<_> = groups
            .into_iter()
            .map(|(name, raw_types)| -> Result<_> {
                let category = VehicleCategory::from_str(&name).with_context(|| {
                    format!(
                        "Unknown vehicle category {name} in {}",
                        file_path.display()
                    )
                })?;
                Ok((category, raw_types))
            })
            .try_collect()?;

        Self::from_groups(groups)
    }

    /// Get the category for the given raw vehicle type
    pub fn classify(&self, raw_type: &str) -> VehicleCategory {
        self.categories
            .get(raw_type)
            .copied()
            .unwrap_or(VehicleCategory::Unknown)
    }

    /// Iterate over categories along with the raw types assigned to them, in category order
    pub fn iter_groups(&self) -> impl Iterator<Item = (VehicleCategory, Vec<&str>)> {
        VehicleCategory::iter().map(|category| {
            let mut raw_types = self
                .categories
                .iter()
                .filter(|(_, c)| **c == category)
                .map(|(raw_type, _)| raw_type.as_str())
                .collect::<Vec<_>>();
            raw_types.sort_unstable();
            (category, raw_types)
        })
    }
}

/// A mapping from vehicle ID to the vehicle's raw type.
///
/// Raw type strings are shared between vehicles, as there are typically few types but many
/// vehicles.
#[derive(Debug, Default, PartialEq)]
pub struct VehicleRegistry {
    vehicles: HashMap<VehicleID, Rc<str>>,
    types: HashSet<Rc<str>>,
}

impl VehicleRegistry {
    /// Create a new, empty [`VehicleRegistry`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vehicle, replacing the type of any existing vehicle with the same ID
    pub fn insert(&mut self, id: &str, raw_type: &str) {
        let raw_type = if let Some(raw_type) = self.types.get(raw_type) {
            Rc::clone(raw_type)
        } else {
            let raw_type: Rc<str> = Rc::from(raw_type);
            self.types.insert(Rc::clone(&raw_type));
            raw_type
        };

        self.vehicles.insert(id.into(), raw_type);
    }

    /// Get the raw type of the given vehicle, if it is known
    pub fn get(&self, id: &str) -> Option<&str> {
        self.vehicles.get(id).map(|raw_type| &**raw_type)
    }

    /// Get the raw type of the given vehicle, falling back to [`UNKNOWN_VEHICLE_TYPE`]
    pub fn get_or_unknown(&self, id: &str) -> &str {
        self.get(id).unwrap_or(UNKNOWN_VEHICLE_TYPE)
    }

    /// The number of vehicles in the registry
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Count the number of vehicles of each raw type, sorted by raw type
    pub fn type_counts(&self) -> IndexMap<&str, usize> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for raw_type in self.vehicles.values() {
            *counts.entry(&**raw_type).or_default() += 1;
        }
        counts.sort_unstable_keys();

        counts
    }
}

/// Build a [`VehicleRegistry`] from a sequence of `vehicle` elements.
///
/// Elements without both an `id` and a `type` attribute are skipped. Where the same ID occurs more
/// than once, the last occurrence wins.
pub fn read_vehicles<I>(elements: I) -> ProcessingResult<VehicleRegistry>
where
    I: IntoIterator<Item = ProcessingResult<Element>>,
{
    let mut registry = VehicleRegistry::new();
    let mut skipped = 0usize;
    for element in elements {
        let element = element?;
        let (Some(id), Some(raw_type)) = (element.attribute("id"), element.attribute("type"))
        else {
            skipped += 1;
            continue;
        };

        registry.insert(id, raw_type);
    }

    if skipped > 0 {
        debug!("Skipped {skipped} vehicle element(s) without an id or type");
    }

    Ok(registry)
}

/// Load the vehicle registry from a (usually gzip-compressed) vehicle XML file.
///
/// The file is streamed, so memory use is bounded by the size of the resulting registry.
pub fn load_vehicle_registry(file_path: &Path) -> ProcessingResult<VehicleRegistry> {
    info!("Reading vehicles from {}", file_path.display());
    let registry = read_vehicles(read_elements(file_path, VEHICLE_ELEMENT_NAME)?)?;
    info!(
        "Loaded {} vehicle(s) of {} type(s)",
        registry.len(),
        registry.types.len()
    );

    Ok(registry)
}
