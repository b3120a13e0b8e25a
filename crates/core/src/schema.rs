//! Canonical column schema of the event table.
//!
//! Documented in the GDELT Event Codebook V2.0. The schema is a static
//! contract: every landed increment and the persisted dataset must have
//! exactly these columns, in this order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int64,
    Float64,
    Utf8,
}

impl ColumnType {
    /// Name recorded in the dataset's field metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Utf8 => "utf8",
        }
    }

    /// Inverse of [`ColumnType::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int64" => Some(ColumnType::Int64),
            "float64" => Some(ColumnType::Float64),
            "utf8" => Some(ColumnType::Utf8),
            _ => None,
        }
    }

    /// Whether `raw` reads as a value of this type. Empty fields are NULL
    /// and always conform.
    pub fn accepts(&self, raw: &str) -> bool {
        if raw.is_empty() {
            return true;
        }
        match self {
            ColumnType::Int64 => raw.trim().parse::<i64>().is_ok(),
            ColumnType::Float64 => raw.trim().parse::<f64>().is_ok(),
            ColumnType::Utf8 => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// Ordered list of named, typed columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    columns: Vec<Column>,
}

use ColumnType::{Float64 as F, Int64 as I, Utf8 as S};

const GDELT_EVENTS_V2: &[(&str, ColumnType)] = &[
    ("GLOBALEVENTID", I),
    ("SQLDATE", I),
    ("MonthYear", I),
    ("Year", I),
    ("FractionDate", F),
    ("Actor1Code", S),
    ("Actor1Name", S),
    ("Actor1CountryCode", S),
    ("Actor1KnownGroupCode", S),
    ("Actor1EthnicCode", S),
    ("Actor1Religion1Code", S),
    ("Actor1Religion2Code", S),
    ("Actor1Type1Code", S),
    ("Actor1Type2Code", S),
    ("Actor1Type3Code", S),
    ("Actor2Code", S),
    ("Actor2Name", S),
    ("Actor2CountryCode", S),
    ("Actor2KnownGroupCode", S),
    ("Actor2EthnicCode", S),
    ("Actor2Religion1Code", S),
    ("Actor2Religion2Code", S),
    ("Actor2Type1Code", S),
    ("Actor2Type2Code", S),
    ("Actor2Type3Code", S),
    ("IsRootEvent", I),
    // Event codes keep leading zeros ("0211").
    ("EventCode", S),
    ("EventBaseCode", S),
    ("EventRootCode", S),
    ("QuadClass", I),
    ("GoldsteinScale", F),
    ("NumMentions", I),
    ("NumSources", I),
    ("NumArticles", I),
    ("AvgTone", F),
    ("Actor1Geo_Type", I),
    ("Actor1Geo_FullName", S),
    ("Actor1Geo_CountryCode", S),
    ("Actor1Geo_ADM1Code", S),
    ("Actor1Geo_ADM2Code", S),
    ("Actor1Geo_Lat", F),
    ("Actor1Geo_Long", F),
    ("Actor1Geo_FeatureID", S),
    ("Actor2Geo_Type", I),
    ("Actor2Geo_FullName", S),
    ("Actor2Geo_CountryCode", S),
    ("Actor2Geo_ADM1Code", S),
    ("Actor2Geo_ADM2Code", S),
    ("Actor2Geo_Lat", F),
    ("Actor2Geo_Long", F),
    ("Actor2Geo_FeatureID", S),
    ("ActionGeo_Type", I),
    ("ActionGeo_FullName", S),
    ("ActionGeo_CountryCode", S),
    ("ActionGeo_ADM1Code", S),
    ("ActionGeo_ADM2Code", S),
    ("ActionGeo_Lat", F),
    ("ActionGeo_Long", F),
    ("ActionGeo_FeatureID", S),
    ("DATEADDED", I),
    ("SOURCEURL", S),
];

impl TableSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// The built-in GDELT 2.0 events schema (61 columns).
    pub fn gdelt_events_v2() -> Self {
        Self::new(
            GDELT_EVENTS_V2
                .iter()
                .map(|(name, column_type)| Column {
                    name: (*name).to_string(),
                    column_type: *column_type,
                })
                .collect(),
        )
    }

    /// Load column names from a text file, one name per line.
    ///
    /// Names known to the built-in schema keep their type; anything else is
    /// stored as UTF-8. Blank lines are skipped.
    pub fn from_names_file(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path)?;
        let schema = Self::from_names(text.lines());
        if schema.is_empty() {
            return Err(IngestError::Config(format!(
                "columns file {} lists no columns",
                path.display()
            )));
        }
        Ok(schema)
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let columns = names
            .into_iter()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|name| Column {
                name: name.to_string(),
                column_type: builtin_type(name).unwrap_or(ColumnType::Utf8),
            })
            .collect();
        Self::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::gdelt_events_v2()
    }
}

fn builtin_type(name: &str) -> Option<ColumnType> {
    GDELT_EVENTS_V2
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, t)| *t)
}
