// src/process/table.rs

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{fs::File, io::Cursor, io::Read, path::Path};
use tracing::debug;
use zip::ZipArchive;

use crate::process::ProcessError;

/// Entries whose names carry these markers are auxiliary legends and notes
/// shipped alongside the data table, never the table itself.
const AUX_MARKERS: &[&str] = &[
    "Flags",
    "Symboles",
    "ItemCode",
    "AreaCode",
    "Element",
    "Releases",
    "Sources",
    "Indicators",
    "Purposes",
];

/// Recognized names for the entity column, in resolution order.
const ENTITY_COLUMNS: &[&str] = &["Area Code", "Country Code", "CountryCode"];

/// A single observation, projected out of the source table's columns.
#[derive(Debug, Clone)]
pub struct ObsRow {
    pub geo: String,
    pub year: i32,
    pub item_code: String,
    pub item_name: String,
    pub element_code: Option<String>,
    pub element_name: Option<String>,
    /// Raw value text; empty cells become `None`.
    pub value: Option<String>,
    pub unit: String,
    /// `None` means official data, the best quality grade.
    pub flag: Option<String>,
}

/// A source table normalized to one schema, whatever the export called its
/// columns. Downstream stages never see the original column names.
#[derive(Debug)]
pub struct DataTable {
    pub has_element: bool,
    pub rows: Vec<ObsRow>,
}

/// Pick the single data-table entry out of an archive's entry list by
/// excluding every known auxiliary name. Zero or multiple survivors mean
/// either a malformed archive or a new auxiliary naming convention we have
/// not seen yet; both are structure errors.
pub fn find_data_entry(names: &[String]) -> Result<String, ProcessError> {
    let candidates: Vec<&String> = names
        .iter()
        .filter(|n| !AUX_MARKERS.iter().any(|m| n.contains(m)))
        .collect();

    match candidates.as_slice() {
        [one] => Ok((*one).clone()),
        [] => Err(ProcessError::Structure(format!(
            "no data table candidate among {:?}",
            names
        ))),
        many => Err(ProcessError::Structure(format!(
            "expected one data table, found {:?}",
            many
        ))),
    }
}

/// The exports are latin-1 encoded; every byte maps to the code point of
/// the same value. A leading UTF-8 BOM is dropped if present.
fn decode_latin1(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    bytes.iter().map(|&b| b as char).collect()
}

struct ColumnMap {
    geo: usize,
    year: usize,
    value: usize,
    unit: usize,
    flag: usize,
    item_code: usize,
    item_name: usize,
    element: Option<(usize, usize)>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self, ProcessError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| ProcessError::Structure(format!("missing column {:?}", name)))
        };

        let geo = ENTITY_COLUMNS
            .iter()
            .find_map(|c| find(c))
            .ok_or_else(|| {
                ProcessError::Structure(format!(
                    "no entity column; expected one of {:?}",
                    ENTITY_COLUMNS
                ))
            })?;

        let element = match (find("Element Code"), find("Element")) {
            (Some(code), Some(name)) => Some((code, name)),
            _ => None,
        };

        Ok(ColumnMap {
            geo,
            year: require("Year")?,
            value: require("Value")?,
            unit: require("Unit")?,
            flag: require("Flag")?,
            item_code: require("Item Code")?,
            item_name: require("Item")?,
            element,
        })
    }
}

/// Open `zip_path`, locate the data table, and parse it into a normalized
/// `DataTable`. Column layout is resolved once, up front; a year that fails
/// integer coercion fails the whole archive.
pub fn load_data_table<P: AsRef<Path>>(zip_path: P) -> Result<DataTable> {
    let file = File::open(&zip_path)
        .with_context(|| format!("opening {}", zip_path.as_ref().display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("reading archive {}", zip_path.as_ref().display()))?;

    let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
    let data_name = find_data_entry(&names)?;
    debug!(entry = %data_name, "data table located");

    let mut entry = archive
        .by_name(&data_name)
        .with_context(|| format!("extracting {}", data_name))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .with_context(|| format!("reading {} into memory", data_name))?;
    drop(entry);

    parse_table(&decode_latin1(&buf)).with_context(|| format!("parsing {}", data_name))
}

fn parse_table(text: &str) -> Result<DataTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(text.as_bytes()));

    let headers: Vec<String> = rdr
        .headers()
        .context("reading header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let cols = ColumnMap::resolve(&headers)?;

    let get = |record: &csv::StringRecord, idx: usize| {
        record.get(idx).unwrap_or("").trim().to_string()
    };
    let get_opt = |record: &csv::StringRecord, idx: usize| {
        let s = get(record, idx);
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    };

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        let year_text = get(&record, cols.year);
        let year: i32 = year_text.parse().map_err(|_| {
            ProcessError::Structure(format!(
                "year {:?} at record {} is not an integer",
                year_text, idx
            ))
        })?;

        rows.push(ObsRow {
            geo: get(&record, cols.geo),
            year,
            item_code: get(&record, cols.item_code),
            item_name: get(&record, cols.item_name),
            element_code: cols.element.map(|(code, _)| get(&record, code)),
            element_name: cols.element.map(|(_, name)| get(&record, name)),
            value: get_opt(&record, cols.value),
            unit: get(&record, cols.unit),
            flag: get_opt(&record, cols.flag),
        });
    }

    Ok(DataTable {
        has_element: cols.element.is_some(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolver_excludes_auxiliary_entries() {
        let entries = names(&[
            "Production_Crops_E_All_Data_(Normalized).csv",
            "Production_Crops_E_Flags.csv",
            "Production_Crops_E_Symboles.csv",
            "Production_Crops_E_ItemCodes.csv",
            "Production_Crops_E_AreaCodes.csv",
            "Production_Crops_E_Elements.csv",
        ]);
        assert_eq!(
            find_data_entry(&entries).unwrap(),
            "Production_Crops_E_All_Data_(Normalized).csv"
        );
    }

    #[test]
    fn resolver_fails_on_no_candidate() {
        let entries = names(&["X_Flags.csv", "X_Sources.csv"]);
        assert!(matches!(
            find_data_entry(&entries),
            Err(ProcessError::Structure(_))
        ));
    }

    #[test]
    fn resolver_fails_on_multiple_candidates() {
        let entries = names(&["A_All_Data.csv", "B_All_Data.csv"]);
        assert!(matches!(
            find_data_entry(&entries),
            Err(ProcessError::Structure(_))
        ));
    }

    #[test]
    fn parses_table_with_element_columns() {
        let csv = "\
Area Code,Area,Item Code,Item,Element Code,Element,Year,Unit,Value,Flag
4,Algeria,221,Almonds,5312,Area harvested,2010,ha,21400,
4,Algeria,221,Almonds,5312,Area harvested,2011,ha,21500,E
";
        let table = parse_table(csv).unwrap();
        assert!(table.has_element);
        assert_eq!(table.rows.len(), 2);
        let first = &table.rows[0];
        assert_eq!(first.geo, "4");
        assert_eq!(first.year, 2010);
        assert_eq!(first.element_name.as_deref(), Some("Area harvested"));
        assert_eq!(first.value.as_deref(), Some("21400"));
        assert_eq!(first.flag, None);
        assert_eq!(table.rows[1].flag.as_deref(), Some("E"));
    }

    #[test]
    fn resolves_alternate_entity_column() {
        let csv = "\
Country Code,Country,Item Code,Item,Year,Unit,Value,Flag
100,Somewhere,1,Thing,1999,t,5,
";
        let table = parse_table(csv).unwrap();
        assert!(!table.has_element);
        assert_eq!(table.rows[0].geo, "100");
        assert_eq!(table.rows[0].element_code, None);
    }

    #[test]
    fn missing_required_column_is_a_structure_error() {
        let csv = "Area Code,Item Code,Item,Year,Value,Flag\n4,1,Thing,2000,1,\n";
        let err = parse_table(csv).unwrap_err();
        assert!(err.downcast_ref::<ProcessError>().is_some());
    }

    #[test]
    fn bad_year_fails_the_table() {
        let csv = "\
Area Code,Area,Item Code,Item,Year,Unit,Value,Flag
4,Algeria,221,Almonds,2010-2012,ha,21400,
";
        assert!(parse_table(csv).is_err());
    }

    #[test]
    fn latin1_bytes_decode() {
        let bytes: Vec<u8> = vec![0x43, 0xF4, 0x74, 0x65]; // "Côte"
        assert_eq!(decode_latin1(&bytes), "Côte");
    }
}
