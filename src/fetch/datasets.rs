// src/fetch/datasets.rs

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const METADATA_URL: &str = "https://bulks-faostat.fao.org/production/datasets_E.json";
const METADATA_FILE: &str = "datasets_E.json";

/// Archives shipped in the bulk listing but missing from the metadata, with
/// their hand-assigned dataset codes.
static MANUAL_TAGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "Emissions_Agriculture_Waste_Disposal_E_All_Data_(Normalized).zip",
            "GMEA",
        ),
        (
            "Environment_Transport_E_All_Data_(Normalized).zip",
            "GMET",
        ),
        (
            "SDG_BulkDownloads_E_All_Data_(Normalized).zip",
            "GMSB",
        ),
    ])
});

#[derive(Debug, Deserialize)]
pub struct Dataset {
    #[serde(rename = "DatasetCode")]
    pub code: String,
    #[serde(rename = "DatasetName")]
    pub name: String,
    #[serde(rename = "FileLocation")]
    pub file_location: String,
    #[serde(rename = "FileSize", default)]
    pub file_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetList {
    #[serde(rename = "Dataset")]
    dataset: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(rename = "Datasets")]
    datasets: DatasetList,
}

impl Dataset {
    /// The archive filename is the last segment of the download URL.
    pub fn file_name(&self) -> &str {
        self.file_location
            .rsplit('/')
            .next()
            .unwrap_or(&self.file_location)
    }
}

/// The metadata file is latin-1, not UTF-8.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_metadata(text: &str) -> Result<Vec<Dataset>> {
    let md: Metadata = serde_json::from_str(text).context("decoding dataset metadata")?;
    Ok(md.datasets.dataset)
}

/// Load the dataset metadata, fetching it once and caching under
/// `source_dir` so later runs work offline.
pub async fn load_metadata(client: &Client, source_dir: &Path) -> Result<Vec<Dataset>> {
    let cached = source_dir.join(METADATA_FILE);
    let text = if cached.is_file() {
        debug!(path = %cached.display(), "using cached dataset metadata");
        decode_latin1(&fs::read(&cached).with_context(|| format!("reading {}", cached.display()))?)
    } else {
        let bytes = client
            .get(METADATA_URL)
            .send()
            .await
            .context("fetching dataset metadata")?
            .error_for_status()?
            .bytes()
            .await
            .context("reading dataset metadata body")?;
        fs::write(&cached, &bytes).with_context(|| format!("caching {}", cached.display()))?;
        decode_latin1(&bytes)
    };

    let datasets = parse_metadata(&text)?;
    info!(count = datasets.len(), "dataset metadata loaded");
    Ok(datasets)
}

/// Archive filename → dataset code. The dataset code doubles as the domain
/// tag prefixed onto every concept id derived from that archive.
#[derive(Debug)]
pub struct DomainTags {
    map: HashMap<String, String>,
}

impl DomainTags {
    pub fn from_datasets(datasets: &[Dataset]) -> Self {
        let mut map: HashMap<String, String> = datasets
            .iter()
            .map(|d| (d.file_name().to_string(), d.code.clone()))
            .collect();
        for (file, code) in MANUAL_TAGS.iter() {
            map.insert(file.to_string(), code.to_string());
        }
        DomainTags { map }
    }

    pub fn get(&self, file_name: &str) -> Option<&str> {
        self.map.get(file_name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "Datasets": {
        "Dataset": [
          {
            "DatasetCode": "QCL",
            "DatasetName": "Crops and livestock products",
            "FileSize": "35MB",
            "FileLocation": "https://bulks-faostat.fao.org/production/Production_Crops_Livestock_E_All_Data_(Normalized).zip"
          },
          {
            "DatasetCode": "RL",
            "DatasetName": "Land Use",
            "FileSize": "2MB",
            "FileLocation": "https://bulks-faostat.fao.org/production/Inputs_LandUse_E_All_Data_(Normalized).zip"
          }
        ]
      }
    }"#;

    #[test]
    fn metadata_parses_and_names_resolve() {
        let datasets = parse_metadata(SAMPLE).unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].code, "QCL");
        assert_eq!(
            datasets[0].file_name(),
            "Production_Crops_Livestock_E_All_Data_(Normalized).zip"
        );
    }

    #[test]
    fn tags_map_filenames_to_codes() {
        let datasets = parse_metadata(SAMPLE).unwrap();
        let tags = DomainTags::from_datasets(&datasets);
        assert_eq!(
            tags.get("Inputs_LandUse_E_All_Data_(Normalized).zip"),
            Some("RL")
        );
        assert_eq!(tags.get("Unknown_Export.zip"), None);
    }

    #[test]
    fn manual_overrides_cover_files_missing_from_metadata() {
        let tags = DomainTags::from_datasets(&[]);
        assert_eq!(
            tags.get("Environment_Transport_E_All_Data_(Normalized).zip"),
            Some("GMET")
        );
    }
}
