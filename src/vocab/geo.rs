// src/vocab/geo.rs

use anyhow::{Context, Result};
use csv::WriterBuilder;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info};

const AREA_URL: &str = "https://faostatservices.fao.org/api/v1/en/definitions/types/area";
const GROUP_URL: &str = "https://faostatservices.fao.org/api/v1/en/definitions/types/areagroup";

#[derive(Debug, Deserialize)]
pub struct AreaDef {
    #[serde(rename = "Country Code")]
    pub code: String,
    #[serde(rename = "Country")]
    pub name: String,
    #[serde(rename = "Start Year", default)]
    pub start_year: Option<String>,
    #[serde(rename = "End Year", default)]
    pub end_year: Option<String>,
    #[serde(rename = "ISO2 Code", default)]
    pub iso2_code: Option<String>,
    #[serde(rename = "ISO3 Code", default)]
    pub iso3_code: Option<String>,
    #[serde(rename = "M49 Code", default)]
    pub m49_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AreaGroupDef {
    #[serde(rename = "Country Group Code")]
    pub group_code: String,
    #[serde(rename = "Country Code")]
    pub country_code: String,
}

#[derive(Debug, Deserialize)]
struct Definitions<T> {
    data: Vec<T>,
}

/// One row of `ddf--entities--geo.csv`.
#[derive(Debug)]
pub struct GeoEntity {
    pub geo: String,
    pub name: String,
    pub start_year: String,
    pub end_year: String,
    pub iso2_code: String,
    pub iso3_code: String,
    pub m49_code: String,
    pub is_country: bool,
    pub is_country_group: bool,
    pub country_groups: String,
}

/// The authoritative set of valid entity codes. Rows outside it never reach
/// the uniqueness or unit checks.
#[derive(Debug, Clone)]
pub struct GeoDomain {
    codes: HashSet<String>,
}

impl GeoDomain {
    pub fn from_codes<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        GeoDomain {
            codes: codes.into_iter().collect(),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Fetch the area and area-group definitions. Failure is fatal to the run;
/// the geo filter cannot work without them.
pub async fn fetch_definitions(client: &Client) -> Result<(Vec<AreaDef>, Vec<AreaGroupDef>)> {
    let areas: Definitions<AreaDef> = client
        .get(AREA_URL)
        .send()
        .await
        .context("fetching area definitions")?
        .error_for_status()?
        .json()
        .await
        .context("decoding area definitions")?;

    let groups: Definitions<AreaGroupDef> = client
        .get(GROUP_URL)
        .send()
        .await
        .context("fetching area group definitions")?
        .error_for_status()?
        .json()
        .await
        .context("decoding area group definitions")?;

    info!(
        areas = areas.data.len(),
        memberships = groups.data.len(),
        "geo definitions fetched"
    );
    Ok((areas.data, groups.data))
}

/// Enrich areas with group membership: an area appearing as a member in the
/// group listing is a country, one appearing as a group code is a country
/// group, and `country_groups` collects the sorted distinct group codes a
/// country belongs to. Duplicate area rows keep their first occurrence.
pub fn build_entities(areas: &[AreaDef], groups: &[AreaGroupDef]) -> Vec<GeoEntity> {
    let member_codes: HashSet<&str> = groups.iter().map(|g| g.country_code.as_str()).collect();
    let group_codes: HashSet<&str> = groups.iter().map(|g| g.group_code.as_str()).collect();

    let mut memberships: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for g in groups {
        memberships
            .entry(g.country_code.as_str())
            .or_default()
            .insert(g.group_code.as_str());
    }

    let mut seen = HashSet::new();
    let mut entities = Vec::with_capacity(areas.len());
    for area in areas {
        if !seen.insert(area.code.as_str()) {
            debug!(geo = %area.code, "duplicate area definition dropped");
            continue;
        }
        let country_groups = memberships
            .get(area.code.as_str())
            .map(|set| set.iter().copied().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        entities.push(GeoEntity {
            geo: area.code.clone(),
            name: area.name.clone(),
            start_year: area.start_year.clone().unwrap_or_default(),
            end_year: area.end_year.clone().unwrap_or_default(),
            iso2_code: area.iso2_code.clone().unwrap_or_default(),
            iso3_code: area.iso3_code.clone().unwrap_or_default(),
            m49_code: area.m49_code.clone().unwrap_or_default(),
            is_country: member_codes.contains(area.code.as_str()),
            is_country_group: group_codes.contains(area.code.as_str()),
            country_groups,
        });
    }
    entities
}

/// Write `ddf--entities--geo.csv` and return the geo domain for the run.
pub fn write_entities(entities: &[GeoEntity], out_dir: &Path) -> Result<GeoDomain> {
    let path = out_dir.join("ddf--entities--geo.csv");
    let mut wtr = WriterBuilder::new()
        .from_path(&path)
        .with_context(|| format!("creating {}", path.display()))?;

    wtr.write_record([
        "geo",
        "name",
        "start_year",
        "end_year",
        "iso2_code",
        "iso3_code",
        "m49_code",
        "is--country",
        "is--country_group",
        "country_groups",
    ])?;
    for e in entities {
        wtr.write_record([
            e.geo.as_str(),
            e.name.as_str(),
            e.start_year.as_str(),
            e.end_year.as_str(),
            e.iso2_code.as_str(),
            e.iso3_code.as_str(),
            e.m49_code.as_str(),
            if e.is_country { "TRUE" } else { "FALSE" },
            if e.is_country_group { "TRUE" } else { "FALSE" },
            e.country_groups.as_str(),
        ])?;
    }
    wtr.flush()?;
    info!(count = entities.len(), path = %path.display(), "geo entities written");

    Ok(GeoDomain::from_codes(
        entities.iter().map(|e| e.geo.clone()),
    ))
}
