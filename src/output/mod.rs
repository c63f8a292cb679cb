// src/output/mod.rs

use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::process::reduce::SeriesPoint;

/// One surviving indicator: accumulated per archive, merged and written once
/// at the end of the run.
#[derive(Debug, Clone)]
pub struct Concept {
    pub name: String,
    pub id: String,
    pub unit: String,
}

/// The discrete (non-measure) concepts describe the schema itself and are a
/// fixed reference table, not derived from data.
const DISCRETE_CONCEPTS: &[[&str; 4]] = &[
    ["name", "string", "Name", ""],
    ["geo", "entity_domain", "Geo domain", ""],
    ["country", "entity_set", "Country", "geo"],
    ["country_group", "entity_set", "Country Group", "geo"],
    ["country_groups", "string", "Country Groups", ""],
    ["year", "time", "Year", ""],
    ["iso2_code", "string", "ISO2 Code", ""],
    ["iso3_code", "string", "ISO3 Code", ""],
    ["m49_code", "string", "M49 Code", ""],
    ["start_year", "string", "Start Year", ""],
    ["end_year", "string", "End Year", ""],
    ["domain", "string", "Domain", ""],
    ["unit", "string", "Unit", ""],
];

/// Persist one reduced series under its concept id. Every concept writes to
/// its own path, so concurrent group tasks never collide.
pub fn write_datapoints(
    out_dir: &Path,
    dataset_code: &str,
    concept_id: &str,
    points: &[SeriesPoint],
) -> Result<PathBuf> {
    let dir = out_dir.join("datapoints").join(dataset_code);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!(
        "ddf--datapoints--{}--by--geo--year.csv",
        concept_id
    ));

    let mut wtr = WriterBuilder::new()
        .from_path(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["geo", "year", concept_id])?;
    for p in points {
        wtr.write_record([p.geo.as_str(), &p.year.to_string(), p.value.as_str()])?;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(path)
}

/// Merge the per-archive concept vectors: first occurrence of an id wins and
/// recurrences are surfaced, never silently merged. Output is sorted by id.
pub fn merge_concepts(concepts: Vec<Concept>) -> Vec<Concept> {
    let mut seen: HashSet<String> = HashSet::with_capacity(concepts.len());
    let mut merged: Vec<Concept> = Vec::with_capacity(concepts.len());
    for c in concepts {
        if seen.insert(c.id.clone()) {
            merged.push(c);
        } else {
            warn!(concept = %c.id, "concept id recurs, keeping first occurrence");
        }
    }
    merged.sort_by(|a, b| a.id.cmp(&b.id));
    merged
}

/// Write the consolidated measure-concept listing.
pub fn write_concepts(out_dir: &Path, concepts: &[Concept]) -> Result<()> {
    let path = out_dir.join("ddf--concepts--continuous.csv");
    let mut wtr = WriterBuilder::new()
        .from_path(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["name", "concept", "unit", "concept_type"])?;
    for c in concepts {
        wtr.write_record([c.name.as_str(), c.id.as_str(), c.unit.as_str(), "measure"])?;
    }
    wtr.flush()?;
    info!(count = concepts.len(), path = %path.display(), "concepts written");
    Ok(())
}

/// Write the fixed discrete-concepts schema listing.
pub fn write_discrete_concepts(out_dir: &Path) -> Result<()> {
    let path = out_dir.join("ddf--concepts--discrete.csv");
    let mut wtr = WriterBuilder::new()
        .from_path(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["concept", "concept_type", "name", "domain"])?;
    for row in DISCRETE_CONCEPTS {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
