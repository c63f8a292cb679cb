// src/process/mod.rs

pub mod concept;
pub mod format;
pub mod reduce;
pub mod table;

use anyhow::Result;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::output::{self, Concept};
use crate::vocab::flags::FlagOrder;
use crate::vocab::geo::GeoDomain;

/// Failures the pipeline distinguishes so callers can contain them at the
/// right granularity: structural problems skip the archive, everything
/// group-level is handled (and logged) inside the reducer.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("archive structure: {0}")]
    Structure(String),
    #[error("no dataset code known for archive {0}")]
    MissingDomainTag(String),
    #[error("value {0:?} is not a decimal")]
    Formatting(String),
}

/// Process one archive end to end: locate and load the data table, partition
/// it into indicator groups, reduce each group, and write one datapoints
/// file per surviving concept. Returns the archive's concept records for the
/// run-wide merge.
///
/// Groups are independent, so they reduce in parallel; each writes its own
/// output path.
#[instrument(level = "info", skip_all, fields(zip = %zip_path.as_ref().display(), dataset = %dataset_code))]
pub fn process_archive<P: AsRef<Path>>(
    zip_path: P,
    dataset_code: &str,
    flags: &FlagOrder,
    geos: &GeoDomain,
    out_dir: &Path,
) -> Result<Vec<Concept>> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build_global()
        .ok();

    let data = table::load_data_table(&zip_path)?;
    let groups = concept::group_table(&data, dataset_code);
    let total = groups.len();

    // two groups collapsing to one id would race on the same output file;
    // keep the first and surface the rest
    let mut ids: HashSet<&str> = HashSet::with_capacity(groups.len());
    let mut unique: Vec<&concept::IndicatorGroup> = Vec::with_capacity(groups.len());
    for group in &groups {
        if ids.insert(group.id.as_str()) {
            unique.push(group);
        } else {
            warn!(concept = %group.id, "concept id collides within archive, group skipped");
        }
    }

    let concepts: Vec<Option<Concept>> = unique
        .par_iter()
        .map(|group| -> Result<Option<Concept>> {
            let reduced = match reduce::reduce_group(&group.id, &group.rows, geos, flags) {
                Some(r) => r,
                None => return Ok(None),
            };
            output::write_datapoints(out_dir, dataset_code, &group.id, &reduced.points)?;
            Ok(Some(Concept {
                name: group.name.clone(),
                id: group.id.clone(),
                unit: reduced.unit,
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    let concepts: Vec<Concept> = concepts.into_iter().flatten().collect();
    info!(groups = total, emitted = concepts.len(), "archive processed");
    Ok(concepts)
}
