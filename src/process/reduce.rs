// src/process/reduce.rs

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::process::format::format_value;
use crate::process::table::ObsRow;
use crate::vocab::flags::FlagOrder;
use crate::vocab::geo::GeoDomain;

/// One emitted datapoint: (geo, year) key plus the canonically formatted
/// value text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPoint {
    pub geo: String,
    pub year: i32,
    pub value: String,
}

/// The reduced series for one indicator group, with its single unit.
#[derive(Debug)]
pub struct ReducedSeries {
    pub points: Vec<SeriesPoint>,
    pub unit: String,
}

/// Reduce one indicator group to a clean, uniquely-keyed, sorted series.
///
/// Returns `None` when the group is discarded by policy: nothing left after
/// the geo filter, more than one unit, or a value that cannot be formatted.
/// Discards never fail the archive.
pub fn reduce_group(
    concept_id: &str,
    rows: &[&ObsRow],
    geos: &GeoDomain,
    flags: &FlagOrder,
) -> Option<ReducedSeries> {
    // 1-2) project to rows that carry a value, inside the geo domain
    let mut kept: Vec<&ObsRow> = rows
        .iter()
        .copied()
        .filter(|r| r.value.is_some() && geos.contains(&r.geo))
        .collect();
    if kept.is_empty() {
        debug!(concept = %concept_id, "no rows after geo filter");
        return None;
    }

    // 3) unit guard
    let units: HashSet<&str> = kept.iter().map(|r| r.unit.as_str()).collect();
    if units.len() > 1 {
        warn!(concept = %concept_id, units = ?units, "unit not unique, group discarded");
        return None;
    }
    let unit = kept[0].unit.clone();

    // 4-5) best flag first, then first occurrence per (geo, year) wins
    kept.sort_by_key(|r| flags.rank(r.flag.as_deref()));
    let mut seen: HashSet<(&str, i32)> = HashSet::with_capacity(kept.len());
    let mut deduped: Vec<&ObsRow> = Vec::with_capacity(kept.len());
    for row in kept {
        if seen.insert((row.geo.as_str(), row.year)) {
            deduped.push(row);
        }
    }

    // residual duplicates after the tie-break would mean the key set itself
    // is broken; keep the chosen rows but make it visible
    let mut check: HashSet<(&str, i32)> = HashSet::with_capacity(deduped.len());
    for row in &deduped {
        if !check.insert((row.geo.as_str(), row.year)) {
            warn!(concept = %concept_id, geo = %row.geo, year = row.year, "duplicate key survived dedup");
        }
    }

    // 6) canonical formatting; one bad value discards the whole group
    let mut points = Vec::with_capacity(deduped.len());
    for row in deduped {
        let raw = row.value.as_deref().unwrap_or_default();
        match format_value(raw) {
            Ok(value) => points.push(SeriesPoint {
                geo: row.geo.clone(),
                year: row.year,
                value,
            }),
            Err(e) => {
                warn!(concept = %concept_id, error = %e, "values are not decimals, group discarded");
                return None;
            }
        }
    }

    // 7) deterministic output order
    points.sort_by(|a, b| a.geo.cmp(&b.geo).then(a.year.cmp(&b.year)));

    Some(ReducedSeries { points, unit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::table::ObsRow;
    use crate::vocab::flags::FlagOrder;
    use crate::vocab::geo::GeoDomain;

    fn obs(geo: &str, year: i32, value: &str, unit: &str, flag: Option<&str>) -> ObsRow {
        ObsRow {
            geo: geo.into(),
            year,
            item_code: "221".into(),
            item_name: "Almonds".into(),
            element_code: None,
            element_name: None,
            value: if value.is_empty() {
                None
            } else {
                Some(value.into())
            },
            unit: unit.into(),
            flag: flag.map(|f| f.into()),
        }
    }

    fn flags() -> FlagOrder {
        FlagOrder::from_codes(["E", "F", "Ff", "A", "S", "I", "M"].map(String::from))
    }

    fn geos(codes: &[&str]) -> GeoDomain {
        GeoDomain::from_codes(codes.iter().map(|c| c.to_string()))
    }

    #[test]
    fn null_flag_wins_the_tie_break() {
        let rows = vec![
            obs("4", 2010, "11.0", "t", Some("E")),
            obs("4", 2010, "12.5", "t", None),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        let out = reduce_group("c", &refs, &geos(&["4"]), &flags()).unwrap();
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].value, "12.5");
    }

    #[test]
    fn better_named_flag_wins_over_worse() {
        let rows = vec![
            obs("4", 2010, "1", "t", Some("F")),
            obs("4", 2010, "2", "t", Some("E")),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        let out = reduce_group("c", &refs, &geos(&["4"]), &flags()).unwrap();
        assert_eq!(out.points[0].value, "2");
    }

    #[test]
    fn mixed_units_discard_the_group() {
        let rows = vec![
            obs("4", 2010, "1", "t", None),
            obs("4", 2011, "2", "ha", None),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        assert!(reduce_group("c", &refs, &geos(&["4"]), &flags()).is_none());
    }

    #[test]
    fn out_of_domain_geos_are_dropped() {
        let rows = vec![
            obs("4", 2010, "1", "t", None),
            obs("999", 2010, "2", "t", None),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        let out = reduce_group("c", &refs, &geos(&["4"]), &flags()).unwrap();
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].geo, "4");
    }

    #[test]
    fn empty_after_geo_filter_discards_silently() {
        let rows = vec![obs("999", 2010, "1", "t", None)];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        assert!(reduce_group("c", &refs, &geos(&["4"]), &flags()).is_none());
    }

    #[test]
    fn unformattable_value_discards_the_group() {
        let rows = vec![
            obs("4", 2010, "1", "t", None),
            obs("4", 2011, "oops", "t", None),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        assert!(reduce_group("c", &refs, &geos(&["4"]), &flags()).is_none());
    }

    #[test]
    fn missing_values_are_projected_out() {
        let rows = vec![
            obs("4", 2010, "", "t", None),
            obs("4", 2011, "3", "t", None),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        let out = reduce_group("c", &refs, &geos(&["4"]), &flags()).unwrap();
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].year, 2011);
    }

    #[test]
    fn output_is_sorted_by_geo_then_year() {
        let rows = vec![
            obs("79", 2011, "1", "t", None),
            obs("4", 2012, "2", "t", None),
            obs("4", 2010, "3", "t", None),
            obs("100", 2010, "4", "t", None),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        let out = reduce_group("c", &refs, &geos(&["4", "79", "100"]), &flags()).unwrap();
        let keys: Vec<(String, i32)> = out
            .points
            .iter()
            .map(|p| (p.geo.clone(), p.year))
            .collect();
        // geo sorts as text, so "100" precedes "4"
        assert_eq!(
            keys,
            vec![
                ("100".to_string(), 2010),
                ("4".to_string(), 2010),
                ("4".to_string(), 2012),
                ("79".to_string(), 2011),
            ]
        );
    }

    #[test]
    fn unique_keys_in_output() {
        let rows = vec![
            obs("4", 2010, "1", "t", Some("E")),
            obs("4", 2010, "2", "t", Some("F")),
            obs("4", 2010, "3", "t", None),
            obs("4", 2011, "4", "t", Some("S")),
        ];
        let refs: Vec<&ObsRow> = rows.iter().collect();
        let out = reduce_group("c", &refs, &geos(&["4"]), &flags()).unwrap();
        let mut keys: Vec<(String, i32)> = out
            .points
            .iter()
            .map(|p| (p.geo.clone(), p.year))
            .collect();
        keys.dedup();
        assert_eq!(keys.len(), out.points.len());
        assert_eq!(out.points.len(), 2);
    }
}
