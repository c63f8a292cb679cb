// src/process/concept.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::process::table::{DataTable, ObsRow};

/// Names longer than this are unwieldy as identifier material.
const NAME_LEN_LIMIT: usize = 80;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Canonical slug: lowercase, every non-alphanumeric run collapsed to a
/// single underscore, leading/trailing underscores trimmed.
pub fn to_concept_id(s: &str) -> String {
    NON_ALNUM
        .replace_all(&s.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// One indicator series: the derived id, its human-readable label, and the
/// rows that belong to it.
#[derive(Debug)]
pub struct IndicatorGroup<'a> {
    pub id: String,
    pub name: String,
    pub rows: Vec<&'a ObsRow>,
}

/// Partition a table into indicator groups keyed by (item, element) identity
/// when an element column exists, else by item alone. BTreeMap keeps the
/// group order deterministic across runs.
pub fn group_table<'a>(table: &'a DataTable, tag: &str) -> Vec<IndicatorGroup<'a>> {
    let mut groups: BTreeMap<(String, Option<String>), Vec<&ObsRow>> = BTreeMap::new();
    for row in &table.rows {
        let key = (
            row.item_code.clone(),
            if table.has_element {
                row.element_code.clone()
            } else {
                None
            },
        );
        groups.entry(key).or_default().push(row);
    }

    groups
        .into_values()
        .map(|rows| {
            let first = rows[0];
            let element_name = if table.has_element {
                first.element_name.as_deref()
            } else {
                None
            };
            let (id, name) = derive_concept(tag, &first.item_code, &first.item_name, element_name);
            IndicatorGroup { id, name, rows }
        })
        .collect()
}

/// Derive the concept id and display label for one group.
///
/// Id policy, first applicable rule wins:
///   a. alphabetic-leading, short item code  -> `{item_code} - {element}`
///   b. short item display name              -> `{item_name} - {element}`
///   c. fall back to the code form of (a)
/// The label is always built from the item name, whatever branch names the
/// id. The fullname is prefixed with the archive's domain tag before
/// slugging so the same indicator in two datasets gets two distinct ids.
pub fn derive_concept(
    tag: &str,
    item_code: &str,
    item_name: &str,
    element_name: Option<&str>,
) -> (String, String) {
    let alphabetic_code = item_code
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false);
    let short = |s: &str| s.chars().count() < NAME_LEN_LIMIT;

    let base = if alphabetic_code && short(item_code) {
        item_code
    } else if short(item_name) {
        item_name
    } else {
        item_code
    };

    let (fullname, label) = match element_name {
        Some(element) => (
            format!("{} - {}", base, element),
            format!("{} - {}", item_name, element),
        ),
        None => (base.to_string(), item_name.to_string()),
    };

    let id = to_concept_id(&format!("{} {}", tag, fullname));
    (id, label)
}
