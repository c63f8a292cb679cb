// src/vocab/flags.rs

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

/// Sentinel standing in for an absent flag. An observation with no flag is
/// official data, the best quality grade.
pub const NULL_FLAG: &str = "_";

/// The definitions service does not rank flags, so the ones known to mean
/// official or near-official data are pinned ahead of everything else, in
/// this order.
const MANUAL_PRIORITY: &[&str] = &[NULL_FLAG, "E", "F", "Ff", "A", "S"];

const FLAG_URL: &str = "https://faostatservices.fao.org/api/v1/en/definitions/types/flag";

#[derive(Debug, Deserialize)]
struct FlagDef {
    #[serde(rename = "Flag")]
    flag: String,
}

#[derive(Debug, Deserialize)]
struct FlagResponse {
    data: Vec<FlagDef>,
}

/// Total order over the flag universe, used as the dedup sort key. Lower
/// rank is better; codes outside the order rank strictly worst.
#[derive(Debug, Clone)]
pub struct FlagOrder {
    rank: HashMap<String, usize>,
}

impl FlagOrder {
    /// Build the order from vocabulary codes: manual priority prefix first,
    /// then the vocabulary in its given order, duplicates keeping their
    /// first occurrence.
    pub fn from_codes<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut rank = HashMap::new();
        let all = MANUAL_PRIORITY
            .iter()
            .map(|s| s.to_string())
            .chain(codes);
        for code in all {
            let next = rank.len();
            rank.entry(code).or_insert(next);
        }
        FlagOrder { rank }
    }

    /// Sort key for a row's flag; `None` is the null flag.
    pub fn rank(&self, flag: Option<&str>) -> usize {
        let code = flag.unwrap_or(NULL_FLAG);
        self.rank.get(code).copied().unwrap_or(self.rank.len())
    }
}

/// Fetch the flag vocabulary once and build the priority order. Failure is
/// fatal to the run; no archive can be deduplicated without it.
pub async fn fetch_flag_order(client: &Client) -> Result<FlagOrder> {
    let resp: FlagResponse = client
        .get(FLAG_URL)
        .send()
        .await
        .context("fetching flag definitions")?
        .error_for_status()
        .context("flag definitions status")?
        .json()
        .await
        .context("decoding flag definitions")?;

    info!(count = resp.data.len(), "flag vocabulary fetched");
    Ok(FlagOrder::from_codes(resp.data.into_iter().map(|d| d.flag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> FlagOrder {
        // vocabulary order as the service returns it; "A" and "E" repeat
        // codes already pinned by the manual prefix
        FlagOrder::from_codes(
            ["A", "E", "I", "M", "T"].map(String::from),
        )
    }

    #[test]
    fn null_flag_ranks_best() {
        let o = order();
        assert_eq!(o.rank(None), 0);
        assert!(o.rank(None) < o.rank(Some("E")));
    }

    #[test]
    fn manual_prefix_precedes_vocabulary_order() {
        let o = order();
        assert!(o.rank(Some("E")) < o.rank(Some("A")));
        assert!(o.rank(Some("S")) < o.rank(Some("I")));
        assert!(o.rank(Some("I")) < o.rank(Some("T")));
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let o = order();
        // "E" is second in the manual prefix; the vocabulary repeat must not
        // displace it behind "I"
        assert_eq!(o.rank(Some("E")), 1);
        assert_eq!(o.rank(Some("A")), 4);
    }

    #[test]
    fn unknown_codes_rank_worst() {
        let o = order();
        let unknown = o.rank(Some("Zz"));
        for known in ["E", "F", "Ff", "A", "S", "I", "M", "T"] {
            assert!(o.rank(Some(known)) < unknown);
        }
    }
}
