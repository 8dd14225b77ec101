#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! US Census Bureau ACS 5-year API client.
//!
//! Two capabilities:
//!
//! 1. **Variable catalog**: `GET /data/{year}/acs/acs5/groups/{TABLE}.json`
//!    resolves a table id (e.g. `B01001`) to its variables and labels.
//!    Results are cached per `(table, year)` for the process lifetime.
//! 2. **Statistics fetcher**: `GET /data/2022/acs/acs5?get=group(TABLE)&ucgid=...`
//!    retrieves raw variable values per geography. The API caps a call
//!    at 100 `ucgid`s, so requests are partitioned into batches; any
//!    batch failure aborts the whole fetch (a silently dropped
//!    geography would bias every downstream weighted sum).

use std::collections::BTreeMap;
use std::sync::Mutex;

use census_map_models::{ValueTable, VariableMeta};
use thiserror::Error;

/// Maximum number of `ucgid`s per data-endpoint call (API limit).
pub const UCGID_BATCH_SIZE: usize = 100;

/// ACS 5-year vintage used by the data endpoint.
pub const ACS_DATA_YEAR: u16 = 2022;

/// Default ACS vintage for variable catalog lookups.
pub const DEFAULT_CATALOG_YEAR: u16 = 2023;

/// Default API base URL.
const CENSUS_API_BASE: &str = "https://api.census.gov";

/// Errors from ACS API operations.
#[derive(Debug, Error)]
pub enum CensusError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The table id is unknown to the variable catalog.
    #[error("Unknown table: {table}")]
    UnknownTable {
        /// The offending table id.
        table: String,
    },

    /// A data-endpoint batch failed; the whole fetch is aborted.
    #[error("Statistics fetch failed for table {table} (HTTP {status}): {message}")]
    Fetch {
        /// Table id being fetched.
        table: String,
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body (truncated).
        message: String,
        /// The geography ids of the failed batch.
        ucgids: Vec<String>,
    },
}

/// ACS API client.
///
/// Constructed once per process and passed to callers explicitly; the
/// catalog cache lives inside the client, so dropping the client drops
/// the cache.
pub struct CensusClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    catalog_cache: Mutex<BTreeMap<(String, u16), BTreeMap<String, VariableMeta>>>,
}

impl std::fmt::Debug for CensusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CensusClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl CensusClient {
    /// Builds a client against the public Census API.
    ///
    /// The API key is optional for light use but strongly recommended;
    /// unkeyed requests are rate-limited aggressively.
    ///
    /// # Errors
    ///
    /// Returns [`CensusError`] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>) -> Result<Self, CensusError> {
        Self::with_base_url(CENSUS_API_BASE.to_string(), api_key)
    }

    /// Builds a client against an arbitrary base URL (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`CensusError`] if the HTTP client cannot be built.
    pub fn with_base_url(base_url: String, api_key: Option<String>) -> Result<Self, CensusError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            catalog_cache: Mutex::new(BTreeMap::new()),
        })
    }

    /// Resolves a table id to its variable catalog for an ACS vintage.
    ///
    /// Labels have their `!!` hierarchy separators rendered as spaces.
    /// Cached per `(table, year)` for the process lifetime; entries are
    /// written at most once and never invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`CensusError::UnknownTable`] if the catalog endpoint
    /// does not recognize the table, [`CensusError::Http`] /
    /// [`CensusError::Parse`] on transport or payload failures.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache mutex is poisoned.
    pub async fn resolve_variables(
        &self,
        table: &str,
        year: u16,
    ) -> Result<BTreeMap<String, VariableMeta>, CensusError> {
        let key = (table.to_string(), year);
        if let Some(cached) = self.catalog_cache.lock().unwrap().get(&key) {
            return Ok(cached.clone());
        }

        let mut url = format!("{}/data/{year}/acs/acs5/groups/{table}.json", self.base_url);
        if let Some(api_key) = &self.api_key {
            url.push_str(&format!("?key={api_key}"));
        }

        log::debug!("Fetching variable catalog for table {table} ({year})");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CensusError::UnknownTable {
                table: table.to_string(),
            });
        }
        if !status.is_success() {
            return Err(CensusError::Parse {
                message: format!("Catalog request for {table} failed with HTTP {status}"),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let variables = parse_variables_payload(table, &body)?;

        self.catalog_cache
            .lock()
            .unwrap()
            .insert(key, variables.clone());

        Ok(variables)
    }

    /// Fetches raw variable values for a table over a set of
    /// fully-qualified geography ids.
    ///
    /// Ids are partitioned into batches of [`UCGID_BATCH_SIZE`]; one
    /// request per batch, results concatenated. Row order is not
    /// significant; rows are keyed by `GEO_ID`. All-or-nothing: a
    /// failed batch discards results from prior batches.
    ///
    /// # Errors
    ///
    /// Returns [`CensusError::Fetch`] (with the failing batch's ids)
    /// if any batch returns a non-success status, [`CensusError::Http`]
    /// / [`CensusError::Parse`] on transport or payload failures.
    pub async fn fetch_variable_values(
        &self,
        table: &str,
        geoidfqs: &[String],
    ) -> Result<ValueTable, CensusError> {
        let mut merged = ValueTable::default();

        for chunk in chunk_ids(geoidfqs, UCGID_BATCH_SIZE) {
            let ucgid_param = chunk.join(",");
            let mut url = format!(
                "{}/data/{ACS_DATA_YEAR}/acs/acs5?get=group({table})&ucgid={ucgid_param}",
                self.base_url
            );
            if let Some(api_key) = &self.api_key {
                url.push_str(&format!("&key={api_key}"));
            }

            log::debug!(
                "Fetching {} geographies for table {table} ({} so far)",
                chunk.len(),
                merged.len()
            );

            let resp = self.http.get(&url).send().await?;
            let status = resp.status();
            let body = resp.text().await?;

            if !status.is_success() {
                return Err(CensusError::Fetch {
                    table: table.to_string(),
                    status: status.as_u16(),
                    message: truncate_for_log(&body, 500),
                    ucgids: chunk.to_vec(),
                });
            }

            let batch = parse_group_payload(table, &body)?;

            if merged.columns.is_empty() {
                merged.columns = batch.columns;
            }
            merged.rows.extend(batch.rows);
        }

        log::info!(
            "Fetched {} geography rows for table {table}",
            merged.len()
        );

        Ok(merged)
    }
}

/// Partitions ids into slices of at most `size` elements.
fn chunk_ids(ids: &[String], size: usize) -> impl Iterator<Item = &[String]> {
    ids.chunks(size)
}

/// Whether a variable id denotes a point estimate.
///
/// ACS variables share a numeric root with a one-character suffix:
/// `B01001_001E` (estimate), `B01001_001M` (margin of error),
/// `B01001_001EA`/`MA` (annotations). Only ids that end in `E`
/// immediately after a digit qualify, which also rules out bookkeeping
/// columns like `NAME`.
#[must_use]
pub fn is_estimate_var(var_id: &str) -> bool {
    let mut chars = var_id.chars().rev();
    chars.next() == Some('E') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Parses the variable-catalog payload for a table.
///
/// # Errors
///
/// Returns [`CensusError::UnknownTable`] if the payload carries no
/// `variables` object (the API's shape for unknown groups).
fn parse_variables_payload(
    table: &str,
    body: &serde_json::Value,
) -> Result<BTreeMap<String, VariableMeta>, CensusError> {
    let variables = body["variables"]
        .as_object()
        .ok_or_else(|| CensusError::UnknownTable {
            table: table.to_string(),
        })?;

    let mut parsed = BTreeMap::new();
    for (var_id, meta) in variables {
        let label = meta["label"]
            .as_str()
            .unwrap_or_default()
            .replace("!!", " ");
        parsed.insert(
            var_id.clone(),
            VariableMeta {
                label,
                is_estimate: is_estimate_var(var_id),
            },
        );
    }

    Ok(parsed)
}

/// Parses the data-endpoint payload: a JSON array of arrays whose
/// first row names the columns, e.g.
///
/// ```text
/// [["B01001_001E","GEO_ID","NAME","ucgid"],
///  ["1181","1500000US110010001011","Block Group 1...","1500000US110010001011"]]
/// ```
///
/// Rows are keyed by the `GEO_ID` column (falling back to `ucgid`).
/// Null cells are dropped rather than stored as empty strings.
fn parse_group_payload(table: &str, body: &str) -> Result<ValueTable, CensusError> {
    let rows: Vec<Vec<Option<String>>> =
        serde_json::from_str(body).map_err(|e| CensusError::Parse {
            message: format!("Failed to parse data payload for table {table}: {e}"),
        })?;

    let Some((header, data_rows)) = rows.split_first() else {
        return Err(CensusError::Parse {
            message: format!("Empty data payload for table {table}"),
        });
    };

    let columns: Vec<String> = header
        .iter()
        .map(|cell| cell.clone().unwrap_or_default())
        .collect();

    let key_index = columns
        .iter()
        .position(|c| c == "GEO_ID")
        .or_else(|| columns.iter().position(|c| c == "ucgid"))
        .ok_or_else(|| CensusError::Parse {
            message: format!("No GEO_ID or ucgid column in data payload for table {table}"),
        })?;

    let mut table_out = ValueTable {
        columns,
        rows: BTreeMap::new(),
    };

    for row in data_rows {
        let Some(Some(geoidfq)) = row.get(key_index).cloned() else {
            continue;
        };

        let mut cells = BTreeMap::new();
        for (column, cell) in table_out.columns.iter().zip(row.iter()) {
            if let Some(value) = cell {
                cells.insert(column.clone(), value.clone());
            }
        }

        table_out.rows.insert(geoidfq, cells);
    }

    Ok(table_out)
}

/// Truncates a string for logging, appending "..." if it exceeds
/// `max_len` bytes. The cut lands on a char boundary so multi-byte
/// UTF-8 in upstream error bodies cannot panic the error path.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_250_ids_into_3_batches() {
        let ids: Vec<String> = (0..250).map(|i| format!("id{i}")).collect();
        let chunks: Vec<&[String]> = chunk_ids(&ids, UCGID_BATCH_SIZE).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn chunks_exact_multiple() {
        let ids: Vec<String> = (0..200).map(|i| format!("id{i}")).collect();
        let chunks: Vec<&[String]> = chunk_ids(&ids, UCGID_BATCH_SIZE).collect();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn classifies_estimate_variables() {
        assert!(is_estimate_var("B01001_001E"));
        assert!(is_estimate_var("B19013_001E"));
        assert!(!is_estimate_var("B01001_001M"));
        assert!(!is_estimate_var("B01001_001EA"));
        assert!(!is_estimate_var("B01001_001MA"));
        assert!(!is_estimate_var("NAME"));
        assert!(!is_estimate_var("GEO_ID"));
        assert!(!is_estimate_var("ucgid"));
        assert!(!is_estimate_var("E"));
    }

    #[test]
    fn parses_variables_payload() {
        let body = serde_json::json!({
            "variables": {
                "B01001_001E": { "label": "Estimate!!Total:" },
                "B01001_001M": { "label": "Margin of Error!!Total:" },
            }
        });

        let parsed = parse_variables_payload("B01001", &body).unwrap();
        assert_eq!(parsed.len(), 2);

        let estimate = &parsed["B01001_001E"];
        assert_eq!(estimate.label, "Estimate Total:");
        assert!(estimate.is_estimate);
        assert!(!parsed["B01001_001M"].is_estimate);
    }

    #[test]
    fn unknown_table_payload() {
        let body = serde_json::json!({ "error": "not found" });
        assert!(matches!(
            parse_variables_payload("B99999", &body),
            Err(CensusError::UnknownTable { .. })
        ));
    }

    #[test]
    fn parses_group_payload() {
        let body = r#"[
            ["B01001_001E","B01001_001M","GEO_ID","NAME","ucgid"],
            ["1181","120","1500000US110010001011","Block Group 1","1500000US110010001011"],
            ["905",null,"1500000US110010001012","Block Group 2","1500000US110010001012"]
        ]"#;

        let table = parse_group_payload("B01001", body).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.value("1500000US110010001011", "B01001_001E"), Some("1181"));
        // Null margin cell is dropped, not stored as empty
        assert_eq!(table.value("1500000US110010001012", "B01001_001M"), None);
    }

    #[test]
    fn group_payload_requires_key_column() {
        let body = r#"[["B01001_001E","NAME"],["1181","x"]]"#;
        assert!(matches!(
            parse_group_payload("B01001", body),
            Err(CensusError::Parse { .. })
        ));
    }

    #[test]
    fn group_payload_rejects_garbage() {
        assert!(matches!(
            parse_group_payload("B01001", "<html>blocked</html>"),
            Err(CensusError::Parse { .. })
        ));
    }

    #[test]
    fn truncates_on_char_boundary() {
        // A 2-byte char straddling the cut index must not panic
        let mut body = "a".repeat(499);
        body.push('é');
        let truncated = truncate_for_log(&body, 500);
        assert_eq!(truncated, format!("{}...", "a".repeat(499)));
    }

    #[test]
    fn short_strings_pass_through_untruncated() {
        assert_eq!(truncate_for_log("short", 500), "short");
        assert_eq!(truncate_for_log("", 0), "");
    }
}
