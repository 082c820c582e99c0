use std::fs;
use std::path::Path;

use crate::domain::{QueryId, QuerySpec};
use crate::error::KiraError;

/// One data row of a query file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRow {
    Spec(QuerySpec),
    Malformed {
        line: usize,
        raw_id: String,
        reason: String,
    },
}

pub fn read_query_file(path: &Path) -> Result<Vec<QueryRow>, KiraError> {
    if !path.is_file() {
        return Err(KiraError::MissingInput(path.to_path_buf()));
    }
    let content = fs::read(path)
        .map_err(|err| KiraError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(parse_query_bytes(&content))
}

/// Parses tab-delimited `query_id<TAB>query` rows. The first line is a header
/// and is always skipped. Blank lines and `#` comments produce no row at all.
/// The query keeps everything after the first tab, quotes included.
pub fn parse_queries(content: &str) -> Vec<QueryRow> {
    parse_query_bytes(content.as_bytes())
}

/// Like [`parse_queries`], decoding each line on its own. A data line that is
/// not valid UTF-8 becomes a malformed row; the rest of the file still parses.
pub fn parse_query_bytes(content: &[u8]) -> Vec<QueryRow> {
    let mut rows = Vec::new();
    for (index, raw) in content.split(|byte| *byte == b'\n').enumerate().skip(1) {
        let line_no = index + 1;
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(_) => {
                let lossy = String::from_utf8_lossy(raw);
                if lossy.trim().is_empty() || lossy.trim_start().starts_with('#') {
                    continue;
                }
                let raw_id = lossy.split('\t').next().unwrap_or_default().trim();
                rows.push(QueryRow::Malformed {
                    line: line_no,
                    raw_id: raw_id.to_string(),
                    reason: "row is not valid UTF-8".to_string(),
                });
                continue;
            }
        };
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        let Some((raw_id, query)) = line.split_once('\t') else {
            rows.push(QueryRow::Malformed {
                line: line_no,
                raw_id: line.trim().to_string(),
                reason: "missing query column".to_string(),
            });
            continue;
        };

        let raw_id = raw_id.trim();
        let query = query.trim();
        if raw_id.is_empty() || query.is_empty() {
            rows.push(QueryRow::Malformed {
                line: line_no,
                raw_id: raw_id.to_string(),
                reason: "empty query id or query text".to_string(),
            });
            continue;
        }

        match raw_id.parse::<QueryId>() {
            Ok(id) => rows.push(QueryRow::Spec(QuerySpec {
                id,
                query: query.to_string(),
                line: line_no,
            })),
            Err(_) => rows.push(QueryRow::Malformed {
                line: line_no,
                raw_id: raw_id.to_string(),
                reason: "query id has no filesystem-safe characters".to_string(),
            }),
        }
    }
    rows
}
