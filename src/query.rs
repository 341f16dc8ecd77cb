//! SRU query construction for one publication day.

use crate::config::IngestConfig;
use crate::error::IngestError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Accept only `YYYY-MM-DD` strings naming a real calendar day.
pub fn validate_date(date: &str) -> Result<NaiveDate, IngestError> {
    let invalid = |reason: &str| IngestError::InvalidInput {
        input: date.to_string(),
        reason: reason.to_string(),
    };

    if !DATE_SHAPE.is_match(date) {
        return Err(invalid("expected a date in YYYY-MM-DD format"));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid("not a calendar date"))
}

/// CQL query selecting the traffic decisions modified on `date`, minus those
/// whose title or alternative title mentions an exclusion keyword.
pub fn build_query(date: &str, exclude_keywords: &[String]) -> String {
    let excluded = exclude_keywords.join(" ");
    format!(
        "(c.product-area==officielepublicaties AND dt.modified>={date} AND dt.modified<={date} \
AND dt.type = \"verkeersbesluit \" AND cql.allRecords =1 NOT dt.title any \"{excluded}\" \
AND cql.allRecords=1 NOT dt.alternative any \"{excluded}\" )"
    )
}

/// Query-string parameters of the search request.
pub fn search_params(config: &IngestConfig, query: String) -> Vec<(&'static str, String)> {
    vec![
        ("version", config.sru_version.clone()),
        ("operation", config.sru_operation.clone()),
        ("query", query),
        ("maximumRecords", config.max_records.to_string()),
    ]
}
