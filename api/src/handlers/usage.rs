//! `GET /usage?month=YYYY-MM` (spec §6).

use axum::extract::{Query, State};
use axum::response::Json;
use billing_common::error::{CoreError, ValidationError};
use billing_usage::UsageSummary;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::AuthenticatedAccount;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// `YYYY-MM`.
    pub month: String,
}

/// `GET /usage`.
#[instrument(skip_all, name = "(get-usage)")]
pub async fn get_usage(
    State(state): State<SharedState>,
    account: AuthenticatedAccount,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageSummary>, CoreError> {
    let month_start = parse_month(&query.month)
        .ok_or_else(|| ValidationError::new("month", "expected `YYYY-MM`".to_string()))?;
    let summary = state.usage.usage_for_month(&account.account_ref(), month_start).await?;
    Ok(Json(summary))
}

fn parse_month(s: &str) -> Option<chrono::DateTime<Utc>> {
    let (year, month) = s.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_well_formed_month() {
        let dt = parse_month("2026-07").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2026-07-01");
    }

    #[test]
    fn rejects_malformed_month() {
        assert!(parse_month("not-a-month").is_none());
        assert!(parse_month("2026-13").is_none());
    }
}
