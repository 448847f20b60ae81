//! Admin reporting routes.

use axum::extract::State;
use axum::Json;
use database::stats::{self, Alert, Analytics, AnalyticsKind, AnalyticsPeriod, Dashboard, Overview};
use database::validation::FieldValidator;
use serde::Deserialize;

use super::{finish, ok, Envelope, WindowQuery};
use crate::error::Result;
use crate::extract::ApiQuery;
use crate::state::AppState;

pub async fn dashboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> Result<Json<Envelope<Dashboard>>> {
    let window = query.window()?;
    Ok(ok(stats::dashboard(state.db.pool(), &window).await?))
}

pub async fn overview(State(state): State<AppState>) -> Result<Json<Envelope<Overview>>> {
    Ok(ok(stats::overview(state.db.pool()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Daily series of new records; defaults to patients over 30 days.
pub async fn analytics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> Result<Json<Envelope<Analytics>>> {
    let mut v = FieldValidator::new();
    let period = v.optional_choice("period", query.period.as_deref(), AnalyticsPeriod::parse);
    let kind = v.optional_choice("type", query.kind.as_deref(), AnalyticsKind::parse);
    finish(v)?;

    let analytics = stats::analytics(
        state.db.pool(),
        kind.unwrap_or_default(),
        period.unwrap_or_default(),
    )
    .await?;
    Ok(ok(analytics))
}

pub async fn alerts(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Alert>>>> {
    Ok(ok(stats::alerts(state.db.pool()).await?))
}
