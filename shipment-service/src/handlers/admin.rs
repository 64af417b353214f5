use axum::{extract::State, http::StatusCode, Json};

use service_core::error::AppError;

use crate::startup::AppState;
use crate::workers::{SweepReport, SweepStatus};

/// Manual retention trigger. Returns 202 with a zeroed report when a pass
/// is already in flight.
#[tracing::instrument(skip(state))]
pub async fn run_cleanup(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SweepReport>), AppError> {
    let report = state.sweeper.run_cleanup().await;
    let status = match report.status {
        SweepStatus::Completed => StatusCode::OK,
        SweepStatus::Skipped => StatusCode::ACCEPTED,
    };
    Ok((status, Json(report)))
}
