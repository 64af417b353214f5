use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use validator::Validate;

use service_core::error::AppError;

use crate::dtos::{
    ChangeDeliveryStatusRequest, ChangeStatusRequest, CreateDraftRequest, FinanceCompleteRequest,
    InvoiceRequestResponse, RequestListParams, RequestListResponse,
};
use crate::dtos::bookings::FieldsParams;
use crate::models::InvoiceRequest;
use crate::services::lifecycle::DraftRequest;
use crate::services::rules::VerificationForm;
use crate::services::store::{PageRequest, RequestFilter};
use crate::startup::AppState;

#[tracing::instrument(skip(state, request))]
pub async fn create_draft(
    State(state): State<AppState>,
    Json(request): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<InvoiceRequestResponse>), AppError> {
    request.validate()?;

    let created = state
        .lifecycle
        .create_draft(DraftRequest {
            service: request.service,
            customer_name: request.customer_name,
            receiver_name: request.receiver_name,
            origin: request.origin,
            destination: request.destination,
            insured: request.insured,
            declared_amount: request.declared_amount,
        })
        .await?;

    state.cache.invalidate_prefix("requests:");

    Ok((
        StatusCode::CREATED,
        Json(InvoiceRequestResponse::from(created)),
    ))
}

#[tracing::instrument(skip(state))]
pub async fn list_requests(
    State(state): State<AppState>,
    Query(params): Query<RequestListParams>,
) -> Result<Json<Value>, AppError> {
    let page = PageRequest {
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(20),
    }
    .clamped();

    let status_label = params
        .status
        .map(|status| status.as_str())
        .unwrap_or("all");
    let service_label = params
        .service_code
        .map(|code| code.as_str())
        .unwrap_or("all");
    let cache_key = format!(
        "requests:{}:{}:{}:{}",
        page.page, page.page_size, status_label, service_label
    );

    let mut body = match state.cache.get(&cache_key) {
        Some(cached) => cached,
        None => {
            let filter = RequestFilter {
                status: params.status,
                service_code: params.service_code,
            };
            let result = state.store.list_requests(&filter, &page).await?;

            let total_pages = (result.total as f64 / page.page_size as f64).ceil() as u64;
            let response = RequestListResponse {
                requests: result
                    .items
                    .into_iter()
                    .map(InvoiceRequestResponse::from)
                    .collect(),
                total: result.total,
                page: page.page,
                page_size: page.page_size,
                total_pages,
            };

            let value = serde_json::to_value(&response).map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to serialize listing: {}", e))
            })?;
            state.cache.insert(cache_key, value.clone());
            value
        }
    };

    if let Some(fields) = &params.fields {
        super::project_listing(&mut body, "requests", fields);
    }

    Ok(Json(body))
}

/// Fetch by request id, falling back to a tracking-code lookup so legacy
/// tracking spellings keep resolving.
async fn find_request(state: &AppState, id: &str) -> Result<InvoiceRequest, AppError> {
    if let Some(request) = state.store.get_request(id).await? {
        return Ok(request);
    }
    state
        .store
        .find_request_by_tracking(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice request {} not found", id)))
}

#[tracing::instrument(skip(state))]
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<FieldsParams>,
) -> Result<Json<Value>, AppError> {
    let request = find_request(&state, &id).await?;

    let mut body = serde_json::to_value(InvoiceRequestResponse::from(request)).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to serialize request: {}", e))
    })?;
    if let Some(fields) = &params.fields {
        super::project_document(&mut body, fields);
    }

    Ok(Json(body))
}

#[tracing::instrument(skip(state, form))]
pub async fn submit_verification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<VerificationForm>,
) -> Result<Json<InvoiceRequestResponse>, AppError> {
    let updated = state.lifecycle.submit_verification(&id, &form).await?;
    state.cache.invalidate_prefix("requests:");
    Ok(Json(InvoiceRequestResponse::from(updated)))
}

#[tracing::instrument(skip(state))]
pub async fn complete_verification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceRequestResponse>, AppError> {
    let updated = state.lifecycle.complete_verification(&id).await?;
    state.cache.invalidate_prefix("requests:");
    Ok(Json(InvoiceRequestResponse::from(updated)))
}

#[tracing::instrument(skip(state, request))]
pub async fn complete_finance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FinanceCompleteRequest>,
) -> Result<Json<InvoiceRequestResponse>, AppError> {
    let amount = match request.invoice_amount.as_ref() {
        Some(raw) => Some(
            raw.as_f64()
                .ok_or_else(|| AppError::field("invoice_amount", "must be a number"))?,
        ),
        None => None,
    };

    let updated = state.lifecycle.complete_finance(&id, amount).await?;
    state.cache.invalidate_prefix("requests:");
    Ok(Json(InvoiceRequestResponse::from(updated)))
}

#[tracing::instrument(skip(state, request))]
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<InvoiceRequestResponse>, AppError> {
    let updated = state.lifecycle.change_status(&id, &request.status).await?;
    state.cache.invalidate_prefix("requests:");
    Ok(Json(InvoiceRequestResponse::from(updated)))
}

#[tracing::instrument(skip(state, request))]
pub async fn change_delivery_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChangeDeliveryStatusRequest>,
) -> Result<Json<InvoiceRequestResponse>, AppError> {
    let updated = state
        .lifecycle
        .change_delivery_status(
            &id,
            &request.delivery_status,
            request.delivery_date,
            request.notes,
        )
        .await?;
    state.cache.invalidate_prefix("requests:");
    Ok(Json(InvoiceRequestResponse::from(updated)))
}
