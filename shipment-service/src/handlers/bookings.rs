use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use validator::Validate;

use service_core::error::AppError;

use crate::dtos::{
    BookingListParams, BookingListResponse, BookingResponse, CreateBookingRequest, FieldsParams,
    ReviewBookingRequest, ReviewOutcomeResponse,
};
use crate::models::{Booking, ServiceCode};
use crate::services::store::{BookingFilter, PageRequest};
use crate::startup::AppState;

#[tracing::instrument(skip(state, request))]
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    request.validate()?;

    if ServiceCode::resolve(&request.service).is_none() {
        return Err(AppError::field("service", "unrecognized service route"));
    }
    if request.sender.name.trim().is_empty() {
        return Err(AppError::field("sender.name", "is required"));
    }
    if request.receiver.name.trim().is_empty() {
        return Err(AppError::field("receiver.name", "is required"));
    }

    let booking = Booking::new(
        request.service,
        request.sender,
        request.receiver,
        request.items,
        request.insured,
        request.declared_amount,
        request.awb,
        request.otp,
        request.identity_documents,
    );

    state.store.insert_booking(&booking).await?;
    state.cache.invalidate_prefix("bookings:");

    tracing::info!(
        booking_id = %booking.booking_id,
        service = %booking.service,
        "booking created"
    );

    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

#[tracing::instrument(skip(state))]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(params): Query<BookingListParams>,
) -> Result<Json<Value>, AppError> {
    let page = PageRequest {
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(20),
    }
    .clamped();

    let status_label = params
        .review_status
        .map(|status| status.as_str())
        .unwrap_or("all");
    let cache_key = format!("bookings:{}:{}:{}", page.page, page.page_size, status_label);

    let mut body = match state.cache.get(&cache_key) {
        Some(cached) => cached,
        None => {
            let filter = BookingFilter {
                review_status: params.review_status,
            };
            let result = state.store.list_bookings(&filter, &page).await?;

            let total_pages = (result.total as f64 / page.page_size as f64).ceil() as u64;
            let response = BookingListResponse {
                bookings: result.items.into_iter().map(BookingResponse::from).collect(),
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
        super::project_listing(&mut body, "bookings", fields);
    }

    Ok(Json(body))
}

#[tracing::instrument(skip(state))]
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Query(params): Query<FieldsParams>,
) -> Result<Json<Value>, AppError> {
    let booking = state
        .store
        .get_booking(&booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking {} not found", booking_id)))?;

    let mut body = serde_json::to_value(BookingResponse::from(booking)).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to serialize booking: {}", e))
    })?;
    if let Some(fields) = &params.fields {
        super::project_document(&mut body, fields);
    }

    Ok(Json(body))
}

#[tracing::instrument(skip(state, request))]
pub async fn review_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(request): Json<ReviewBookingRequest>,
) -> Result<Json<ReviewOutcomeResponse>, AppError> {
    if request.reviewed_by.trim().is_empty() {
        return Err(AppError::field("reviewed_by", "is required"));
    }

    let (booking, invoice_request) = state
        .lifecycle
        .review_booking(&booking_id, request.decision, &request.reviewed_by)
        .await?;

    state.cache.invalidate_prefix("bookings:");
    state.cache.invalidate_prefix("requests:");

    Ok(Json(ReviewOutcomeResponse {
        booking: BookingResponse::from(booking),
        invoice_request: invoice_request.map(Into::into),
    }))
}
