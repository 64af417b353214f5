//! Classification and weight rules applied when operations verifies a
//! shipment. All route-dependent constraints live here so the lifecycle
//! engine can stay a thin orchestrator.

use chrono::Utc;
use serde::Deserialize;
use service_core::error::AppError;

use crate::models::{
    BookingItem, BoxEntry, Classification, ServiceCode, ShipmentType, Verification, WeightType,
};

/// Commodity descriptions matching any of these mark the shipment as
/// DOCUMENT; everything else ships as NON_DOCUMENT.
const DOCUMENT_KEYWORDS: &[&str] = &[
    "document",
    "documents",
    "papers",
    "paperwork",
    "certificate",
    "passport",
    "contract",
    "letter",
];

/// Verification forms arrive from a spreadsheet-backed frontend, so numeric
/// fields may come through as JSON numbers or as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrText::Number(n) => Some(*n),
            NumberOrText::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxForm {
    pub box_number: Option<u32>,
    pub weight_kg: Option<NumberOrText>,
    pub classification: Option<String>,
}

/// Raw operations input for a verification submit. Everything is optional
/// at the type level; required-field enforcement happens in
/// [`build_verification`] so each miss gets a field-specific error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationForm {
    pub actual_weight: Option<NumberOrText>,
    pub volumetric_weight: Option<NumberOrText>,
    pub chargeable_weight: Option<NumberOrText>,
    pub total_kg: Option<NumberOrText>,
    pub number_of_boxes: Option<NumberOrText>,
    pub shipment_classification: Option<String>,
    pub declared_value: Option<NumberOrText>,
    pub boxes: Option<Vec<BoxForm>>,
}

fn parse_non_negative(field: &str, value: Option<&NumberOrText>) -> Result<f64, AppError> {
    let raw = value.ok_or_else(|| AppError::field(field, "is required"))?;
    let parsed = raw
        .as_f64()
        .ok_or_else(|| AppError::field(field, "must be a number"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(AppError::field(field, "must be a non-negative number"));
    }
    Ok(parsed)
}

fn parse_box_count(field: &str, value: Option<&NumberOrText>) -> Result<u32, AppError> {
    let parsed = parse_non_negative(field, value)?;
    if parsed < 1.0 {
        return Err(AppError::field(field, "must be at least 1"));
    }
    if parsed.fract() != 0.0 {
        return Err(AppError::field(field, "must be a whole number"));
    }
    Ok(parsed as u32)
}

/// Chargeable weight is the larger of actual and volumetric unless a
/// positive override was entered. The weight type only reports which of
/// the two measured weights won and ignores the override.
pub fn derive_weight(
    actual: f64,
    volumetric: f64,
    override_chargeable: Option<f64>,
) -> (f64, WeightType) {
    let chargeable = match override_chargeable {
        Some(value) if value > 0.0 => value,
        _ => actual.max(volumetric),
    };
    let weight_type = if actual >= volumetric {
        WeightType::Actual
    } else {
        WeightType::Volumetric
    };
    (chargeable, weight_type)
}

/// Route constraints on the shipment classification:
/// PH to UAE always ships GENERAL, whatever was entered. The UAE to PH
/// direction must be explicitly FLOWMIC or COMMERCIAL.
pub fn validate_classification(
    route: ServiceCode,
    proposed: Option<Classification>,
) -> Result<Classification, AppError> {
    match route {
        ServiceCode::PhToUae => Ok(Classification::General),
        ServiceCode::UaeToPh | ServiceCode::UaeToPinas => match proposed {
            Some(Classification::Flowmic) => Ok(Classification::Flowmic),
            Some(Classification::Commercial) => Ok(Classification::Commercial),
            _ => Err(AppError::field(
                "shipment_classification",
                "must be FLOWMIC or COMMERCIAL for this route",
            )),
        },
    }
}

/// Insured shipments on the UAE to PH direction must carry a positive
/// declared value. The insured flag comes from the booking, not from the
/// verification form.
fn ensure_insured_declared_value(
    route: ServiceCode,
    insured: bool,
    declared_value: Option<f64>,
) -> Result<(), AppError> {
    if route.is_uae_to_ph_direction()
        && insured
        && !matches!(declared_value, Some(value) if value > 0.0)
    {
        return Err(AppError::field(
            "declared_value",
            "a positive declared value is required for insured shipments on this route",
        ));
    }
    Ok(())
}

fn build_boxes(
    route: ServiceCode,
    shipment_classification: Classification,
    forms: &[BoxForm],
) -> Result<Vec<BoxEntry>, AppError> {
    let mut boxes = Vec::with_capacity(forms.len());
    for (index, form) in forms.iter().enumerate() {
        let weight_kg = match form.weight_kg.as_ref() {
            Some(raw) => {
                let field = format!("boxes[{index}].weight_kg");
                Some(parse_non_negative(&field, Some(raw))?)
            }
            None => None,
        };
        let classification = if route == ServiceCode::PhToUae {
            Classification::General
        } else {
            form.classification
                .as_deref()
                .and_then(Classification::from_string)
                .unwrap_or(shipment_classification)
        };
        boxes.push(BoxEntry {
            box_number: form.box_number.unwrap_or(index as u32 + 1),
            weight_kg,
            classification,
        });
    }
    Ok(boxes)
}

/// Validate the whole form against the route rules and assemble the
/// verification sub-document. Nothing is persisted here; the first error
/// aborts with no partial result.
pub fn build_verification(
    route: ServiceCode,
    insured: bool,
    form: &VerificationForm,
) -> Result<Verification, AppError> {
    let actual = parse_non_negative("actual_weight", form.actual_weight.as_ref())?;
    let volumetric = parse_non_negative("volumetric_weight", form.volumetric_weight.as_ref())?;
    let override_input = parse_non_negative("chargeable_weight", form.chargeable_weight.as_ref())?;
    let total_kg = parse_non_negative("total_kg", form.total_kg.as_ref())?;
    let number_of_boxes = parse_box_count("number_of_boxes", form.number_of_boxes.as_ref())?;

    let (chargeable, weight_type) = derive_weight(actual, volumetric, Some(override_input));

    let proposed = form
        .shipment_classification
        .as_deref()
        .and_then(Classification::from_string);
    let classification = validate_classification(route, proposed)?;

    let declared_value = match form.declared_value.as_ref() {
        Some(raw) => Some(parse_non_negative("declared_value", Some(raw))?),
        None => None,
    };
    ensure_insured_declared_value(route, insured, declared_value)?;

    let boxes = build_boxes(
        route,
        classification,
        form.boxes.as_deref().unwrap_or_default(),
    )?;

    Ok(Verification {
        actual_weight: actual,
        volumetric_weight: volumetric,
        chargeable_weight: chargeable,
        weight_type,
        shipment_classification: classification,
        declared_value,
        insured,
        total_kg,
        number_of_boxes,
        boxes,
        verified_at: Utc::now(),
    })
}

/// DOCUMENT when any item commodity matches the keyword list, else
/// NON_DOCUMENT.
pub fn derive_shipment_type(items: &[BookingItem]) -> ShipmentType {
    let is_document = items.iter().any(|item| {
        let commodity = item.commodity.to_lowercase();
        DOCUMENT_KEYWORDS
            .iter()
            .any(|keyword| commodity.contains(keyword))
    });
    if is_document {
        ShipmentType::Document
    } else {
        ShipmentType::NonDocument
    }
}
