//! Tracking and invoice number generation. Candidates are checked against
//! the store before use, but the unique index on the persisted field is the
//! authoritative guard; callers retry generation when an insert conflicts.

use rand::Rng;
use service_core::error::AppError;

use super::store::IdentifierIndex;
use crate::models::ServiceCode;

const MAX_ATTEMPTS: usize = 100;
const TRACKING_LEN: usize = 15;
/// Digit slots in the 15-character tracking pattern; every other slot is an
/// uppercase letter.
const DIGIT_POSITIONS: [usize; 5] = [3, 6, 9, 10, 13];
/// Replaces the leading letters for shipments heading out of the Philippines.
const PH_PREFIX: &str = "PHL";

fn random_letter(rng: &mut impl Rng) -> char {
    rng.gen_range(b'A'..=b'Z') as char
}

fn random_digit(rng: &mut impl Rng) -> char {
    rng.gen_range(b'0'..=b'9') as char
}

fn tracking_candidate(route_hint: Option<ServiceCode>) -> String {
    let mut rng = rand::thread_rng();
    let mut candidate = String::with_capacity(TRACKING_LEN);
    for position in 0..TRACKING_LEN {
        if DIGIT_POSITIONS.contains(&position) {
            candidate.push(random_digit(&mut rng));
        } else {
            candidate.push(random_letter(&mut rng));
        }
    }
    if route_hint == Some(ServiceCode::PhToUae) {
        candidate.replace_range(..PH_PREFIX.len(), PH_PREFIX);
    }
    candidate
}

fn invoice_candidate() -> String {
    let mut rng = rand::thread_rng();
    format!("INV-{:06}", rng.gen_range(0..=999_999u32))
}

fn timestamp_fallback(candidate: &str, kind: &'static str) -> String {
    let fallback = format!("{candidate}{}", chrono::Utc::now().timestamp_millis());
    tracing::warn!(
        kind,
        candidate = %fallback,
        attempts = MAX_ATTEMPTS,
        "identifier attempts exhausted, accepting timestamp-suffixed candidate"
    );
    metrics::counter!("identifier_fallback_total", "kind" => kind).increment(1);
    fallback
}

/// Generate a tracking number not currently present in the store. After
/// [`MAX_ATTEMPTS`] collisions the last candidate gets a timestamp suffix
/// and is accepted unconditionally.
pub async fn unique_tracking_number<I>(
    index: &I,
    route_hint: Option<ServiceCode>,
) -> Result<String, AppError>
where
    I: IdentifierIndex + ?Sized,
{
    let mut candidate = String::new();
    for _ in 0..MAX_ATTEMPTS {
        candidate = tracking_candidate(route_hint);
        if !index.tracking_code_in_use(&candidate).await? {
            return Ok(candidate);
        }
    }
    Ok(timestamp_fallback(&candidate, "tracking"))
}

/// Generate an `INV-` + six digit invoice number, with the same collision
/// handling as [`unique_tracking_number`].
pub async fn unique_invoice_number<I>(index: &I) -> Result<String, AppError>
where
    I: IdentifierIndex + ?Sized,
{
    let mut candidate = String::new();
    for _ in 0..MAX_ATTEMPTS {
        candidate = invoice_candidate();
        if !index.invoice_number_in_use(&candidate).await? {
            return Ok(candidate);
        }
    }
    Ok(timestamp_fallback(&candidate, "invoice"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct NeverTaken;

    #[async_trait]
    impl IdentifierIndex for NeverTaken {
        async fn tracking_code_in_use(&self, _code: &str) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn invoice_number_in_use(&self, _number: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    #[derive(Default)]
    struct AlwaysTaken {
        checks: AtomicUsize,
    }

    #[async_trait]
    impl IdentifierIndex for AlwaysTaken {
        async fn tracking_code_in_use(&self, _code: &str) -> Result<bool, AppError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn invoice_number_in_use(&self, _number: &str) -> Result<bool, AppError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn assert_pattern(candidate: &str) {
        assert_eq!(candidate.len(), TRACKING_LEN);
        for (position, ch) in candidate.chars().enumerate() {
            if DIGIT_POSITIONS.contains(&position) {
                assert!(ch.is_ascii_digit(), "position {position} of {candidate}");
            } else {
                assert!(
                    ch.is_ascii_uppercase(),
                    "position {position} of {candidate}"
                );
            }
        }
    }

    #[tokio::test]
    async fn tracking_numbers_follow_the_pattern() {
        for _ in 0..200 {
            let code = unique_tracking_number(&NeverTaken, None).await.unwrap();
            assert_pattern(&code);
        }
    }

    #[tokio::test]
    async fn ph_route_hint_applies_prefix() {
        let code = unique_tracking_number(&NeverTaken, Some(ServiceCode::PhToUae))
            .await
            .unwrap();
        assert!(code.starts_with("PHL"));
        assert_pattern(&code);

        let code = unique_tracking_number(&NeverTaken, Some(ServiceCode::UaeToPh))
            .await
            .unwrap();
        assert_pattern(&code);
    }

    #[tokio::test]
    async fn invoice_numbers_are_inv_plus_six_digits() {
        for _ in 0..200 {
            let number = unique_invoice_number(&NeverTaken).await.unwrap();
            let digits = number.strip_prefix("INV-").unwrap();
            assert_eq!(digits.len(), 6);
            assert!(digits.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn exhausted_attempts_fall_back_to_timestamp_suffix() {
        let index = AlwaysTaken::default();
        let code = unique_tracking_number(&index, Some(ServiceCode::PhToUae))
            .await
            .unwrap();

        assert_eq!(index.checks.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert!(code.len() > TRACKING_LEN);
        assert!(code.starts_with("PHL"));
        assert_pattern(&code[..TRACKING_LEN]);
        assert!(code[TRACKING_LEN..].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn invoice_fallback_keeps_prefix() {
        let index = AlwaysTaken::default();
        let number = unique_invoice_number(&index).await.unwrap();

        assert_eq!(index.checks.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert!(number.starts_with("INV-"));
        assert!(number.len() > "INV-".len() + 6);
    }
}
