use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use sqlx::SqliteConnection;

use crate::errors::{AppError, AppResult};

use super::PickupConfig;

/// Draws one zero-padded numeric code of the given width.
pub fn draw_code(length: u32) -> String {
    let space = 10u64.pow(length);
    let value = OsRng.next_u64() % space;
    format!("{value:0width$}", width = length as usize)
}

/// Shape check for inbound code values, applied before any storage
/// round trip.
pub fn validate_code_shape(code: &str, length: u32) -> AppResult<()> {
    if code.len() != length as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::bad_request(format!(
            "pickup code must be exactly {length} digits"
        )));
    }
    Ok(())
}

/// Draws a code that is unique among all codes ever stored, consumed and
/// expired ones included.
///
/// Collisions are retried up to the configured bound; running out means
/// the code space is too small for current load, which is surfaced as an
/// operational alert and never retried by callers. The UNIQUE constraint
/// on the `code` column remains the final backstop at insert time.
pub async fn generate(
    conn: &mut SqliteConnection,
    config: &PickupConfig,
    now: DateTime<Utc>,
) -> AppResult<(String, DateTime<Utc>)> {
    for _ in 0..config.max_generation_attempts {
        let code = draw_code(config.code_length);

        let taken: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM pickup_codes WHERE code = ?")
            .bind(&code)
            .fetch_one(&mut *conn)
            .await?;

        if taken == 0 {
            return Ok((code, now + Duration::hours(config.ttl_hours)));
        }
    }

    tracing::error!(
        code_length = config.code_length,
        attempts = config.max_generation_attempts,
        "pickup code space exhausted"
    );
    Err(AppError::exhausted(format!(
        "no unique {}-digit code found after {} attempts",
        config.code_length, config.max_generation_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawn_codes_are_fixed_width_digits() {
        for length in [1, 4, 6, 9] {
            for _ in 0..50 {
                let code = draw_code(length);
                assert_eq!(code.len(), length as usize);
                assert!(code.bytes().all(|b| b.is_ascii_digit()), "bad code {code:?}");
            }
        }
    }

    #[test]
    fn shape_check_rejects_wrong_width_and_non_digits() {
        assert!(validate_code_shape("123456", 6).is_ok());
        assert!(validate_code_shape("12345", 6).is_err());
        assert!(validate_code_shape("1234567", 6).is_err());
        assert!(validate_code_shape("12a456", 6).is_err());
        assert!(validate_code_shape("", 6).is_err());
    }
}
