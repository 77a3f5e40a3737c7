//! The withdrawal-authorization engine: pickup code generation, the
//! create/inspect/consume state machine, the manual-override path, and
//! the outcome recorder.

pub mod engine;
pub mod generator;
pub mod recorder;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct PickupConfig {
    /// Width of the numeric code in digits.
    pub code_length: u32,
    /// Fixed lifetime of a guardian-issued code.
    pub ttl_hours: i64,
    /// Upper bound on collision redraws before generation fails.
    pub max_generation_attempts: u32,
}

impl PickupConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let code_length = std::env::var("PICKUP_CODE_LENGTH")
            .map(|val| val.parse::<u32>())
            .unwrap_or(Ok(6))
            .map_err(|_| AppError::configuration("PICKUP_CODE_LENGTH must be a valid integer"))?;

        if !(1..=9).contains(&code_length) {
            return Err(AppError::configuration(
                "PICKUP_CODE_LENGTH must be between 1 and 9",
            ));
        }

        let ttl_hours = std::env::var("PICKUP_CODE_TTL_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(4))
            .map_err(|_| AppError::configuration("PICKUP_CODE_TTL_HOURS must be a valid integer"))?;

        if ttl_hours <= 0 {
            return Err(AppError::configuration("PICKUP_CODE_TTL_HOURS must be positive"));
        }

        let max_generation_attempts = std::env::var("PICKUP_CODE_MAX_ATTEMPTS")
            .map(|val| val.parse::<u32>())
            .unwrap_or(Ok(16))
            .map_err(|_| AppError::configuration("PICKUP_CODE_MAX_ATTEMPTS must be a valid integer"))?;

        if max_generation_attempts == 0 {
            return Err(AppError::configuration("PICKUP_CODE_MAX_ATTEMPTS must be positive"));
        }

        Ok(Self {
            code_length,
            ttl_hours,
            max_generation_attempts,
        })
    }
}
