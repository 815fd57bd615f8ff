//! Exponential backoff with jitter

use std::time::Duration;

use rand::Rng;

/// Calculate the delay before retry number `retry` (1-indexed: retry 1 is the
/// wait between attempts 1 and 2).
///
/// # Formula
/// `delay = min(initial * coefficient^(retry - 1), maximum) * (1 ± jitter)`
///
/// Non-finite intermediate values (huge exponents, bogus coefficients) are
/// clamped to `maximum`.
pub fn calculate_delay(
    retry: u32,
    initial: Duration,
    maximum: Duration,
    coefficient: f64,
    jitter_factor: f64,
) -> Duration {
    let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
    let scaled = initial.as_secs_f64() * coefficient.max(1.0).powi(exponent);

    let delay = if scaled.is_finite() && scaled < maximum.as_secs_f64() {
        scaled
    } else {
        maximum.as_secs_f64()
    };

    if jitter_factor <= 0.0 || delay == 0.0 {
        return Duration::from_secs_f64(delay);
    }

    let jitter_range = delay * jitter_factor.min(1.0);
    let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::from_secs_f64((delay + jitter).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);
    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_exponential_backoff_calculation() {
        assert_eq!(calculate_delay(1, SECOND, MINUTE, 2.0, 0.0), SECOND);
        assert_eq!(calculate_delay(2, SECOND, MINUTE, 2.0, 0.0), 2 * SECOND);
        assert_eq!(calculate_delay(3, SECOND, MINUTE, 2.0, 0.0), 4 * SECOND);
        assert_eq!(calculate_delay(6, SECOND, MINUTE, 2.0, 0.0), 32 * SECOND);

        // 2^6 = 64s, capped
        assert_eq!(calculate_delay(7, SECOND, MINUTE, 2.0, 0.0), MINUTE);
        assert_eq!(calculate_delay(u32::MAX, SECOND, MINUTE, 2.0, 0.0), MINUTE);
    }

    #[test]
    fn test_fractional_coefficient() {
        let initial = Duration::from_secs(10);
        assert_eq!(
            calculate_delay(2, initial, MINUTE, 1.5, 0.0),
            Duration::from_secs(15)
        );
        // Coefficients below 1 would shrink delays; they are treated as constant backoff
        assert_eq!(calculate_delay(4, initial, MINUTE, 0.5, 0.0), initial);
    }

    #[test]
    fn test_exponential_backoff_with_jitter() {
        let initial = Duration::from_secs(60);
        let maximum = Duration::from_secs(86400);

        for _ in 0..32 {
            let delay = calculate_delay(2, initial, maximum, 2.0, 0.2);
            assert!(
                delay >= Duration::from_secs(96) && delay <= Duration::from_secs(144),
                "Delay {delay:?} should be within jitter range [96s, 144s]"
            );
        }
    }
}
