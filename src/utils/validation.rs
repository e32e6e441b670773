use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// JSON numbers arrive as `f64`; stored values keep two decimals.
pub fn decimal_2dp(value: f64, field: &str) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .ok_or_else(|| Error::BadRequest(format!("{} is not a valid number", field)))
}

/// `from` must precede `until` when both bounds are present.
pub fn validate_window(
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<()> {
    match (from, until) {
        (Some(f), Some(u)) if f >= u => Err(Error::BadRequest(
            "availableFrom must be earlier than availableUntil".to_string(),
        )),
        _ => Ok(()),
    }
}

/// A sub-window may only narrow the bounds the outer window sets.
pub fn validate_sub_window(
    outer_from: Option<DateTime<Utc>>,
    outer_until: Option<DateTime<Utc>>,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<()> {
    validate_window(from, until)?;
    if let (Some(outer), Some(inner)) = (outer_from, from) {
        if inner < outer {
            return Err(Error::BadRequest(
                "Assignment window starts before the exam opens".to_string(),
            ));
        }
    }
    if let (Some(outer), Some(inner)) = (outer_until, until) {
        if inner > outer {
            return Err(Error::BadRequest(
                "Assignment window ends after the exam closes".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn decimals_are_rounded_to_cents() {
        assert_eq!(decimal_2dp(62.5, "score").unwrap(), Decimal::new(625, 1));
        assert_eq!(decimal_2dp(7.456, "score").unwrap(), Decimal::new(746, 2));
        assert!(decimal_2dp(f64::NAN, "score").is_err());
    }

    #[test]
    fn window_requires_ordered_bounds() {
        let now = Utc::now();
        assert!(validate_window(Some(now), Some(now + Duration::hours(1))).is_ok());
        assert!(validate_window(Some(now), None).is_ok());
        assert!(matches!(
            validate_window(Some(now), Some(now)),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn sub_window_must_stay_inside_exam_window() {
        let now = Utc::now();
        let (from, until) = (Some(now), Some(now + Duration::days(7)));

        assert!(validate_sub_window(from, until, Some(now + Duration::days(1)), Some(now + Duration::days(2))).is_ok());
        assert!(validate_sub_window(from, until, None, None).is_ok());
        assert!(validate_sub_window(None, None, Some(now - Duration::days(30)), None).is_ok());
        assert!(validate_sub_window(from, until, Some(now - Duration::hours(1)), None).is_err());
        assert!(validate_sub_window(from, until, None, Some(now + Duration::days(8))).is_err());
    }
}
