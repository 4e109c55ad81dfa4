//! OTP generation and verification decisions
//!
//! Codes gate the pickedup (entry-level) and delivered (order-level)
//! transitions. The lockout decision is a pure function over the persisted
//! attempt list and the current time, so it is independent of any scheduling
//! and directly testable.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::models::otp::OtpAttempt;

/// Wrong submissions tolerated before the next one starts a cool-down
pub const ALLOWED_TRIES: usize = 2;

/// Cool-down applied after the tries are exhausted
pub const COOLDOWN_SECS: i64 = 600;

/// Outcome of evaluating a submitted code against the stored one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpDecision {
    /// Codes match; caller may advance the state machine
    Match,
    /// Wrong code; the submission must be appended to the attempt list
    Mismatch { tries_left: usize },
    /// Cool-down in force; nothing is appended, nothing advances
    Locked { remaining_secs: i64 },
}

/// Generate a 4-digit numeric code, zero-padded
pub fn generate_code() -> String {
    let n: u16 = rand::thread_rng().gen_range(0..10000);
    format!("{:04}", n)
}

/// Seconds of cool-down left, if the attempt list has the lockout in force
pub fn lockout_remaining(attempts: &[OtpAttempt], now: DateTime<Utc>) -> Option<i64> {
    if attempts.len() <= ALLOWED_TRIES {
        return None;
    }
    let last = attempts.last()?.at;
    let elapsed = (now - last).num_seconds();
    if elapsed < COOLDOWN_SECS {
        Some(COOLDOWN_SECS - elapsed)
    } else {
        None
    }
}

/// Decide what a submission does, without mutating anything
///
/// The lockout check runs first: during a cool-down even a correct code is
/// rejected. A mismatch that exhausts the allowed tries reports a full
/// cool-down; the caller appends the attempt either way.
pub fn evaluate(
    attempts: &[OtpAttempt],
    stored: &str,
    submitted: &str,
    now: DateTime<Utc>,
) -> OtpDecision {
    if let Some(remaining_secs) = lockout_remaining(attempts, now) {
        return OtpDecision::Locked { remaining_secs };
    }

    if stored == submitted {
        return OtpDecision::Match;
    }

    let tries_used = attempts.len() + 1;
    if tries_used > ALLOWED_TRIES {
        OtpDecision::Locked {
            remaining_secs: COOLDOWN_SECS,
        }
    } else {
        OtpDecision::Mismatch {
            tries_left: ALLOWED_TRIES + 1 - tries_used,
        }
    }
}

/// Decode the persisted JSON attempt list; absent or malformed means empty
pub fn parse_attempts(raw: Option<&serde_json::Value>) -> Vec<OtpAttempt> {
    raw.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Append one failed attempt, returning the JSON to persist
pub fn append_attempt(
    mut attempts: Vec<OtpAttempt>,
    code: &str,
    lat: Option<f64>,
    lng: Option<f64>,
    now: DateTime<Utc>,
) -> (Vec<OtpAttempt>, serde_json::Value) {
    attempts.push(OtpAttempt {
        code: code.to_string(),
        lat,
        lng,
        at: now,
    });
    let json = serde_json::to_value(&attempts).unwrap_or(serde_json::Value::Array(vec![]));
    (attempts, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(secs_ago: i64, now: DateTime<Utc>) -> OtpAttempt {
        OtpAttempt {
            code: "0000".to_string(),
            lat: None,
            lng: None,
            at: now - Duration::seconds(secs_ago),
        }
    }

    #[test]
    fn test_generated_code_is_four_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_correct_code_matches() {
        let now = Utc::now();
        assert_eq!(evaluate(&[], "1234", "1234", now), OtpDecision::Match);
    }

    #[test]
    fn test_mismatch_counts_down_tries() {
        let now = Utc::now();
        assert_eq!(
            evaluate(&[], "1234", "9999", now),
            OtpDecision::Mismatch { tries_left: 2 }
        );
        let one = vec![attempt(30, now)];
        assert_eq!(
            evaluate(&one, "1234", "9999", now),
            OtpDecision::Mismatch { tries_left: 1 }
        );
    }

    #[test]
    fn test_third_wrong_submission_locks() {
        let now = Utc::now();
        let two = vec![attempt(60, now), attempt(30, now)];
        assert_eq!(
            evaluate(&two, "1234", "9999", now),
            OtpDecision::Locked {
                remaining_secs: COOLDOWN_SECS
            }
        );
    }

    #[test]
    fn test_correct_code_rejected_during_cooldown() {
        let now = Utc::now();
        let three = vec![attempt(120, now), attempt(90, now), attempt(60, now)];
        match evaluate(&three, "1234", "1234", now) {
            OtpDecision::Locked { remaining_secs } => {
                assert_eq!(remaining_secs, COOLDOWN_SECS - 60);
            }
            other => panic!("expected lockout, got {:?}", other),
        }
    }

    #[test]
    fn test_correct_code_accepted_after_cooldown_expires() {
        let now = Utc::now();
        let three = vec![
            attempt(COOLDOWN_SECS + 300, now),
            attempt(COOLDOWN_SECS + 200, now),
            attempt(COOLDOWN_SECS + 100, now),
        ];
        assert_eq!(evaluate(&three, "1234", "1234", now), OtpDecision::Match);
    }

    #[test]
    fn test_append_attempt_preserves_order() {
        let now = Utc::now();
        let (attempts, json) = append_attempt(vec![attempt(30, now)], "1111", Some(1.0), None, now);
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1].code, "1111");
        let decoded = parse_attempts(Some(&json));
        assert_eq!(decoded, attempts);
    }

    #[test]
    fn test_parse_attempts_tolerates_absent_column() {
        assert!(parse_attempts(None).is_empty());
        assert!(parse_attempts(Some(&serde_json::json!("garbage"))).is_empty());
    }
}
