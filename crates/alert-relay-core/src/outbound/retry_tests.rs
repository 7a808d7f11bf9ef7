//! Tests for the retry policy

use super::*;
use std::time::Duration;

#[test]
fn test_default_policy_matches_delivery_contract() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.base_delay, Duration::from_secs(1));
    assert_eq!(policy.backoff_multiplier, 2.0);
    assert!(!policy.use_jitter);
    assert_eq!(policy.total_attempts(), 4);
}

#[test]
fn test_backoff_schedule_is_one_two_four_seconds() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
    assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
    assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
}

#[test]
fn test_delay_is_capped_at_max() {
    let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(8), 2.0);

    assert_eq!(policy.calculate_delay(3), Duration::from_secs(8));
    assert_eq!(policy.calculate_delay(9), Duration::from_secs(8));
}

#[test]
fn test_should_retry_bounds() {
    let policy = RetryPolicy::default(); // max_retries = 3

    assert!(policy.should_retry(0));
    assert!(policy.should_retry(1));
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
    assert!(!policy.should_retry(4));
}

#[test]
fn test_jitter_stays_within_range() {
    let policy = RetryPolicy::default().with_jitter(0.25);

    for _ in 0..20 {
        let secs = policy.calculate_delay(0).as_secs_f64();
        assert!((0.75..=1.25).contains(&secs), "delay {} out of range", secs);
    }
}

#[test]
fn test_jitter_percent_is_clamped() {
    let policy = RetryPolicy::default().with_jitter(3.0);
    assert_eq!(policy.jitter_percent, 1.0);

    let policy = RetryPolicy::default().with_jitter(-1.0);
    assert_eq!(policy.jitter_percent, 0.0);
}

#[test]
fn test_retry_state_progression() {
    let policy = RetryPolicy::default();
    let mut state = RetryState::new();

    assert_eq!(state.attempt, 0);
    assert_eq!(state.total_attempts, 1);
    assert!(state.can_retry(&policy));
    assert_eq!(state.get_delay(&policy), Duration::from_secs(1));

    state.next_attempt();
    assert_eq!(state.get_delay(&policy), Duration::from_secs(2));

    state.next_attempt();
    assert_eq!(state.get_delay(&policy), Duration::from_secs(4));

    state.next_attempt();
    assert_eq!(state.attempt, 3);
    assert_eq!(state.total_attempts, 4);
    assert!(!state.can_retry(&policy));
}

#[test]
fn test_exhausting_the_loop_makes_four_attempts() {
    let policy = RetryPolicy::default();
    let mut state = RetryState::new();
    let mut delays = Vec::new();

    while state.can_retry(&policy) {
        delays.push(state.get_delay(&policy));
        state.next_attempt();
    }

    assert_eq!(state.total_attempts, 4);
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}
