//! Rate limiter behavior: each adapter wraps its REST calls in a
//! `governor`-backed token bucket so a burst of strategy signals can't
//! exceed a venue's documented request rate.

use exchange_connectors::RateLimiter;
use std::time::{Duration, Instant};

#[tokio::test]
async fn first_permit_is_immediate() {
    let limiter = RateLimiter::new(10);
    let start = Instant::now();
    limiter.acquire().await;
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn burst_within_quota_completes_quickly() {
    let limiter = RateLimiter::new(5);
    let start = Instant::now();
    for _ in 0..5 {
        limiter.acquire().await;
    }
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn excess_requests_are_throttled() {
    let limiter = RateLimiter::new(10);
    let start = Instant::now();
    for _ in 0..15 {
        limiter.acquire().await;
    }
    // 5 requests over quota at 10/s must wait at least ~400ms.
    assert!(start.elapsed() >= Duration::from_millis(400));
}
