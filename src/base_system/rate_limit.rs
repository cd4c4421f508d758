//! 滑动窗口限流器。
//!
//! 进程级全局限流（不区分客户端 IP），由启动流程构造一次并注入到路由状态中。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Rate limit exceeded: {limit} requests per {per_secs} seconds")]
pub struct RateLimited {
    pub limit: usize,
    pub per_secs: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    per: Duration,
    hits: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize, per: Duration) -> Self {
        Self {
            limit,
            per,
            hits: Mutex::new(VecDeque::with_capacity(limit + 1)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn per(&self) -> Duration {
        self.per
    }

    pub fn check(&self) -> Result<(), RateLimited> {
        self.check_at(Instant::now())
    }

    /// Every call is recorded, including rejected ones, so a client that
    /// keeps hammering the endpoint stays throttled until it backs off for a
    /// full window.
    pub fn check_at(&self, now: Instant) -> Result<(), RateLimited> {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.push_back(now);

        while let Some(&oldest) = hits.front() {
            if now.saturating_duration_since(oldest) >= self.per {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() > self.limit {
            return Err(RateLimited {
                limit: self.limit,
                per_secs: self.per.as_secs(),
            });
        }
        Ok(())
    }
}
