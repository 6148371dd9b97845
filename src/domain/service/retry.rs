// src/domain/service/retry.rs
// Exchange error classification and retry scheduling

use rand::Rng;
use std::time::Duration;

use crate::domain::errors::{ExchangeError, ExecutionError};

/// Message fragments venues use when a listed symbol does not accept orders yet.
pub const DEFAULT_NOT_YET_TRADABLE_PATTERNS: &[&str] = &[
    "not yet tradable",
    "trading not open",
    "symbol not found",
    "invalid symbol",
    "not available for trading",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "too many requests",
    "rate limit",
    "temporarily unavailable",
    "service unavailable",
    "bad gateway",
    "internal server error",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    NotYetTradable,
    Permanent,
    Cancelled,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient | ErrorClass::NotYetTradable)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    not_yet_tradable_patterns: Vec<String>,
    transient_base_delay: Duration,
    transient_max_delay: Duration,
    transient_max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_NOT_YET_TRADABLE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            Duration::from_millis(250),
            Duration::from_secs(5),
            5,
        )
    }
}

impl RetryPolicy {
    pub fn new(
        not_yet_tradable_patterns: Vec<String>,
        transient_base_delay: Duration,
        transient_max_delay: Duration,
        transient_max_retries: u32,
    ) -> Self {
        Self {
            not_yet_tradable_patterns: not_yet_tradable_patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            transient_base_delay,
            transient_max_delay,
            transient_max_retries,
        }
    }

    pub fn transient_max_retries(&self) -> u32 {
        self.transient_max_retries
    }

    pub fn classify(&self, error: &ExchangeError) -> ErrorClass {
        match error {
            ExchangeError::Cancelled => ErrorClass::Cancelled,
            ExchangeError::NotYetTradable(_) | ExchangeError::InvalidSymbol(_) => {
                ErrorClass::NotYetTradable
            }
            ExchangeError::Connection(_) | ExchangeError::RateLimit(_) | ExchangeError::Server(_) => {
                ErrorClass::Transient
            }
            ExchangeError::Authentication(_)
            | ExchangeError::InsufficientFunds(_)
            | ExchangeError::Request(_)
            | ExchangeError::Unsupported(_) => ErrorClass::Permanent,
            ExchangeError::Order(message) | ExchangeError::Api(message) => self.classify_message(message),
        }
    }

    /// Classify an untyped venue message. Unrecognised text is permanent so
    /// we never hammer the venue with a request it keeps refusing.
    pub fn classify_message(&self, message: &str) -> ErrorClass {
        let lower = message.to_lowercase();
        if self.is_not_yet_tradable_message(&lower) {
            ErrorClass::NotYetTradable
        } else if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        }
    }

    fn is_not_yet_tradable_message(&self, lower: &str) -> bool {
        self.not_yet_tradable_patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    /// Constant spacing: a listing opens at a fixed moment, so polling it
    /// faster or slower than the configured interval buys nothing.
    pub fn not_yet_tradable_backoff(&self, interval: Duration) -> Backoff {
        Backoff::new(interval, interval)
    }

    pub fn transient_backoff(&self) -> Backoff {
        Backoff::new(self.transient_base_delay, self.transient_max_delay)
    }

    /// Map a non-retryable gateway failure onto what callers see.
    pub fn terminal_error(&self, error: &ExchangeError) -> ExecutionError {
        match error {
            ExchangeError::Cancelled => ExecutionError::Cancelled,
            ExchangeError::Authentication(msg) => ExecutionError::Unauthorized(msg.clone()),
            ExchangeError::InsufficientFunds(msg) => ExecutionError::InsufficientFunds(msg.clone()),
            other => {
                let message = other.to_string();
                if message.to_lowercase().contains("insufficient") {
                    ExecutionError::InsufficientFunds(message)
                } else {
                    ExecutionError::InvalidRequest(message)
                }
            }
        }
    }
}

/// Exponential backoff with full jitter above a floor of `base`:
/// `delay_n = base + U[0, min(cap, base * 2^n) - base]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay: max_delay.max(base),
            attempt: 0,
        }
    }

    /// Upper bound of the next delay, without jitter.
    pub fn ceiling(&self) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.max_delay)
    }

    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        let spread = ceiling.saturating_sub(self.base);
        let jitter = if spread.is_zero() {
            Duration::ZERO
        } else {
            let secs = rand::thread_rng().gen_range(0.0..=spread.as_secs_f64());
            Duration::from_secs_f64(secs)
        };
        self.attempt = self.attempt.saturating_add(1);
        self.base + jitter
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
