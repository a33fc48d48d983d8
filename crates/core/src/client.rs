//! Lazy, retrying client acquisition.
//!
//! [`ClientCell`] owns a [`Connector`] and the cached client it produced.
//! The first caller to need the client runs the retry loop; callers arriving
//! during warm-up block on that same initialization and share its client, so
//! a driver never opens duplicate connections.
//!
//! ## Retry Sequence
//!
//! ```text
//! attempt 1 -> fail -> sleep(base)
//! attempt 2 -> fail -> sleep(min(base * 2, max))
//! ...
//! attempt n -> fail -> Error::Connection { attempts: n, source: last }
//! ```
//!
//! Warm-ups are numbered. Callers that queued behind a failed warm-up get a
//! copy of its error instead of running their own sequence; a failure is
//! never cached beyond that, so the next caller starts a fresh sequence.

use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Opens one connection to a backend.
///
/// A single call is a single attempt; retrying and caching belong to
/// [`ClientCell`].
pub trait Connector: Send + Sync {
    /// Handle produced by a successful connection
    type Client: Send + Sync;

    /// Make one connection attempt
    fn connect(&self) -> Result<Self::Client>;

    /// Human-readable target for log output
    fn describe(&self) -> String {
        "backend".to_string()
    }
}

/// Connector built from a closure.
pub struct FnConnector<F> {
    f: F,
}

/// Wrap a closure as a [`Connector`].
pub fn connector_fn<C, F>(f: F) -> FnConnector<F>
where
    F: Fn() -> Result<C> + Send + Sync,
    C: Send + Sync,
{
    FnConnector { f }
}

impl<C, F> Connector for FnConnector<F>
where
    F: Fn() -> Result<C> + Send + Sync,
    C: Send + Sync,
{
    type Client = C;

    fn connect(&self) -> Result<C> {
        (self.f)()
    }
}

/// Connection retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts used when no explicit count is given
    pub attempts: u32,
    /// Delay after the first failed attempt
    pub backoff_base: Duration,
    /// Cap for any single delay
    pub backoff_max: Duration,
    /// Stop retrying once this much time has passed
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_secs(2),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
            deadline: None,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

/// Driver connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No client has been established yet
    Unconnected,
    /// A client is cached and shared by all operations
    Connected,
}

/// Lazily connected, shared client handle.
pub struct ClientCell<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    client: OnceCell<Arc<C::Client>>,
    /// Number of finished warm-ups
    generation: AtomicU64,
    /// Held for the duration of a warm-up; keeps the last failure
    warm_up: Mutex<Option<Error>>,
}

impl<C: Connector> ClientCell<C> {
    /// Create an unconnected cell
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            client: OnceCell::new(),
            generation: AtomicU64::new(0),
            warm_up: Mutex::new(None),
        }
    }

    /// The connector used for new attempts
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        if self.client.get().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Unconnected
        }
    }

    /// Check if a client is cached
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Get the client, connecting with the policy's default attempt count
    pub fn get(&self) -> Result<Arc<C::Client>> {
        self.get_with_retries(self.policy.attempts)
    }

    /// Get the client, connecting with up to `retries` attempts.
    ///
    /// `retries == 0` is treated as a single attempt. Callers that waited
    /// on a warm-up which then failed receive that warm-up's error.
    pub fn get_with_retries(&self, retries: u32) -> Result<Arc<C::Client>> {
        if let Some(client) = self.client.get() {
            return Ok(Arc::clone(client));
        }

        let seen = self.generation.load(Ordering::Acquire);
        let mut last_failure = self.warm_up.lock();
        if let Some(client) = self.client.get() {
            return Ok(Arc::clone(client));
        }
        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(err) = last_failure.as_ref() {
                debug!(backend = %self.connector.describe(), "sharing failed warm-up");
                return Err(err.clone());
            }
        }

        let result = match self.connect_with_retry(retries) {
            Ok(client) => {
                *last_failure = None;
                Ok(Arc::clone(self.client.get_or_init(|| client)))
            }
            Err(e) => {
                *last_failure = Some(e.clone());
                Err(e)
            }
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn connect_with_retry(&self, retries: u32) -> Result<Arc<C::Client>> {
        let attempts = retries.max(1);
        let target = self.connector.describe();
        let started = Instant::now();
        let mut last_err = None;

        for attempt in 1..=attempts {
            debug!(backend = %target, attempt, attempts, "connecting");
            match self.connector.connect() {
                Ok(client) => {
                    info!(backend = %target, attempt, "connected");
                    return Ok(Arc::new(client));
                }
                Err(e) => {
                    warn!(backend = %target, attempt, attempts, error = %e, "connection attempt failed");
                    last_err = Some(e);
                }
            }

            if attempt == attempts {
                break;
            }

            let delay = self.policy.delay_for(attempt);
            if let Some(deadline) = self.policy.deadline {
                if started.elapsed() + delay >= deadline {
                    let last = last_err
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default();
                    return Err(Error::Timeout(format!(
                        "connecting to {} exceeded {:?} after {} attempt(s): {}",
                        target, deadline, attempt, last
                    )));
                }
            }
            std::thread::sleep(delay);
        }

        let source = last_err
            .unwrap_or_else(|| Error::Storage(format!("no connection attempt made to {}", target)));
        Err(Error::Connection {
            attempts,
            source: Box::new(source),
        })
    }
}
