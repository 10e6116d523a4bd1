// Copyright 2025 RADAR-base
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Connection health tracking for the REST proxy

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ProducerError, Result};

/// Last known state of the connection to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Connected,
    Disconnected,
    Unknown,
    Unauthorized,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Connected => "CONNECTED",
            State::Disconnected => "DISCONNECTED",
            State::Unknown => "UNKNOWN",
            State::Unauthorized => "UNAUTHORIZED",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    last_success: Option<Instant>,
    timeout: Duration,
}

/// Connection state shared between all senders of one server
///
/// A successful request marks the connection as [`State::Connected`] for
/// `timeout`; after that, reads report [`State::Unknown`] again until a new
/// connection check or request succeeds. Decay happens lazily on read.
#[derive(Debug)]
pub struct ConnectionState {
    inner: Mutex<Inner>,
}

impl ConnectionState {
    /// Create a connection state in [`State::Unknown`]
    ///
    /// Fails with `InvalidArgument` if `timeout` is zero.
    pub fn new(timeout: Duration) -> Result<Self> {
        validate_timeout(timeout)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                state: State::Unknown,
                last_success: None,
                timeout,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, decaying CONNECTED to UNKNOWN once the timeout passed
    pub fn current_state(&self) -> State {
        let mut inner = self.lock();
        if inner.state == State::Connected {
            let expired = inner
                .last_success
                .map_or(true, |at| at.elapsed() > inner.timeout);
            if expired {
                debug!("Connection state expired after {:?}", inner.timeout);
                inner.state = State::Unknown;
                inner.last_success = None;
            }
        }
        inner.state
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = State::Connected;
        inner.last_success = Some(Instant::now());
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        if inner.state != State::Disconnected {
            warn!("Lost connection to server (was {})", inner.state);
        }
        inner.state = State::Disconnected;
        inner.last_success = None;
    }

    pub fn record_unauthorized(&self) {
        let mut inner = self.lock();
        inner.state = State::Unauthorized;
        inner.last_success = None;
    }

    /// Forget the current state and its timer
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = State::Unknown;
        inner.last_success = None;
    }

    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        validate_timeout(timeout)?;
        self.lock().timeout = timeout;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.lock().timeout
    }
}

fn validate_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(ProducerError::InvalidArgument(
            "connection state timeout must be positive".to_string(),
        ));
    }
    Ok(())
}
