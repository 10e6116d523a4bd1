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

// Reference-counted HTTP connection pool shared between senders

use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TlsMode;
use crate::error::{ProducerError, Result};

static SHARED_POOL: OnceLock<Arc<ConnectionPool>> = OnceLock::new();

#[derive(Debug, Default)]
struct Slot {
    client: Option<Client>,
    ref_count: usize,
}

/// Lazily built HTTP client whose lifetime follows explicit acquire/release
///
/// The first `acquire` builds the underlying client; the matching last
/// `release` drops it, closing all idle connections. Releasing more often
/// than acquiring is an `IllegalState` error.
#[derive(Debug)]
pub struct ConnectionPool {
    tls: TlsMode,
    slot: Mutex<Slot>,
}

impl ConnectionPool {
    pub fn new(tls: TlsMode) -> Self {
        Self {
            tls,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Process-wide pool using system TLS trust
    pub fn shared() -> Arc<ConnectionPool> {
        SHARED_POOL
            .get_or_init(|| Arc::new(ConnectionPool::new(TlsMode::System)))
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_client(&self) -> Result<Client> {
        let mut builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60));

        if self.tls == TlsMode::Unsafe {
            warn!("TLS certificate validation is disabled for this connection pool");
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| ProducerError::Transport(format!("Failed to build HTTP client: {}", e)))
    }

    /// Increment the reference count, building the client if needed
    pub fn acquire(&self) -> Result<Client> {
        let mut slot = self.lock();
        let client = match &slot.client {
            Some(client) => client.clone(),
            None => {
                debug!("Allocating HTTP connection pool");
                let client = self.build_client()?;
                slot.client = Some(client.clone());
                client
            }
        };
        slot.ref_count += 1;
        Ok(client)
    }

    /// Decrement the reference count, freeing the client on the last release
    pub fn release(&self) -> Result<()> {
        let mut slot = self.lock();
        if slot.ref_count == 0 {
            return Err(ProducerError::IllegalState(
                "connection pool released more often than acquired".to_string(),
            ));
        }
        slot.ref_count -= 1;
        if slot.ref_count == 0 {
            debug!("Freeing HTTP connection pool");
            slot.client = None;
        }
        Ok(())
    }

    /// Acquire a handle that releases the pool when dropped
    pub fn handle(self: &Arc<Self>) -> Result<PooledClient> {
        let client = self.acquire()?;
        Ok(PooledClient {
            pool: Arc::clone(self),
            client,
        })
    }

    pub fn ref_count(&self) -> usize {
        self.lock().ref_count
    }

    pub fn is_allocated(&self) -> bool {
        self.lock().client.is_some()
    }

    pub fn tls_mode(&self) -> TlsMode {
        self.tls
    }
}

/// Scoped reference to a [`ConnectionPool`]
#[derive(Debug)]
pub struct PooledClient {
    pool: Arc<ConnectionPool>,
    client: Client,
}

impl PooledClient {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Err(e) = self.pool.release() {
            warn!("Failed to release connection pool: {}", e);
        }
    }
}
