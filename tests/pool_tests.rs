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

use radar_rest_producer::config::TlsMode;
use radar_rest_producer::{ConnectionPool, ProducerError};
use std::sync::Arc;

#[test]
fn test_pool_starts_unallocated() {
    let pool = ConnectionPool::new(TlsMode::System);
    assert_eq!(pool.ref_count(), 0);
    assert!(!pool.is_allocated());
}

#[test]
fn test_n_acquires_then_n_releases_frees_pool() {
    let pool = ConnectionPool::new(TlsMode::System);
    let n = 5;
    for _ in 0..n {
        pool.acquire().unwrap();
    }
    assert_eq!(pool.ref_count(), n);
    assert!(pool.is_allocated());

    for i in 0..n {
        assert!(pool.is_allocated(), "freed before release {}", i + 1);
        pool.release().unwrap();
    }
    assert_eq!(pool.ref_count(), 0);
    assert!(!pool.is_allocated());
}

#[test]
fn test_extra_release_is_illegal_state() {
    let pool = ConnectionPool::new(TlsMode::System);
    pool.acquire().unwrap();
    pool.acquire().unwrap();
    pool.release().unwrap();
    pool.release().unwrap();

    assert!(matches!(pool.release(), Err(ProducerError::IllegalState(_))));
    assert_eq!(pool.ref_count(), 0);
}

#[test]
fn test_pool_rebuilds_after_free() {
    let pool = ConnectionPool::new(TlsMode::System);
    pool.acquire().unwrap();
    pool.release().unwrap();
    assert!(!pool.is_allocated());

    pool.acquire().unwrap();
    assert!(pool.is_allocated());
    pool.release().unwrap();
}

#[test]
fn test_handles_release_on_drop() {
    let pool = Arc::new(ConnectionPool::new(TlsMode::Unsafe));
    let first = pool.handle().unwrap();
    let second = pool.handle().unwrap();
    assert_eq!(pool.ref_count(), 2);
    assert_eq!(first.pool().tls_mode(), TlsMode::Unsafe);

    drop(first);
    assert_eq!(pool.ref_count(), 1);
    assert!(pool.is_allocated());

    drop(second);
    assert_eq!(pool.ref_count(), 0);
    assert!(!pool.is_allocated());
}

#[test]
fn test_handle_released_on_error_path() {
    fn failing_operation(pool: &Arc<ConnectionPool>) -> Result<(), ProducerError> {
        let _client = pool.handle()?;
        Err(ProducerError::Transport("connection refused".to_string()))
    }

    let pool = Arc::new(ConnectionPool::new(TlsMode::System));
    assert!(failing_operation(&pool).is_err());
    assert_eq!(pool.ref_count(), 0);
    assert!(!pool.is_allocated());
}

#[test]
fn test_shared_pool_is_process_wide() {
    let a = ConnectionPool::shared();
    let b = ConnectionPool::shared();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.tls_mode(), TlsMode::System);
}
