//! Response-pooling gateway wrapper for sustained-load callers.
//!
//! The pool recycles the outer `Box<Response>` allocation. Callers hand the
//! response back with [`PooledGateway::release`] once they are done with it;
//! a response that is never released is simply dropped and freed, losing
//! only the reuse. Callers must not retain references into a response after
//! releasing it.

use std::sync::{Arc, Mutex};

use crate::gateway::Gateway;
use crate::request::{Request, Response, ResponseMeta};

const DEFAULT_POOL_CAPACITY: usize = 64;

pub struct ResponsePool {
    slots: Mutex<Vec<Box<Response>>>,
    capacity: usize,
}

impl ResponsePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn acquire(&self) -> Box<Response> {
        self.slots
            .lock()
            .expect("response pool lock poisoned")
            .pop()
            .unwrap_or_default()
    }

    /// Resets every field before the slot can be reused.
    pub fn release(&self, mut response: Box<Response>) {
        response.success = false;
        response.data = None;
        response.error = None;
        response.meta = ResponseMeta::default();

        let mut slots = self.slots.lock().expect("response pool lock poisoned");
        if slots.len() < self.capacity {
            slots.push(response);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("response pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponsePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

/// Gateway wrapper that serves responses out of a [`ResponsePool`].
pub struct PooledGateway {
    inner: Arc<Gateway>,
    pool: ResponsePool,
}

impl PooledGateway {
    pub fn new(inner: Arc<Gateway>) -> Self {
        Self {
            inner,
            pool: ResponsePool::default(),
        }
    }

    pub fn with_pool(inner: Arc<Gateway>, pool: ResponsePool) -> Self {
        Self { inner, pool }
    }

    pub async fn handle(&self, request: Request) -> Box<Response> {
        let mut slot = self.pool.acquire();
        *slot = self.inner.handle(request).await;
        slot
    }

    pub fn release(&self, response: Box<Response>) {
        self.pool.release(response);
    }
}
