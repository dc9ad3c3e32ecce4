//! Human-readable order numbers.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use common::TenantId;

/// Produces order numbers for new orders.
///
/// Numbers only need to be unique within a tenant. The store enforces that
/// with a unique constraint, so a generator may be optimistic.
pub trait OrderNumberGenerator: Send + Sync {
    fn next(&self, tenant_id: TenantId) -> String;
}

/// `ORD` followed by the wall-clock time in milliseconds.
///
/// Numbers handed out by one instance are strictly increasing: two requests
/// landing in the same millisecond get consecutive values.
#[derive(Debug, Default)]
pub struct TimestampOrderNumbers {
    last: AtomicI64,
}

impl TimestampOrderNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

impl OrderNumberGenerator for TimestampOrderNumbers {
    fn next(&self, _tenant_id: TenantId) -> String {
        format!("ORD{}", self.next_millis())
    }
}
