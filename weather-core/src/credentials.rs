use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("At least one upstream API key must be configured")]
pub struct EmptyCredentialPool;

/// Ordered set of upstream credentials with a shared rotation cursor.
///
/// Membership is fixed at construction. The cursor is the only mutable part and
/// is advanced with a compare-and-swap, so concurrent rotations serialize and
/// every observed credential is a member of the pool.
pub struct CredentialPool {
    credentials: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(credentials: Vec<String>) -> Result<Self, EmptyCredentialPool> {
        if credentials.is_empty() {
            return Err(EmptyCredentialPool);
        }

        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn current(&self) -> &str {
        &self.credentials[self.position()]
    }

    /// Advance the cursor by one (wrapping) and return the new current credential.
    pub fn rotate(&self) -> &str {
        let len = self.credentials.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);

        &self.credentials[(previous + 1) % len]
    }

    /// Move off `failed` after the provider rejected it.
    ///
    /// The cursor only advances while it still points at `failed`; if another
    /// request already rotated away from it, the current credential is returned
    /// unchanged. Concurrent callers reporting the same exhausted credential
    /// therefore advance the pool once between them.
    pub fn rotate_from(&self, failed: &str) -> &str {
        let len = self.credentials.len();
        let mut observed = self.position();

        loop {
            if self.credentials[observed] != failed {
                return &self.credentials[observed];
            }

            let next = (observed + 1) % len;
            match self.cursor.compare_exchange(
                observed,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return &self.credentials[next],
                Err(actual) => observed = actual,
            }
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("len", &self.credentials.len())
            .field("cursor", &self.position())
            .finish()
    }
}
