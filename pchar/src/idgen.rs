use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// First number handed out; 0-2 stay free for the standard streams
const FIRST_FD: i64 = 3;

/// Number identifying one open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd {
    id: i64,
}

impl Fd {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Thread-safe fd generator
///
/// Numbers are never reused, so a stale fd cannot alias a newer open.
#[derive(Debug)]
pub struct FdGen {
    next_id: AtomicI64,
}

impl FdGen {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(FIRST_FD),
        }
    }

    pub fn get_next(&self) -> Fd {
        Fd::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for FdGen {
    fn default() -> Self {
        Self::new()
    }
}
