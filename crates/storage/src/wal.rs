use std::sync::atomic::{AtomicU64, Ordering};

use crate::typedef::Lsn;

/// Durability gate between the buffer pool and the write-ahead log.
///
/// Before a dirty frame is written back, the pool checks that every log
/// record covering the frame (everything up to the frame's LSN) is durable,
/// and forces the log if not. Only the durability cursor lives here; log
/// records and recovery belong to the log subsystem.
#[derive(Debug, Default)]
pub struct LogManager {
    persistent_lsn: AtomicU64,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            persistent_lsn: AtomicU64::new(0),
        }
    }

    /// The highest LSN known to be durable.
    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::Acquire)
    }

    /// Forces the log durable up to `lsn`. Calls with an `lsn` at or below
    /// the durability cursor are no-ops.
    pub fn flush_up_to(&self, lsn: Lsn) {
        self.persistent_lsn.fetch_max(lsn, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_manager_cursor_never_regresses() {
        let log_manager = LogManager::new();
        assert_eq!(log_manager.persistent_lsn(), 0);

        log_manager.flush_up_to(10);
        assert_eq!(log_manager.persistent_lsn(), 10);

        log_manager.flush_up_to(3);
        assert_eq!(log_manager.persistent_lsn(), 10);

        log_manager.flush_up_to(11);
        assert_eq!(log_manager.persistent_lsn(), 11);
    }
}
