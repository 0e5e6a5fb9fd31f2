use std::{
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

/// Process-unique connection id used to correlate log lines for one socket.
///
/// Seeded from the wall clock so ids differ between restarts, then incremented, so two
/// sockets accepted in the same instant still get distinct ids.
pub fn rand_id() -> u64 {
    static NEXT_CONN_ID: OnceLock<AtomicU64> = OnceLock::new();
    NEXT_CONN_ID
        .get_or_init(|| {
            let seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64;
            AtomicU64::new(seed)
        })
        .fetch_add(1, Ordering::Relaxed)
}
