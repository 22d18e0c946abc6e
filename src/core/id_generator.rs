// Snowflake-style 64-bit id generation
// ID format: [timestamp:42][shard_id:10][sequence:12]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Generates unique, roughly time-ordered entity ids. One logical shard
/// is enough for this deployment; the shard bits stay in the layout so
/// ids remain portable.
///
/// Timestamp and sequence live in one packed atomic claimed by
/// compare-exchange, so two callers racing into a fresh millisecond
/// cannot both take sequence zero.
#[derive(Debug)]
pub struct IdGenerator {
    shard_id: u16,
    // [timestamp:52][sequence:12]
    state: AtomicU64,
}

impl IdGenerator {
    pub fn new(shard_id: u16) -> Self {
        assert!(shard_id < 1024, "Shard ID must be less than 1024");

        Self {
            shard_id,
            state: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> i64 {
        loop {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before Unix epoch")
                .as_millis() as u64;

            let state = self.state.load(Ordering::Acquire);
            let last_ts = state >> SEQUENCE_BITS;
            let sequence = state & SEQUENCE_MASK;

            let (ts, seq) = if now > last_ts {
                (now, 0)
            } else if sequence < SEQUENCE_MASK {
                // same millisecond, or the clock stepped backwards: keep
                // counting within the already-claimed timestamp
                (last_ts, sequence + 1)
            } else {
                // sequence exhausted - wait for the next millisecond
                std::thread::sleep(std::time::Duration::from_millis(1));
                continue;
            };

            let claimed = (ts << SEQUENCE_BITS) | seq;
            if self
                .state
                .compare_exchange(state, claimed, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let id =
                    ((ts & 0x3FFFFFFFFFF) << 22) | ((self.shard_id as u64) << 12) | seq;
                return id as i64;
            }
            // lost the race, retry against the new state
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_unique_and_positive() {
        let generator = IdGenerator::new(0);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = generator.next_id();
            assert!(id > 0);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_concurrent_generation_yields_no_duplicates() {
        let generator = Arc::new(IdGenerator::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = generator.clone();
            handles.push(std::thread::spawn(move || {
                (0..2_000).map(|_| generator.next_id()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8 * 2_000);
    }
}
