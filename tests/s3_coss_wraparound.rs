//! Three ~400 KB objects into a 1 MB/512-byte-block COSS stripe: the third
//! write must wrap `current_offset` back to 0 and evict the first object,
//! whose backing range the wrapped membuf now owns.

use squidcore::aio::{BufferPools, IoThreadPool};
use squidcore::cache_key::CacheKey;
use squidcore::store::coss::{CossDir, WriteOutcome};

#[test]
fn third_write_wraps_and_evicts_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let pools: &'static BufferPools = Box::leak(Box::new(BufferPools::new()));
    let pool: &'static IoThreadPool = Box::leak(Box::new(IoThreadPool::start(1, 1, pools)));

    let max_size = 1024 * 1024;
    let membuf_capacity = 400 * 1024;
    let mut coss = CossDir::open(&dir.path().join("stripe"), max_size, 512, membuf_capacity, pool, pools).unwrap();

    let k1 = CacheKey::new([1; 16]);
    let k2 = CacheKey::new([2; 16]);
    let k3 = CacheKey::new([3; 16]);
    let body = vec![0x42u8; 400 * 1024];

    let mut evicted = Vec::new();
    assert_eq!(coss.write(k1, &body, &mut |k| evicted.push(k)), WriteOutcome::Written(0));
    assert!(evicted.is_empty());

    assert!(matches!(coss.write(k2, &body, &mut |k| evicted.push(k)), WriteOutcome::Written(_)));
    assert!(evicted.is_empty(), "second write still fits before current_offset reaches max_size");

    assert!(matches!(coss.write(k3, &body, &mut |k| evicted.push(k)), WriteOutcome::Written(_)));
    assert_eq!(coss.current_size(), 0, "the third rotation wraps current_offset back to 0");
    assert_eq!(evicted, vec![k1], "wrapping to offset 0 reclaims the first object's range");

    coss.sync();
}
