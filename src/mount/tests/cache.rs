use std::sync::Arc;

use crate::mount::{MountBinding, MountTarget, ResolveCache};

fn resolved(mountpoint: &str, rel: &str) -> (Arc<MountBinding>, String) {
    (
        Arc::new(MountBinding {
            mountpoint: mountpoint.to_owned(),
            target: MountTarget::Memory,
            readonly: false,
        }),
        rel.to_owned(),
    )
}

#[test]
fn test_insert_then_get() {
    let cache = ResolveCache::new(16);
    cache.insert("/toolfs/memory/k".into(), resolved("/toolfs/memory", "k"));

    let (binding, rel) = cache.get("/toolfs/memory/k").expect("cached");
    assert_eq!(binding.mountpoint, "/toolfs/memory");
    assert_eq!(rel, "k");
    assert!(cache.get("/toolfs/memory/other").is_none());
}

#[test]
fn test_flush_drops_everything() {
    let cache = ResolveCache::new(16);
    cache.insert("/toolfs/a".into(), resolved("/toolfs", "a"));
    cache.insert("/toolfs/b".into(), resolved("/toolfs", "b"));

    cache.flush();

    assert!(cache.get("/toolfs/a").is_none());
    assert!(cache.get("/toolfs/b").is_none());
}
