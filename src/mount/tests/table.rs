use std::sync::Arc;

use tempfile::TempDir;

use crate::local::LocalBackend;
use crate::mount::{MountBinding, MountKind, MountTable, MountTarget};
use crate::Error;

fn local_target(dir: &TempDir) -> MountTarget {
    MountTarget::Local(Arc::new(LocalBackend::new(dir.path()).expect("bind")))
}

fn table_with(bindings: Vec<MountBinding>) -> MountTable {
    let table = MountTable::new();
    for binding in bindings {
        table.mount(binding).expect("mount");
    }
    table
}

#[test]
fn test_longest_prefix_wins_within_kind() {
    let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let table = table_with(vec![
        MountBinding {
            mountpoint: "/toolfs/data".into(),
            target: local_target(&a),
            readonly: false,
        },
        MountBinding {
            mountpoint: "/toolfs/data/sub".into(),
            target: local_target(&b),
            readonly: false,
        },
    ]);

    let (binding, rel) = table.resolve("/toolfs/data/sub/file.txt").expect("resolve");
    assert_eq!(binding.mountpoint, "/toolfs/data/sub");
    assert_eq!(rel, "file.txt");

    let (binding, rel) = table.resolve("/toolfs/data/other.txt").expect("resolve");
    assert_eq!(binding.mountpoint, "/toolfs/data");
    assert_eq!(rel, "other.txt");
}

#[test]
fn test_skill_mount_outranks_local_at_same_prefix() {
    let dir = TempDir::new().unwrap();
    let table = table_with(vec![
        MountBinding {
            mountpoint: "/toolfs/tool".into(),
            target: local_target(&dir),
            readonly: false,
        },
        MountBinding {
            mountpoint: "/toolfs/tool/helper".into(),
            target: MountTarget::Skill("helper".into()),
            readonly: false,
        },
    ]);

    let (binding, _) = table.resolve("/toolfs/tool/helper/run").expect("resolve");
    assert_eq!(binding.kind(), MountKind::Skill);
}

#[test]
fn test_virtual_mounts_outrank_local() {
    let dir = TempDir::new().unwrap();
    let table = table_with(vec![
        MountBinding { mountpoint: "/toolfs".into(), target: local_target(&dir), readonly: false },
        MountBinding { mountpoint: "/toolfs/memory".into(), target: MountTarget::Memory, readonly: false },
    ]);

    let (binding, rel) = table.resolve("/toolfs/memory/k").expect("resolve");
    assert_eq!(binding.kind(), MountKind::Memory);
    assert_eq!(rel, "k");
}

#[test]
fn test_unmatched_path_is_not_found() {
    let table = MountTable::new();
    assert!(matches!(table.resolve("/elsewhere/x"), Err(Error::NotFound(_))));
}

#[test]
fn test_duplicate_mountpoint_conflicts() {
    let dir = TempDir::new().unwrap();
    let table = table_with(vec![MountBinding {
        mountpoint: "/toolfs/data".into(),
        target: local_target(&dir),
        readonly: false,
    }]);

    let err = table
        .mount(MountBinding {
            mountpoint: "/toolfs/data".into(),
            target: MountTarget::Memory,
            readonly: false,
        })
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[test]
fn test_relative_mountpoint_rejected() {
    let table = MountTable::new();
    let err = table
        .mount(MountBinding {
            mountpoint: "toolfs/data".into(),
            target: MountTarget::Memory,
            readonly: false,
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_unmount_returns_binding() {
    let dir = TempDir::new().unwrap();
    let table = table_with(vec![MountBinding {
        mountpoint: "/toolfs/data".into(),
        target: local_target(&dir),
        readonly: true,
    }]);

    let binding = table.unmount("/toolfs/data").expect("unmount");
    assert!(binding.readonly);
    assert!(matches!(table.unmount("/toolfs/data"), Err(Error::NotFound(_))));
}

#[test]
fn test_writable_local_excludes_readonly_and_virtual() {
    let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let table = table_with(vec![
        MountBinding { mountpoint: "/toolfs/rw".into(), target: local_target(&a), readonly: false },
        MountBinding { mountpoint: "/toolfs/ro".into(), target: local_target(&b), readonly: true },
        MountBinding { mountpoint: "/toolfs/memory".into(), target: MountTarget::Memory, readonly: false },
    ]);

    let tracked = table.writable_local();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].mountpoint, "/toolfs/rw");
}

#[test]
fn test_path_identity_law() {
    let dir = TempDir::new().unwrap();
    let table = table_with(vec![MountBinding {
        mountpoint: "/toolfs/data".into(),
        target: local_target(&dir),
        readonly: false,
    }]);

    let canonical = "/toolfs/data/a/b.txt";
    let (binding, rel) = table.resolve(canonical).expect("resolve");
    assert_eq!(format!("{}/{}", binding.mountpoint, rel), canonical);
}
