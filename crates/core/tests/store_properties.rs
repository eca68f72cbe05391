//! Store-level behaviour exercised through the public API

use rstore_core::paths::{self, Validation};
use rstore_core::{FileSystemResourceStore, ResourceStore, ResourceType};
use std::collections::HashSet;
use tempfile::TempDir;

fn store() -> (TempDir, FileSystemResourceStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemResourceStore::open(temp_dir.path(), Validation::Strict).unwrap();
    (temp_dir, store)
}

#[test]
fn test_repeated_get_yields_equal_resources() {
    let (_tmp, store) = store();
    store.get("a/b.txt").unwrap().write_all(b"x").unwrap();

    for path in ["", "a", "a/b.txt", "missing/thing"] {
        let first = store.get(path).unwrap();
        let second = store.get(path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.resource_type(), second.resource_type());

        let mut set = HashSet::new();
        set.insert(first);
        assert!(set.contains(&second));
    }

    // equivalent spellings normalize to the same resource
    assert_eq!(store.get("a//b.txt/").unwrap(), store.get("a/b.txt").unwrap());
    assert!(store.get("/a/b.txt").is_err());
}

#[test]
fn test_resources_from_different_stores_differ() {
    let (tmp, store) = store();
    let other = FileSystemResourceStore::open(tmp.path(), Validation::Strict).unwrap();
    assert_ne!(store.get("a").unwrap(), other.get("a").unwrap());
    assert!(store
        .get("a")
        .unwrap()
        .rename_to(&other.get("b").unwrap())
        .is_err());
}

#[test]
fn test_parent_child_consistency() {
    let (_tmp, store) = store();
    for path in ["dir/f1", "dir/f2", "dir/sub/f3", "dir/sub/deeper/f4"] {
        store.get(path).unwrap().write_all(path.as_bytes()).unwrap();
    }

    let mut pending = vec![store.get("dir").unwrap()];
    while let Some(dir) = pending.pop() {
        let children = dir.list().unwrap();
        assert!(!children.is_empty());
        for child in children {
            assert_eq!(child.parent().unwrap(), dir);
            assert!(dir.list().unwrap().contains(&child));
            if child.resource_type() == ResourceType::Directory {
                pending.push(child);
            }
        }
    }
    assert!(store.root_resource().parent().is_none());
}

#[test]
fn test_delete_lifecycle() {
    let (_tmp, store) = store();
    let leaf = store.get("x/leaf").unwrap();
    leaf.write_all(b"1").unwrap();

    assert!(leaf.delete().unwrap());
    assert_eq!(leaf.resource_type(), ResourceType::Undefined);
    assert!(!leaf.delete().unwrap());
    assert!(leaf.last_modified().unwrap().is_none());
    // parent directory survives
    assert_eq!(store.get("x").unwrap().resource_type(), ResourceType::Directory);
}

#[test]
fn test_rename_preserves_content() {
    let (_tmp, store) = store();
    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let src = store.get("data/in.bin").unwrap();
    src.write_all(&data).unwrap();
    let dst = store.get("archive/2024/out.bin").unwrap();
    assert_eq!(dst.resource_type(), ResourceType::Undefined);

    assert!(store.move_to("data/in.bin", "archive/2024/out.bin").unwrap());

    assert_eq!(src.resource_type(), ResourceType::Undefined);
    assert_eq!(dst.resource_type(), ResourceType::Resource);
    assert_eq!(dst.read_all().unwrap(), data);
}

#[test]
fn test_rename_directory_subtree() {
    let (_tmp, store) = store();
    store.get("DirA/FileA1").unwrap().write_all(b"a1").unwrap();
    store.get("DirA/DirC/FileC1").unwrap().write_all(b"c1").unwrap();

    assert!(store.move_to("DirA", "DirB").unwrap());

    assert_eq!(store.get("DirA").unwrap().resource_type(), ResourceType::Undefined);
    assert_eq!(store.get("DirB/FileA1").unwrap().read_all().unwrap(), b"a1");
    assert_eq!(store.get("DirB/DirC/FileC1").unwrap().read_all().unwrap(), b"c1");
}

#[test]
fn test_type_is_requeried_after_external_change() {
    let (tmp, store) = store();
    let res = store.get("external.txt").unwrap();
    assert_eq!(res.resource_type(), ResourceType::Undefined);

    std::fs::write(tmp.path().join("external.txt"), b"outside").unwrap();
    assert_eq!(res.resource_type(), ResourceType::Resource);

    std::fs::remove_file(tmp.path().join("external.txt")).unwrap();
    std::fs::create_dir(tmp.path().join("external.txt")).unwrap();
    assert_eq!(res.resource_type(), ResourceType::Directory);
}

#[test]
fn test_native_handles() {
    let (tmp, store) = store();
    let file = store.get("native/file.txt").unwrap().file().unwrap();
    assert_eq!(file, tmp.path().join("native").join("file.txt"));
    assert!(file.is_file());

    let dir = store.get("native/dir").unwrap().dir().unwrap();
    assert!(dir.is_dir());
    assert!(store.get("native/dir").unwrap().file().unwrap_err().is_state());
}

#[test]
fn test_lenient_store_accepts_blocked_characters() {
    let temp_dir = TempDir::new().unwrap();
    let strict = FileSystemResourceStore::open(temp_dir.path(), Validation::Strict).unwrap();
    let lenient = FileSystemResourceStore::open(temp_dir.path(), Validation::Lenient).unwrap();

    assert!(strict.get("a&b").is_err());
    let res = lenient.get("a&b").unwrap();
    assert_eq!(res.path(), paths::normalize("a&b", Validation::Lenient).unwrap());
    assert!(lenient.get("a/../b").is_err());
}
