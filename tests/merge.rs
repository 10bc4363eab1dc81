//! Integration tests for merge/compaction: live keys survive a merge plus
//! reopen with their latest values and deleted keys stay gone, and the
//! on-disk footprint shrinks.

use bitcask::{Engine, Error, Options};

fn small_file_options(dir: &std::path::Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        data_file_size: 8 * 1024,
        data_file_merge_ratio: 0.0,
        ..Options::default()
    }
}

#[test]
fn merge_preserves_latest_values_and_drops_deleted_and_overwritten_keys() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(small_file_options(dir.path())).unwrap();

    let value = vec![b'v'; 128];
    for i in 0..1000 {
        engine.put(format!("k{i:04}").into_bytes(), value.clone()).unwrap();
    }
    for i in 0..500 {
        for _ in 0..10 {
            engine
                .put(format!("k{i:04}").into_bytes(), format!("latest-{i}").into_bytes())
                .unwrap();
        }
    }
    for i in 500..600 {
        engine.delete(format!("k{i:04}").into_bytes()).unwrap();
    }

    let size_before = engine.stat().unwrap().disk_size;
    engine.merge().unwrap();
    engine.close().unwrap();

    let engine = Engine::open(small_file_options(dir.path())).unwrap();
    let size_after = engine.stat().unwrap().disk_size;

    for i in 0..500 {
        assert_eq!(
            engine.get(format!("k{i:04}").as_bytes()).unwrap(),
            format!("latest-{i}").into_bytes()
        );
    }
    for i in 500..600 {
        assert_eq!(engine.get(format!("k{i:04}").as_bytes()), Err(Error::KeyNotFound));
    }
    for i in 600..1000 {
        assert_eq!(engine.get(format!("k{i:04}").as_bytes()).unwrap(), value);
    }

    assert!(
        size_after < size_before,
        "expected merge to shrink the directory: before={size_before} after={size_after}"
    );
}

#[test]
fn merge_with_no_older_files_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(small_file_options(dir.path())).unwrap();
    engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    engine.merge().unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"1");
}

#[test]
fn merge_ratio_precondition_rejects_when_unmet() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(Options {
        dir_path: dir.path().to_path_buf(),
        data_file_size: 8 * 1024,
        data_file_merge_ratio: 0.99,
        ..Options::default()
    })
    .unwrap();

    let value = vec![b'v'; 128];
    for i in 0..200 {
        engine.put(format!("k{i:04}").into_bytes(), value.clone()).unwrap();
    }

    assert_eq!(engine.merge(), Err(Error::MergeRatioUnreached));
}
