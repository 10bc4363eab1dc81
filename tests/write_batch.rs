//! Integration tests for transactional write-batch atomicity: committed
//! batches become fully visible, uncommitted ones leave no trace even
//! across a close/open cycle (simulating a crash before the terminator
//! record is written).

use bitcask::{Engine, Error, Options, WriteBatchOptions};

fn options(dir: &std::path::Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        ..Options::default()
    }
}

#[test]
fn committed_batch_is_visible_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = Engine::open(options(dir.path())).unwrap();
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        batch.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        batch.commit().unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(options(dir.path())).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert_eq!(engine.get(b"b").unwrap(), b"2");
}

#[test]
fn uncommitted_batch_vanishes_without_a_trace_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = Engine::open(options(dir.path())).unwrap();
        engine.put(b"pre-existing".to_vec(), b"v".to_vec()).unwrap();

        // Stage but never commit — the terminator record is never
        // written, simulating a crash between the last staged record and
        // the commit's terminator.
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        batch.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        // `batch` is dropped here without `commit()`, leaving no
        // terminator record in the log.
    }

    let engine = Engine::open(options(dir.path())).unwrap();
    assert_eq!(engine.get(b"a"), Err(Error::KeyNotFound));
    assert_eq!(engine.get(b"b"), Err(Error::KeyNotFound));
    assert_eq!(engine.get(b"pre-existing").unwrap(), b"v");
}

#[test]
fn sequence_numbers_never_repeat_across_commits() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(options(dir.path())).unwrap();

    for i in 0..10 {
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch
            .put(format!("k{i}").into_bytes(), format!("v{i}").into_bytes())
            .unwrap();
        batch.commit().unwrap();
    }

    for i in 0..10 {
        assert_eq!(engine.get(format!("k{i}").as_bytes()).unwrap(), format!("v{i}").into_bytes());
    }
}

#[test]
fn batch_put_then_delete_of_same_key_collapses_to_delete() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(options(dir.path())).unwrap();
    engine.put(b"a".to_vec(), b"old".to_vec()).unwrap();

    let batch = engine.new_write_batch(WriteBatchOptions::default());
    batch.put(b"a".to_vec(), b"new".to_vec()).unwrap();
    batch.delete(b"a".to_vec()).unwrap();
    batch.commit().unwrap();

    assert_eq!(engine.get(b"a"), Err(Error::KeyNotFound));
}
