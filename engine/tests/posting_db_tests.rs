use engine::document_data_db::DOCUMENT_URL_TABLE;
use engine::{DocId, DocumentDataDb, Environment, PostingDb, StoreConfig, NO_DOC};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn temp_env() -> Environment {
    Environment::open(&StoreConfig::temporary()).unwrap()
}

fn seed_prefix_terms(db: &PostingDb) {
    db.put(b"abc", &[1, 4, 5, 9, 11]).unwrap();
    db.put(b"fir", &[1, 3, 5]).unwrap();
    db.put(b"fire", &[1, 8, 9]).unwrap();
    db.put(b"fore", &[2, 3, 5]).unwrap();
}

#[test]
fn put_then_get_returns_the_list() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();

    db.put(b"fire", &[1, 5, 6]).unwrap();
    assert_eq!(db.get(b"fire").unwrap(), vec![1, 5, 6]);
}

#[test]
fn missing_term_is_empty_not_an_error() {
    let env = temp_env();
    let txn = env.begin_read();
    let db = PostingDb::open(&txn).unwrap();

    assert!(db.get(b"nothing").unwrap().is_empty());
    assert!(db.iterator(b"nothing").unwrap().is_none());
}

#[test]
fn second_put_replaces_the_list() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();

    db.put(b"fire", &[1, 5, 6]).unwrap();
    db.put(b"fire", &[2, 3]).unwrap();
    assert_eq!(db.get(b"fire").unwrap(), vec![2, 3]);
}

#[test]
fn term_iterator_walks_stored_order() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    db.put(b"fire", &[1, 5, 6]).unwrap();

    let mut it = db.iterator(b"fire").unwrap().unwrap();
    assert_eq!(it.current(), NO_DOC);
    for expected in [1, 5, 6] {
        assert_eq!(it.advance(), expected);
        assert_eq!(it.current(), expected);
    }
    assert_eq!(it.advance(), NO_DOC);
    assert_eq!(it.advance(), NO_DOC);
    assert_eq!(it.current(), NO_DOC);
}

#[test]
fn prefix_iterator_unions_matching_terms_only() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    seed_prefix_terms(&db);

    let mut it = db.prefix_iterator(b"fi").unwrap().expect("prefix should match");
    for expected in [1, 3, 5, 8, 9] {
        assert_eq!(it.advance(), expected);
        assert_eq!(it.current(), expected);
    }
    assert_eq!(it.advance(), NO_DOC);
    assert_eq!(it.current(), NO_DOC);
    assert_eq!(it.advance(), NO_DOC);
}

#[test]
fn prefix_iterator_over_committed_data() {
    let env = temp_env();
    {
        let txn = env.begin_write();
        let db = PostingDb::open(&txn).unwrap();
        seed_prefix_terms(&db);
        drop(db);
        txn.commit().unwrap();
    }

    let txn = env.begin_read();
    let db = PostingDb::open(&txn).unwrap();
    let ids: Vec<DocId> = db.prefix_iterator(b"fi").unwrap().unwrap().collect();
    assert_eq!(ids, vec![1, 3, 5, 8, 9]);
    assert_eq!(db.terms_with_prefix(b"f").unwrap(), vec![b"fir".to_vec(), b"fire".to_vec(), b"fore".to_vec()]);
}

#[test]
fn shared_ids_are_emitted_once() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    db.put(b"run", &[4, 7]).unwrap();
    db.put(b"runner", &[7, 9]).unwrap();
    db.put(b"running", &[2, 7]).unwrap();

    let ids: Vec<DocId> = db.prefix_iterator(b"run").unwrap().unwrap().collect();
    assert_eq!(ids, vec![2, 4, 7, 9]);
}

#[test]
fn unmatched_prefix_yields_none() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    seed_prefix_terms(&db);

    assert!(db.prefix_iterator(b"zz").unwrap().is_none());
    assert!(db.prefix_iterator(b"fia").unwrap().is_none());
    assert!(db.terms_with_prefix(b"zz").unwrap().is_empty());
}

#[test]
fn prefix_scan_sees_pending_overwrites_and_deletes() {
    let env = temp_env();
    {
        let txn = env.begin_write();
        let db = PostingDb::open(&txn).unwrap();
        seed_prefix_terms(&db);
        drop(db);
        txn.commit().unwrap();
    }

    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    assert!(db.del(b"fir").unwrap());
    db.put(b"fire", &[20]).unwrap();
    db.put(b"fizz", &[21]).unwrap();

    let ids: Vec<DocId> = db.prefix_iterator(b"fi").unwrap().unwrap().collect();
    assert_eq!(ids, vec![20, 21]);
    assert!(!db.del(b"fir").unwrap());
}

#[test]
fn dropped_write_transaction_leaves_no_trace() {
    let env = temp_env();
    {
        let txn = env.begin_write();
        let db = PostingDb::open(&txn).unwrap();
        db.put(b"ghost", &[1]).unwrap();
    }
    let txn = env.begin_read();
    let db = PostingDb::open(&txn).unwrap();
    assert!(db.get(b"ghost").unwrap().is_empty());
}

#[test]
fn postings_and_document_data_are_isolated() {
    let env = temp_env();
    let txn = env.begin_write();
    let postings = PostingDb::open(&txn).unwrap();
    let urls = DocumentDataDb::open(DOCUMENT_URL_TABLE, &txn).unwrap();

    postings.put(b"fire", &[1, 2]).unwrap();
    urls.put(1, b"file:///home/a.txt").unwrap();
    assert!(urls.del(1).unwrap());

    assert_eq!(postings.get(b"fire").unwrap(), vec![1, 2]);
    assert!(urls.get(2).unwrap().is_none());
    assert_eq!(postings.terms_with_prefix(b"").unwrap(), vec![b"fire".to_vec()]);
}

#[test]
fn data_survives_reopen() {
    let dir = tempdir().unwrap();
    let cfg = StoreConfig::new(dir.path().join("index.db"));
    {
        let env = Environment::open(&cfg).unwrap();
        let txn = env.begin_write();
        let db = PostingDb::open(&txn).unwrap();
        db.put(b"fire", &[1, 5, 6]).unwrap();
        drop(db);
        txn.commit().unwrap();
        env.flush().unwrap();
    }

    let env = Environment::open(&cfg).unwrap();
    let txn = env.begin_read();
    let db = PostingDb::open(&txn).unwrap();
    assert_eq!(db.get(b"fire").unwrap(), vec![1, 5, 6]);
}

#[test]
#[should_panic(expected = "must not be empty")]
fn empty_term_is_a_precondition_violation() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    db.put(b"", &[1]).unwrap();
}

#[test]
#[should_panic(expected = "must not be empty")]
fn empty_list_is_a_precondition_violation() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    db.put(b"fire", &[]).unwrap();
}

#[test]
#[should_panic(expected = "strictly increasing")]
fn unsorted_list_is_rejected() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    db.put(b"fire", &[5, 1]).unwrap();
}

#[test]
#[should_panic(expected = "strictly increasing")]
fn zero_id_is_rejected() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    db.put(b"fire", &[0, 1]).unwrap();
}

#[test]
fn read_transaction_cannot_write() {
    let env = temp_env();
    let txn = env.begin_read();
    let db = PostingDb::open(&txn).unwrap();
    assert!(db.put(b"fire", &[1]).is_err());
}

#[test]
fn prefix_expand_returns_terms_and_union_together() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    seed_prefix_terms(&db);

    let expansion = db.prefix_expand(b"fi").unwrap();
    assert_eq!(expansion.terms, vec![b"fir".to_vec(), b"fire".to_vec()]);
    assert_eq!(expansion.iterator.unwrap().collect::<Vec<_>>(), vec![1, 3, 5, 8, 9]);

    let none = db.prefix_expand(b"zz").unwrap();
    assert!(none.terms.is_empty());
    assert!(none.iterator.is_none());
}

#[test]
fn read_transaction_keeps_its_view_while_another_thread_commits() {
    let env = temp_env();
    {
        let txn = env.begin_write();
        let db = PostingDb::open(&txn).unwrap();
        db.put(b"fir", &[1]).unwrap();
        drop(db);
        txn.commit().unwrap();
    }

    let reader = env.begin_read();
    let db = PostingDb::open(&reader).unwrap();
    assert_eq!(db.get(b"fir").unwrap(), vec![1]);

    let committed = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::channel();
    let writer = {
        let env = env.clone();
        let committed = Arc::clone(&committed);
        thread::spawn(move || {
            let txn = env.begin_write();
            let db = PostingDb::open(&txn).unwrap();
            db.put(b"fir", &[2]).unwrap();
            db.put(b"fire", &[3]).unwrap();
            drop(db);
            ready_tx.send(()).unwrap();
            txn.commit().unwrap();
            committed.store(true, Ordering::SeqCst);
        })
    };

    ready_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(db.get(b"fir").unwrap(), vec![1]);
    let ids: Vec<DocId> = db.prefix_iterator(b"fi").unwrap().unwrap().collect();
    assert_eq!(ids, vec![1]);
    assert_eq!(db.terms_with_prefix(b"fi").unwrap(), vec![b"fir".to_vec()]);
    assert!(!committed.load(Ordering::SeqCst));

    drop(db);
    drop(reader);
    writer.join().unwrap();
    assert!(committed.load(Ordering::SeqCst));

    let txn = env.begin_read();
    let db = PostingDb::open(&txn).unwrap();
    assert_eq!(db.get(b"fir").unwrap(), vec![2]);
    let ids: Vec<DocId> = db.prefix_iterator(b"fi").unwrap().unwrap().collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn readers_run_alongside_each_other_and_an_open_writer() {
    let env = temp_env();
    let txn = env.begin_write();
    let db = PostingDb::open(&txn).unwrap();
    db.put(b"pending", &[1]).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let env = env.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let txn = env.begin_read();
                let db = PostingDb::open(&txn).unwrap();
                // Both readers are open at this point.
                barrier.wait();
                assert!(db.get(b"pending").unwrap().is_empty());
                assert!(db.prefix_iterator(b"pen").unwrap().is_none());
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }

    drop(db);
    txn.commit().unwrap();
    let txn = env.begin_read();
    assert_eq!(PostingDb::open(&txn).unwrap().get(b"pending").unwrap(), vec![1]);
}

#[test]
fn second_writer_waits_for_the_first() {
    let env = temp_env();
    let first = env.begin_write();
    let db = PostingDb::open(&first).unwrap();
    db.put(b"a", &[1]).unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let second = {
        let env = env.clone();
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let txn = env.begin_write();
            acquired.store(true, Ordering::SeqCst);
            let db = PostingDb::open(&txn).unwrap();
            assert_eq!(db.get(b"a").unwrap(), vec![1]);
            db.put(b"b", &[2]).unwrap();
            drop(db);
            txn.commit().unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst));
    drop(db);
    first.commit().unwrap();
    second.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));

    let txn = env.begin_read();
    let db = PostingDb::open(&txn).unwrap();
    assert_eq!(db.get(b"a").unwrap(), vec![1]);
    assert_eq!(db.get(b"b").unwrap(), vec![2]);
}
