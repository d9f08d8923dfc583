//! Atomicity and isolation of store transactions

use kvstore::prelude::*;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug)]
struct InsufficientFunds {
    have: i64,
    need: i64,
}

impl std::fmt::Display for InsufficientFunds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "insufficient funds: have {}, need {}", self.have, self.need)
    }
}

impl std::error::Error for InsufficientFunds {}

fn open_accounts() -> (Store<String, i64>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = kvstore::open_at(temp_dir.path().join("bank.db"), "accounts").unwrap();
    (store, temp_dir)
}

fn transfer(store: &Store<String, i64>, from: &str, to: &str, amount: i64) -> Result<()> {
    store.run_transaction(|tx| {
        let have = tx.get(from)?;
        if have < amount {
            return Err(anyhow::Error::new(InsufficientFunds { have, need: amount }).into());
        }
        tx.set(from.to_string(), have - amount)?;
        tx.update(to, |balance| Ok(balance.unwrap_or(0) + amount))?;
        Ok(())
    })
}

#[test]
fn test_commit_makes_all_writes_visible() -> Result<()> {
    let (store, _temp) = open_accounts();
    store.set("alice".into(), 100)?;

    transfer(&store, "alice", "bob", 30)?;

    assert_eq!(store.get("alice")?, 70);
    assert_eq!(store.get("bob")?, 30);
    Ok(())
}

#[test]
fn test_failure_leaves_state_untouched() -> Result<()> {
    let (store, _temp) = open_accounts();
    store.set("alice".into(), 100)?;
    let before = store.entries(Direction::Forward)?;

    let err = store
        .run_transaction(|tx| {
            tx.set("alice".into(), 0)?;
            tx.set("carol".into(), 100)?;
            tx.delete("alice")?;
            tx.clear()?;
            Err::<(), _>(KvError::Config("abort".into()))
        })
        .unwrap_err();

    assert!(matches!(err, KvError::Config(_)));
    assert_eq!(store.entries(Direction::Forward)?, before);
    Ok(())
}

#[test]
fn test_custom_error_is_returned_unchanged() -> Result<()> {
    let (store, _temp) = open_accounts();
    store.set("alice".into(), 10)?;

    let err = transfer(&store, "alice", "bob", 50).unwrap_err();
    let inner = match err {
        KvError::Other(inner) => inner,
        other => panic!("expected application error, got {:?}", other),
    };
    let funds = inner.downcast_ref::<InsufficientFunds>().unwrap();
    assert_eq!(funds.have, 10);
    assert!(!store.has("bob")?);
    Ok(())
}

#[test]
fn test_uncommitted_writes_are_isolated() -> Result<()> {
    let (store, _temp) = open_accounts();
    store.set("k".into(), 1)?;

    store.run_transaction(|tx| {
        tx.set("k".into(), 2)?;
        tx.set("new".into(), 3)?;

        // Inside: sees its own writes
        assert_eq!(tx.get("k")?, 2);
        assert!(tx.has("new")?);

        // Outside, on another connection: still the committed state
        assert_eq!(store.get("k")?, 1);
        assert!(!store.has("new")?);
        Ok(())
    })?;

    assert_eq!(store.get("k")?, 2);
    assert_eq!(store.get("new")?, 3);
    Ok(())
}

#[test]
fn test_isolation_from_another_thread() -> Result<()> {
    let (store, _temp) = open_accounts();
    let store = Arc::new(store);
    store.set("k".into(), 1)?;

    let (written_tx, written_rx) = crossbeam_channel::bounded::<()>(0);
    let (checked_tx, checked_rx) = crossbeam_channel::bounded::<i64>(0);

    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            written_rx.recv().unwrap();
            checked_tx.send(store.get("k").unwrap()).unwrap();
        })
    };

    store.run_transaction(|tx| {
        tx.set("k".into(), 2)?;
        written_tx.send(()).unwrap();
        let seen_outside = checked_rx.recv().unwrap();
        assert_eq!(seen_outside, 1);
        Ok(())
    })?;

    reader.join().unwrap();
    assert_eq!(store.get("k")?, 2);
    Ok(())
}

#[test]
fn test_iteration_inside_transaction() -> Result<()> {
    let (store, _temp) = open_accounts();
    store.set("b".into(), 2)?;

    let keys = store.run_transaction(|tx| {
        tx.set("a".into(), 1)?;
        tx.set("c".into(), 3)?;

        let mut keys = Vec::new();
        tx.keys(Direction::Backward, |k| {
            keys.push(k);
            Ok(ControlFlow::Continue(()))
        })?;

        let mut total = 0;
        tx.for_each(Direction::Forward, |_, v| {
            total += v;
            Ok(ControlFlow::Continue(()))
        })?;
        assert_eq!(total, 6);
        Ok(keys)
    })?;

    assert_eq!(keys, vec!["c", "b", "a"]);
    Ok(())
}

#[test]
fn test_lenient_get_or() -> Result<()> {
    let (store, _temp) = open_accounts();

    let value = store.run_transaction(|tx| Ok(tx.get_or("missing", -1)))?;
    assert_eq!(value, -1);
    Ok(())
}

#[test]
fn test_deadline() -> Result<()> {
    let (store, _temp) = open_accounts();

    let err = store
        .transaction()
        .with_timeout(Duration::from_millis(10))
        .execute(|tx| {
            thread::sleep(Duration::from_millis(30));
            tx.set("late".into(), 1)
        })
        .unwrap_err();

    assert!(matches!(err, KvError::Transaction(_)));
    assert!(!store.has("late")?);
    Ok(())
}

#[test]
fn test_writer_waits_for_transaction() -> Result<()> {
    let (store, _temp) = open_accounts();
    let store = Arc::new(store);

    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(0);
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            started_rx.recv().unwrap();
            // Blocks on the database write lock until the transaction commits
            store.set("k".into(), 2).map(|_| ())
        })
    };

    store.run_transaction(|tx| {
        tx.set("k".into(), 1)?;
        started_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));
        Ok(())
    })?;

    writer.join().unwrap()?;
    assert_eq!(store.get("k")?, 2);
    Ok(())
}
