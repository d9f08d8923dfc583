//! Basic kvstore usage
//!
//! This example demonstrates:
//! - Opening a database and a typed store
//! - Reads, writes and ordered iteration
//! - Watching a key prefix from another thread
//! - An atomic transfer inside a transaction
//!
//! Run with: cargo run --example basic_usage

use kvstore::prelude::*;
use std::thread;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    owner: String,
    balance: i64,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("kvstore=debug,kvstore_sqlite=debug,kvstore_core=debug")
        .init();

    let temp_dir = tempfile::tempdir().unwrap();
    let db = KvDb::open(temp_dir.path().join("example.db"))?;
    println!("Opened {}", db.path().display());

    let accounts: Store<String, Account> = db.store("accounts")?;

    // Watch every account from a background thread
    let (events, cancel) = accounts.watch_prefix("acct:");
    let watcher = thread::spawn(move || {
        for event in events.iter() {
            match event.kind {
                ChangeKind::Set => println!(
                    "  [watch] {} -> {:?} (was {:?})",
                    event.key,
                    event.value.map(|a| a.balance),
                    event.previous.map(|a| a.balance)
                ),
                ChangeKind::Delete => println!("  [watch] {} deleted", event.key),
            }
        }
        println!("  [watch] stream closed");
    });

    for (id, owner, balance) in [("acct:1", "alice", 100), ("acct:2", "bob", 20)] {
        accounts.set(
            id.to_string(),
            Account {
                owner: owner.to_string(),
                balance,
            },
        )?;
    }

    // Move 30 from alice to bob atomically; watchers are not notified
    accounts.run_transaction(|tx| {
        let mut from = tx.get("acct:1")?;
        let mut to = tx.get("acct:2")?;
        from.balance -= 30;
        to.balance += 30;
        tx.set("acct:1".to_string(), from)?;
        tx.set("acct:2".to_string(), to)?;
        Ok(())
    })?;

    println!("Accounts, newest id first:");
    accounts.for_each(Direction::Backward, |id, account| {
        println!("  {} {:>6} {}", id, account.balance, account.owner);
        Ok(ControlFlow::Continue(()))
    })?;

    accounts.delete("acct:2")?;

    cancel.cancel();
    watcher.join().ok();
    Ok(())
}
