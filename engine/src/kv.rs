//! Transactional ordered key-value layer over sled.
//!
//! sled gives sorted byte keys, atomic multi-tree batches and range scans.
//! This module adds the transaction shape the stores expect: one writer at a
//! time, a per-transaction write set that reads observe, and an all-or-nothing
//! commit. Dropping a transaction without committing discards its writes.
//!
//! Read transactions hold the shared side of a commit gate for their whole
//! life and `commit` applies its batch under the exclusive side, so a reader
//! never sees a commit land partway through. A commit therefore waits for open
//! read transactions; a thread must not commit while it holds one.

use crate::config::StoreConfig;
use anyhow::{anyhow, bail, Context, Result};
use parking_lot::lock_api::{ArcMutexGuard, ArcRwLockReadGuard};
use parking_lot::{Mutex, RawMutex, RawRwLock, RwLock};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::{Batch, IVec, Transactional};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Handle to an opened database. Clones share the same database and locks.
#[derive(Clone)]
pub struct Environment {
    db: sled::Db,
    writer: Arc<Mutex<()>>,
    commit_gate: Arc<RwLock<()>>,
    sync_on_commit: bool,
}

impl Environment {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = config
            .to_sled()
            .open()
            .with_context(|| format!("opening store at {}", config.path.display()))?;
        tracing::info!(path = %config.path.display(), temporary = config.temporary, "store opened");
        Ok(Self {
            db,
            writer: Arc::new(Mutex::new(())),
            commit_gate: Arc::new(RwLock::new(())),
            sync_on_commit: config.sync_on_commit,
        })
    }

    /// Read-only view of the committed state as of this call. Commits started
    /// later wait until the transaction is dropped.
    pub fn begin_read(&self) -> Transaction {
        // Recursive so a thread may nest readers even while a commit is queued.
        let snapshot = self.commit_gate.read_arc_recursive();
        Transaction { env: self.clone(), writer: None, _snapshot: Some(snapshot), pending: RefCell::new(BTreeMap::new()) }
    }

    /// Blocks while another write transaction is alive. Not reentrant.
    pub fn begin_write(&self) -> Transaction {
        let guard = self.writer.lock_arc();
        Transaction { env: self.clone(), writer: Some(guard), _snapshot: None, pending: RefCell::new(BTreeMap::new()) }
    }

    /// Flush committed data to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("flushing store")?;
        Ok(())
    }
}

/// A named table. The backend handle is released when this is dropped.
pub struct Table {
    name: String,
    tree: sled::Tree,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct PendingTable {
    tree: sled::Tree,
    /// `None` marks a deletion.
    writes: BTreeMap<Vec<u8>, Option<IVec>>,
}

pub struct Transaction {
    env: Environment,
    writer: Option<ArcMutexGuard<RawMutex, ()>>,
    _snapshot: Option<ArcRwLockReadGuard<RawRwLock, ()>>,
    pending: RefCell<BTreeMap<String, PendingTable>>,
}

impl Transaction {
    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    /// Open a table, creating it if absent.
    pub fn open_table(&self, name: &str) -> Result<Table> {
        let tree = self.env.db.open_tree(name).with_context(|| format!("opening table {name}"))?;
        Ok(Table { name: name.to_string(), tree })
    }

    pub fn get(&self, table: &Table, key: &[u8]) -> Result<Option<IVec>> {
        if let Some(pending) = self.pending.borrow().get(&table.name) {
            if let Some(value) = pending.writes.get(key) {
                return Ok(value.clone());
            }
        }
        table.tree.get(key).with_context(|| format!("reading from table {}", table.name))
    }

    pub fn put(&self, table: &Table, key: &[u8], value: IVec) -> Result<()> {
        self.ensure_writable(table)?;
        self.pending_for(table, |writes| {
            writes.insert(key.to_vec(), Some(value));
        });
        Ok(())
    }

    /// Returns whether a live record was removed.
    pub fn delete(&self, table: &Table, key: &[u8]) -> Result<bool> {
        self.ensure_writable(table)?;
        if self.get(table, key)?.is_none() {
            return Ok(false);
        }
        self.pending_for(table, |writes| {
            writes.insert(key.to_vec(), None);
        });
        Ok(true)
    }

    pub fn cursor<'t>(&'t self, table: &'t Table) -> Cursor<'t> {
        Cursor { txn: self, table, base: None, base_head: None, overlay: VecDeque::new() }
    }

    /// Atomically apply every buffered write. A no-op for read transactions.
    pub fn commit(mut self) -> Result<()> {
        if self.writer.is_none() {
            return Ok(());
        }
        let pending = std::mem::take(self.pending.get_mut());
        if pending.is_empty() {
            return Ok(());
        }

        let mut trees = Vec::with_capacity(pending.len());
        let mut batches = Vec::with_capacity(pending.len());
        let mut writes = 0usize;
        for (_, table) in pending {
            let mut batch = Batch::default();
            for (key, value) in table.writes {
                writes += 1;
                match value {
                    Some(value) => batch.insert(key, value),
                    None => batch.remove(key),
                }
            }
            trees.push(table.tree);
            batches.push(batch);
        }

        let trees: &[sled::Tree] = &trees;
        {
            let _gate = self.env.commit_gate.write();
            trees
                .transaction(|views: &Vec<TransactionalTree>| -> ConflictableTransactionResult<()> {
                    for (view, batch) in views.iter().zip(batches.iter()) {
                        view.apply_batch(batch)?;
                    }
                    Ok(())
                })
                .map_err(|e| anyhow!("committing transaction: {e:?}"))?;
        }

        if self.env.sync_on_commit {
            self.env.flush()?;
        }
        tracing::info!(tables = trees.len(), writes, "transaction committed");
        Ok(())
    }

    /// Discard buffered writes. Equivalent to dropping the transaction.
    pub fn abort(self) {
        tracing::debug!(tables = self.pending.borrow().len(), "transaction aborted");
    }

    fn ensure_writable(&self, table: &Table) -> Result<()> {
        if !self.is_writable() {
            bail!("table {}: write attempted in a read-only transaction", table.name);
        }
        Ok(())
    }

    fn pending_for(&self, table: &Table, f: impl FnOnce(&mut BTreeMap<Vec<u8>, Option<IVec>>)) {
        let mut pending = self.pending.borrow_mut();
        let entry = pending
            .entry(table.name.clone())
            .or_insert_with(|| PendingTable { tree: table.tree.clone(), writes: BTreeMap::new() });
        f(&mut entry.writes);
    }
}

/// Forward cursor over one table as seen by its transaction.
///
/// Committed entries and the transaction's own buffered writes are merged in
/// key order; a buffered write shadows the committed value for the same key and
/// buffered deletions hide it. Buffered writes are captured when the cursor is
/// positioned, so writes made afterwards are not observed by this scan.
pub struct Cursor<'t> {
    txn: &'t Transaction,
    table: &'t Table,
    base: Option<sled::Iter>,
    base_head: Option<(IVec, IVec)>,
    overlay: VecDeque<(Vec<u8>, Option<IVec>)>,
}

impl Cursor<'_> {
    /// Position at the first key `>= key` and return that entry.
    pub fn seek_lower_bound(&mut self, key: &[u8]) -> Result<Option<(IVec, IVec)>> {
        self.base = Some(self.table.tree.range(key.to_vec()..));
        self.base_head = self.pull_base()?;
        self.overlay = match self.txn.pending.borrow().get(&self.table.name) {
            Some(pending) => pending.writes.range(key.to_vec()..).map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => VecDeque::new(),
        };
        self.step()
    }

    /// Move to the next entry. An unpositioned cursor starts at the first key.
    pub fn next_entry(&mut self) -> Result<Option<(IVec, IVec)>> {
        if self.base.is_none() {
            return self.seek_lower_bound(&[]);
        }
        self.step()
    }

    fn pull_base(&mut self) -> Result<Option<(IVec, IVec)>> {
        match self.base.as_mut() {
            Some(iter) => iter.next().transpose().with_context(|| format!("scanning table {}", self.table.name)),
            None => Ok(None),
        }
    }

    fn step(&mut self) -> Result<Option<(IVec, IVec)>> {
        loop {
            let order = match (self.overlay.front(), self.base_head.as_ref()) {
                (None, None) => return Ok(None),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((pending_key, _)), Some((base_key, _))) => pending_key.as_slice().cmp(base_key.as_ref()),
            };
            match order {
                Ordering::Greater => {
                    let head = self.base_head.take();
                    self.base_head = self.pull_base()?;
                    return Ok(head);
                }
                Ordering::Equal => {
                    self.base_head = self.pull_base()?;
                }
                Ordering::Less => {}
            }
            if let Some((key, Some(value))) = self.overlay.pop_front() {
                return Ok(Some((IVec::from(key), value)));
            }
        }
    }
}
