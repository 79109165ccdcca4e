use crate::kv::{Table, Transaction};
use crate::{codec, DocId, NO_DOC};
use anyhow::{Context, Result};
use sled::IVec;

/// Table holding each document's canonical URL.
pub const DOCUMENT_URL_TABLE: &str = "documenturldb";

/// Document id -> opaque blob table, bound to one transaction.
pub struct DocumentDataDb<'txn> {
    txn: &'txn Transaction,
    table: Table,
}

impl<'txn> DocumentDataDb<'txn> {
    pub fn open(name: &str, txn: &'txn Transaction) -> Result<Self> {
        let table = txn.open_table(name).with_context(|| format!("opening document table {name}"))?;
        Ok(Self { txn, table })
    }

    /// Replace the record for `id`. Panics if `id` is zero or `data` is empty.
    pub fn put(&self, id: DocId, data: &[u8]) -> Result<()> {
        assert!(id != NO_DOC, "document id must be positive");
        assert!(!data.is_empty(), "document {id}: data must not be empty");
        self.txn
            .put(&self.table, &codec::doc_key(id), IVec::from(data))
            .with_context(|| format!("storing document {id} in {}", self.table.name()))?;
        tracing::trace!(id, table = self.table.name(), len = data.len(), "document data stored");
        Ok(())
    }

    pub fn get(&self, id: DocId) -> Result<Option<IVec>> {
        assert!(id != NO_DOC, "document id must be positive");
        self.txn
            .get(&self.table, &codec::doc_key(id))
            .with_context(|| format!("reading document {id} from {}", self.table.name()))
    }

    pub fn contains(&self, id: DocId) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Remove the record for `id`. A missing record is not an error; the
    /// return value says whether anything was removed.
    pub fn del(&self, id: DocId) -> Result<bool> {
        assert!(id != NO_DOC, "document id must be positive");
        let removed = self
            .txn
            .delete(&self.table, &codec::doc_key(id))
            .with_context(|| format!("deleting document {id} from {}", self.table.name()))?;
        if !removed {
            tracing::debug!(id, table = self.table.name(), "delete of missing document ignored");
        }
        Ok(removed)
    }
}
