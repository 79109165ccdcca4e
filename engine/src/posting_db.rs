use crate::iterator::{LeafIterator, PostingIterator};
use crate::kv::{Table, Transaction};
use crate::{codec, DocId, PostingList, NO_DOC};
use anyhow::{Context, Result};
use sled::IVec;
use std::borrow::Cow;

pub const POSTING_TABLE: &str = "postingdb";

/// Result of expanding a prefix: the matched terms in byte order and the
/// union over their lists (`None` when nothing matched).
pub struct PrefixExpansion {
    pub terms: Vec<Vec<u8>>,
    pub iterator: Option<PostingIterator>,
}

/// Term -> posting list table, bound to one transaction.
///
/// Lists are stored whole; `put` replaces whatever was there. Callers that
/// need to append must read, merge and write back.
pub struct PostingDb<'txn> {
    txn: &'txn Transaction,
    table: Table,
}

impl<'txn> PostingDb<'txn> {
    pub fn open(txn: &'txn Transaction) -> Result<Self> {
        let table = txn.open_table(POSTING_TABLE).context("opening posting table")?;
        Ok(Self { txn, table })
    }

    /// Store `list` for `term`.
    ///
    /// # Panics
    ///
    /// If `term` or `list` is empty, or `list` is not strictly increasing
    /// positive ids. Iterators rely on that ordering.
    pub fn put(&self, term: &[u8], list: &[DocId]) -> Result<()> {
        assert!(!term.is_empty(), "posting term must not be empty");
        assert!(!list.is_empty(), "posting list for {:?} must not be empty", show(term));
        assert!(
            list[0] != NO_DOC && list.windows(2).all(|w| w[0] < w[1]),
            "posting list for {:?} must hold strictly increasing positive ids",
            show(term)
        );

        self.txn
            .put(&self.table, term, IVec::from(codec::encode(list)))
            .with_context(|| format!("storing postings for {:?}", show(term)))?;
        tracing::trace!(term = %show(term), len = list.len(), "posting list stored");
        Ok(())
    }

    /// Decoded list for `term`, empty if the term is absent.
    pub fn get(&self, term: &[u8]) -> Result<PostingList> {
        assert!(!term.is_empty(), "posting term must not be empty");
        match self.txn.get(&self.table, term)? {
            Some(value) => codec::decode(&value).with_context(|| format!("decoding postings for {:?}", show(term))),
            None => Ok(PostingList::new()),
        }
    }

    pub fn del(&self, term: &[u8]) -> Result<bool> {
        assert!(!term.is_empty(), "posting term must not be empty");
        let removed = self.txn.delete(&self.table, term)?;
        tracing::debug!(term = %show(term), removed, "posting list deleted");
        Ok(removed)
    }

    /// Iterator over the stored list for `term`, or `None` if it is absent.
    pub fn iterator(&self, term: &[u8]) -> Result<Option<PostingIterator>> {
        assert!(!term.is_empty(), "posting term must not be empty");
        match self.txn.get(&self.table, term)? {
            Some(value) => {
                let leaf = LeafIterator::new(value).with_context(|| format!("reading postings for {:?}", show(term)))?;
                Ok(Some(leaf.into()))
            }
            None => Ok(None),
        }
    }

    /// Union of the lists of every term starting with `prefix`, or `None` when
    /// no term matches. An empty prefix matches every term.
    pub fn prefix_iterator(&self, prefix: &[u8]) -> Result<Option<PostingIterator>> {
        Ok(self.prefix_expand(prefix)?.iterator)
    }

    /// Matching terms together with the union of their lists, from one scan.
    pub fn prefix_expand(&self, prefix: &[u8]) -> Result<PrefixExpansion> {
        let mut terms = Vec::new();
        let mut children = Vec::new();
        self.scan_prefix(prefix, |term, value| {
            let leaf = LeafIterator::new(value).with_context(|| format!("reading postings for {:?}", show(&term)))?;
            children.push(PostingIterator::from(leaf));
            terms.push(term.to_vec());
            Ok(())
        })?;

        tracing::debug!(prefix = %show(prefix), terms = terms.len(), "prefix expanded");
        let iterator = if children.is_empty() { None } else { Some(PostingIterator::union(children)) };
        Ok(PrefixExpansion { terms, iterator })
    }

    /// Terms starting with `prefix`, in byte order.
    pub fn terms_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut terms = Vec::new();
        self.scan_prefix(prefix, |term, _| {
            terms.push(term.to_vec());
            Ok(())
        })?;
        Ok(terms)
    }

    // Keys are sorted, so every match sits in one run starting at the lower bound.
    fn scan_prefix(&self, prefix: &[u8], mut f: impl FnMut(IVec, IVec) -> Result<()>) -> Result<()> {
        let mut cursor = self.txn.cursor(&self.table);
        let mut entry = cursor.seek_lower_bound(prefix).context("scanning posting table")?;
        while let Some((term, value)) = entry {
            if !term.starts_with(prefix) {
                break;
            }
            f(term, value)?;
            entry = cursor.next_entry().context("scanning posting table")?;
        }
        Ok(())
    }
}

fn show(term: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(term)
}
