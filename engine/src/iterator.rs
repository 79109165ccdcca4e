//! Lazy forward cursors over document ids.
//!
//! Every variant starts before the first id. `advance` moves one step and
//! returns the new current id; `current` reports it without moving. Both
//! return [`NO_DOC`] before the first step and after exhaustion, and an
//! exhausted iterator stays exhausted. Combinators expect their children to
//! produce non-decreasing ids and themselves produce strictly increasing ids.

use crate::{codec, DocId, NO_DOC};
use anyhow::Result;
use sled::IVec;

pub enum PostingIterator {
    Leaf(LeafIterator),
    Union(UnionIterator),
    Intersection(IntersectionIterator),
}

impl PostingIterator {
    pub fn union(children: Vec<PostingIterator>) -> Self {
        PostingIterator::Union(UnionIterator::new(children))
    }

    pub fn intersection(children: Vec<PostingIterator>) -> Self {
        PostingIterator::Intersection(IntersectionIterator::new(children))
    }

    pub fn current(&self) -> DocId {
        match self {
            PostingIterator::Leaf(it) => it.current(),
            PostingIterator::Union(it) => it.current,
            PostingIterator::Intersection(it) => it.current,
        }
    }

    pub fn advance(&mut self) -> DocId {
        match self {
            PostingIterator::Leaf(it) => it.advance(),
            PostingIterator::Union(it) => it.advance(),
            PostingIterator::Intersection(it) => it.advance(),
        }
    }

    /// Advance until the current id is `>= target` or the iterator is exhausted.
    /// Does not move if the current id already satisfies the bound.
    pub fn skip_to(&mut self, target: DocId) -> DocId {
        let id = self.current();
        if id != NO_DOC && id >= target {
            return id;
        }
        loop {
            let id = self.advance();
            if id == NO_DOC || id >= target {
                return id;
            }
        }
    }
}

impl Iterator for PostingIterator {
    type Item = DocId;

    fn next(&mut self) -> Option<DocId> {
        match self.advance() {
            NO_DOC => None,
            id => Some(id),
        }
    }
}

impl From<LeafIterator> for PostingIterator {
    fn from(it: LeafIterator) -> Self {
        PostingIterator::Leaf(it)
    }
}

/// Walks one stored posting list in place.
pub struct LeafIterator {
    data: IVec,
    len: usize,
    /// `None` until the first `advance`; saturates at `len` once exhausted.
    pos: Option<usize>,
}

impl LeafIterator {
    pub fn new(data: IVec) -> Result<Self> {
        codec::check_len(&data)?;
        let len = codec::len(&data);
        Ok(Self { data, len, pos: None })
    }

    pub fn from_ids(ids: &[DocId]) -> Self {
        let data = IVec::from(codec::encode(ids));
        Self { data, len: ids.len(), pos: None }
    }

    fn current(&self) -> DocId {
        self.pos.and_then(|p| codec::id_at(&self.data, p)).unwrap_or(NO_DOC)
    }

    fn advance(&mut self) -> DocId {
        let next = match self.pos {
            None => 0,
            Some(p) => (p + 1).min(self.len),
        };
        self.pos = Some(next);
        self.current()
    }
}

/// Sorted, duplicate-free union of its children.
pub struct UnionIterator {
    children: Vec<PostingIterator>,
    current: DocId,
    started: bool,
}

impl UnionIterator {
    pub fn new(children: Vec<PostingIterator>) -> Self {
        Self { children, current: NO_DOC, started: false }
    }

    fn advance(&mut self) -> DocId {
        if !self.started {
            self.started = true;
            for child in &mut self.children {
                child.advance();
            }
        } else if self.current == NO_DOC {
            return NO_DOC;
        } else {
            let emitted = self.current;
            for child in &mut self.children {
                while child.current() == emitted {
                    child.advance();
                }
            }
        }

        self.current = self
            .children
            .iter()
            .map(PostingIterator::current)
            .filter(|&id| id != NO_DOC)
            .min()
            .unwrap_or(NO_DOC);
        self.current
    }
}

/// Ids present in every child. Empty when there are no children.
pub struct IntersectionIterator {
    children: Vec<PostingIterator>,
    current: DocId,
    started: bool,
}

impl IntersectionIterator {
    pub fn new(children: Vec<PostingIterator>) -> Self {
        Self { children, current: NO_DOC, started: false }
    }

    fn advance(&mut self) -> DocId {
        if !self.started {
            self.started = true;
            for child in &mut self.children {
                child.advance();
            }
        } else if self.current == NO_DOC {
            return NO_DOC;
        } else {
            let Some(next) = self.current.checked_add(1) else {
                self.current = NO_DOC;
                return NO_DOC;
            };
            for child in &mut self.children {
                child.skip_to(next);
            }
        }
        self.current = self.align();
        self.current
    }

    // Leapfrog every child up to the largest current id until they agree.
    fn align(&mut self) -> DocId {
        loop {
            let mut target = NO_DOC;
            for child in &self.children {
                let id = child.current();
                if id == NO_DOC {
                    return NO_DOC;
                }
                target = target.max(id);
            }

            let mut agreed = true;
            for child in &mut self.children {
                let id = child.skip_to(target);
                if id == NO_DOC {
                    return NO_DOC;
                }
                agreed &= id == target;
            }
            if agreed {
                return target;
            }
        }
    }
}
