//! On-disk layouts.
//!
//! A posting value is a packed sequence of little-endian u32 document ids with
//! no header; its length is `bytes / 4`. Document data keys are big-endian so
//! the sorted keyspace orders them numerically.

use crate::{DocId, PostingList};
use anyhow::{bail, Result};

const ID_WIDTH: usize = std::mem::size_of::<DocId>();

pub fn encode(ids: &[DocId]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ids.len() * ID_WIDTH);
    for id in ids {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    buf
}

pub fn decode(bytes: &[u8]) -> Result<PostingList> {
    check_len(bytes)?;
    Ok(bytes
        .chunks_exact(ID_WIDTH)
        .map(|c| DocId::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Number of ids in an encoded value.
pub fn len(bytes: &[u8]) -> usize {
    bytes.len() / ID_WIDTH
}

/// Id at `index` without decoding the rest of the list.
pub fn id_at(bytes: &[u8], index: usize) -> Option<DocId> {
    let start = index.checked_mul(ID_WIDTH)?;
    let chunk = bytes.get(start..start.checked_add(ID_WIDTH)?)?;
    Some(DocId::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

pub fn check_len(bytes: &[u8]) -> Result<()> {
    if bytes.len() % ID_WIDTH != 0 {
        bail!("corrupt posting list: {} bytes is not a multiple of {}", bytes.len(), ID_WIDTH);
    }
    Ok(())
}

pub fn doc_key(id: DocId) -> [u8; ID_WIDTH] {
    id.to_be_bytes()
}
