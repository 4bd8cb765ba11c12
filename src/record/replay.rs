//! Record replay
//!
//! Turns a plaintext segment into length-prefixed records with their global
//! positions.

use std::path::Path;

use bytes::Bytes;

use crate::error::{CellarError, Result};

use super::decode_varint;

/// Position metadata handed to scan callbacks with every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// Start position of the chunk or buffer holding the record
    pub chunk_pos: i64,
    /// Global position of the record's length prefix
    pub start_pos: i64,
    /// Global position right after the record's payload
    pub next_pos: i64,
}

/// Replay the records of `run`, a segment starting at global `chunk_pos`,
/// beginning with the record at byte offset `from`.
///
/// Records before `from` are walked over but not delivered. If the walk steps
/// over `from` without landing on it, `from` is not a record boundary and the
/// replay fails with `UnalignedPosition` instead of decoding garbage.
/// `source` names the file for corruption reports.
pub fn replay<F>(run: &Bytes, chunk_pos: i64, from: usize, source: &Path, mut op: F) -> Result<()>
where
    F: FnMut(&RecordInfo, Bytes) -> Result<()>,
{
    let end = run.len();
    let mut offset = 0usize;

    while offset < end {
        let (len, header) = decode_varint(&run[offset..]).map_err(|e| {
            CellarError::corruption(source, format!("{} at offset {}", e, offset))
        })?;

        if len < 0 {
            return Err(CellarError::corruption(
                source,
                format!("negative record length {} at offset {}", len, offset),
            ));
        }

        let body = offset + header;
        let next = match body.checked_add(len as usize) {
            Some(next) if next <= end => next,
            _ => {
                return Err(CellarError::corruption(
                    source,
                    format!(
                        "record of {} bytes at offset {} runs past the segment end {}",
                        len, offset, end
                    ),
                ))
            }
        };

        if offset >= from {
            let info = RecordInfo {
                chunk_pos,
                start_pos: chunk_pos + offset as i64,
                next_pos: chunk_pos + next as i64,
            };
            op(&info, run.slice(body..next))?;
        } else if next > from {
            return Err(CellarError::UnalignedPosition {
                pos: chunk_pos + from as i64,
                chunk_pos,
            });
        }

        offset = next;
    }

    Ok(())
}
