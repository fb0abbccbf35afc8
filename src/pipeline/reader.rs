//! Block reader stage
//!
//! Reads fixed-size blocks from the source into recycled buffers, cuts each
//! block after its last complete line and carries the partial tail into the
//! next block. A block never splits a record. The reader blocks when every
//! buffer is queued at the parser, which caps memory.

use super::{Block, ParseMsg};
use crate::error::{AnalysisError, Result};
use crossbeam::channel::{Receiver, Sender};
use std::io::{ErrorKind, Read};

/// Reader statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub bytes: u64,
    pub blocks: u64,
}

pub(crate) fn run_reader<R: Read>(
    mut source: R,
    block_size: usize,
    free_buffers: Receiver<Vec<u8>>,
    blocks: Sender<ParseMsg>,
) -> Result<ReaderStats> {
    let mut stats = ReaderStats::default();
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let mut buf = free_buffers
            .recv()
            .map_err(|_| AnalysisError::StageFailed { stage: "parser" })?;
        buf.clear();
        buf.append(&mut carry);

        // Keep reading until the buffer holds at least one full line
        let mut eof = false;
        let split_at = loop {
            if read_chunk(&mut source, &mut buf, block_size)? == 0 {
                eof = true;
                break None;
            }
            if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
                break Some(pos + 1);
            }
        };

        if let Some(end) = split_at {
            carry.extend_from_slice(&buf[end..]);
            buf.truncate(end);
        }

        if !buf.is_empty() {
            let offset = stats.bytes;
            stats.bytes += buf.len() as u64;
            stats.blocks += 1;
            blocks
                .send(ParseMsg::Block(Block { data: buf, offset }))
                .map_err(|_| AnalysisError::StageFailed { stage: "parser" })?;
        }

        if eof {
            break;
        }
    }

    tracing::debug!(bytes = stats.bytes, blocks = stats.blocks, "reader reached end of input");
    blocks
        .send(ParseMsg::Shutdown)
        .map_err(|_| AnalysisError::StageFailed { stage: "parser" })?;
    Ok(stats)
}

/// Append up to `block_size` bytes to `buf`; returns how many were read
fn read_chunk<R: Read>(source: &mut R, buf: &mut Vec<u8>, block_size: usize) -> Result<usize> {
    let start = buf.len();
    buf.resize(start + block_size, 0);
    let read = loop {
        match source.read(&mut buf[start..]) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                buf.truncate(start);
                return Err(e.into());
            }
        }
    };
    buf.truncate(start + read);
    Ok(read)
}
