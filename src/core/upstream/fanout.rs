// src/core/upstream/fanout.rs

//! Splits multi-key commands whose keys live on several shards into one
//! sub-command per shard, and merges the sub-replies back into the single
//! reply the client expects.

use crate::core::ProxyError;
use crate::core::protocol::{Command, RespFrame};
use bytes::Bytes;
use std::collections::BTreeMap;

/// One per-shard piece of a split command.
#[derive(Debug)]
pub(super) struct SubRequest {
    pub shard: usize,
    pub command: Command,
    /// For positional merges, where each key's value lands in the final reply.
    pub positions: Vec<usize>,
}

/// How the sub-replies are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Merge {
    /// MGET: values are placed back at their original key positions.
    Positional(usize),
    /// DEL, UNLINK, EXISTS, TOUCH: integer replies are summed.
    Sum,
    /// MSET: every shard must answer OK.
    AllOk,
}

/// Splits `command` by shard. `shard_of` maps a key to its shard index.
pub(super) fn split<F>(command: &Command, shard_of: F) -> Result<(Vec<SubRequest>, Merge), ProxyError>
where
    F: Fn(&[u8]) -> Result<usize, ProxyError>,
{
    let name = command.args()[0].clone();
    let (stride, merge) = match command.name() {
        "mget" => (1, Merge::Positional(command.argc() - 1)),
        "mset" => (2, Merge::AllOk),
        "del" | "unlink" | "exists" | "touch" => (1, Merge::Sum),
        other => return Err(ProxyError::UnsupportedCommand(other.to_string())),
    };

    let mut groups: BTreeMap<usize, (Vec<Bytes>, Vec<usize>)> = BTreeMap::new();
    for (position, chunk) in command.args()[1..].chunks(stride).enumerate() {
        let shard = shard_of(&chunk[0])?;
        let (args, positions) = groups
            .entry(shard)
            .or_insert_with(|| (vec![name.clone()], Vec::new()));
        args.extend(chunk.iter().cloned());
        positions.push(position);
    }

    let requests = groups
        .into_iter()
        .map(|(shard, (args, positions))| {
            Ok(SubRequest {
                shard,
                command: Command::new(args)?,
                positions,
            })
        })
        .collect::<Result<Vec<_>, ProxyError>>()?;
    Ok((requests, merge))
}

/// Combines sub-replies. The first error reply wins.
pub(super) fn merge(merge: Merge, parts: Vec<(Vec<usize>, RespFrame)>) -> RespFrame {
    if let Some((_, err)) = parts.iter().find(|(_, frame)| frame.is_error()) {
        return err.clone();
    }

    match merge {
        Merge::Sum => {
            let mut total = 0i64;
            for (_, frame) in parts {
                match frame {
                    RespFrame::Integer(n) => total += n,
                    other => return unexpected(&other),
                }
            }
            RespFrame::Integer(total)
        }
        Merge::AllOk => RespFrame::ok(),
        Merge::Positional(len) => {
            let mut values = vec![RespFrame::Null; len];
            for (positions, frame) in parts {
                let RespFrame::Array(items) = frame else {
                    return unexpected(&frame);
                };
                if items.len() != positions.len() {
                    return ProxyError::Internal("sub-reply length mismatch".into()).into();
                }
                for (position, item) in positions.into_iter().zip(items) {
                    values[position] = item;
                }
            }
            RespFrame::Array(values)
        }
    }
}

fn unexpected(frame: &RespFrame) -> RespFrame {
    ProxyError::Internal(format!("unexpected sub-reply {frame:?}")).into()
}
