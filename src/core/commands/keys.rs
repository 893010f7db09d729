// src/core/commands/keys.rs

//! Key position descriptions used to route commands to shards.

use bytes::Bytes;

/// Where a command's keys live in its argument list (index 0 is the name).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    /// The command has no keys.
    None,
    /// Keys from `first` to `last` (negative counts from the end) every `step`.
    Range { first: usize, last: isize, step: usize },
    /// `numkeys` at `numkeys_at`, keys right after it. With `dest`, the
    /// argument at index 1 is a key too.
    NumKeys { numkeys_at: usize, dest: bool },
}

impl KeySpec {
    /// The single-key form used by most commands.
    pub const SINGLE: KeySpec = KeySpec::Range {
        first: 1,
        last: 1,
        step: 1,
    };
    /// Every argument after the name is a key.
    pub const ALL: KeySpec = KeySpec::Range {
        first: 1,
        last: -1,
        step: 1,
    };

    pub fn extract(&self, args: &[Bytes]) -> Vec<Bytes> {
        match *self {
            KeySpec::None => Vec::new(),
            KeySpec::Range { first, last, step } => {
                let last = if last < 0 {
                    args.len() as isize + last
                } else {
                    last
                };
                if last < first as isize {
                    return Vec::new();
                }
                let last = (last as usize).min(args.len().saturating_sub(1));
                (first..=last)
                    .step_by(step.max(1))
                    .filter_map(|i| args.get(i).cloned())
                    .collect()
            }
            KeySpec::NumKeys { numkeys_at, dest } => {
                let mut keys = Vec::new();
                if dest && let Some(k) = args.get(1) {
                    keys.push(k.clone());
                }
                let numkeys = args
                    .get(numkeys_at)
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(0);
                keys.extend(args.iter().skip(numkeys_at + 1).take(numkeys).cloned());
                keys
            }
        }
    }
}
