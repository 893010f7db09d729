// src/core/commands/table.rs

use super::{CommandFlags as F, CommandSpec, KeySpec as K};
use once_cell::sync::Lazy;
use std::collections::HashMap;

const R: F = F::READONLY;
const W: F = F::WRITE;
const PAIRS: K = K::Range {
    first: 1,
    last: -1,
    step: 2,
};
const TWO: K = K::Range {
    first: 1,
    last: 2,
    step: 1,
};
const FROM_SECOND: K = K::Range {
    first: 2,
    last: -1,
    step: 1,
};
const SECOND: K = K::Range {
    first: 2,
    last: 2,
    step: 1,
};
const NUMKEYS_AT_2: K = K::NumKeys {
    numkeys_at: 2,
    dest: false,
};
const NUMKEYS_AT_1: K = K::NumKeys {
    numkeys_at: 1,
    dest: false,
};
const DEST_NUMKEYS: K = K::NumKeys {
    numkeys_at: 2,
    dest: true,
};

#[rustfmt::skip]
const ENTRIES: &[(&str, i32, F, K)] = &[
    // --- Handled by the proxy ---
    ("auth", -2, F::LOCAL, K::None),
    ("ping", -1, F::LOCAL, K::None),
    ("echo", 2, F::LOCAL, K::None),
    ("quit", -1, F::LOCAL, K::None),
    ("select", 2, F::LOCAL, K::None),
    ("info", -1, F::LOCAL, K::None),
    ("client", -2, F::LOCAL, K::None),
    ("command", -1, F::LOCAL, K::None),

    // --- Strings ---
    ("get", 2, R, K::SINGLE),
    ("getrange", 4, R, K::SINGLE),
    ("substr", 4, R, K::SINGLE),
    ("strlen", 2, R, K::SINGLE),
    ("getbit", 3, R, K::SINGLE),
    ("bitcount", -2, R, K::SINGLE),
    ("bitpos", -3, R, K::SINGLE),
    ("mget", -2, R.union(F::FANOUT), K::ALL),
    ("set", -3, W, K::SINGLE),
    ("setnx", 3, W, K::SINGLE),
    ("setex", 4, W, K::SINGLE),
    ("psetex", 4, W, K::SINGLE),
    ("getset", 3, W, K::SINGLE),
    ("getdel", 2, W, K::SINGLE),
    ("getex", -2, W, K::SINGLE),
    ("append", 3, W, K::SINGLE),
    ("setrange", 4, W, K::SINGLE),
    ("setbit", 4, W, K::SINGLE),
    ("bitfield", -2, W, K::SINGLE),
    ("incr", 2, W, K::SINGLE),
    ("decr", 2, W, K::SINGLE),
    ("incrby", 3, W, K::SINGLE),
    ("decrby", 3, W, K::SINGLE),
    ("incrbyfloat", 3, W, K::SINGLE),
    ("mset", -3, W.union(F::FANOUT), PAIRS),
    ("msetnx", -3, W, PAIRS),
    ("bitop", -4, W, FROM_SECOND),

    // --- Generic keyspace ---
    ("exists", -2, R.union(F::FANOUT), K::ALL),
    ("type", 2, R, K::SINGLE),
    ("ttl", 2, R, K::SINGLE),
    ("pttl", 2, R, K::SINGLE),
    ("expiretime", 2, R, K::SINGLE),
    ("pexpiretime", 2, R, K::SINGLE),
    ("dump", 2, R, K::SINGLE),
    ("touch", -2, R.union(F::FANOUT), K::ALL),
    ("del", -2, W.union(F::FANOUT), K::ALL),
    ("unlink", -2, W.union(F::FANOUT), K::ALL),
    ("expire", -3, W, K::SINGLE),
    ("pexpire", -3, W, K::SINGLE),
    ("expireat", -3, W, K::SINGLE),
    ("pexpireat", -3, W, K::SINGLE),
    ("persist", 2, W, K::SINGLE),
    ("restore", -4, W, K::SINGLE),
    ("rename", 3, W, TWO),
    ("renamenx", 3, W, TWO),
    ("copy", -3, W, TWO),
    ("dbsize", 1, R.union(F::NODE_SCOPED), K::None),
    ("scan", -2, R.union(F::NODE_SCOPED), K::None),
    ("keys", 2, R.union(F::NODE_SCOPED), K::None),
    ("randomkey", 1, R.union(F::NODE_SCOPED), K::None),
    ("flushdb", -1, W.union(F::NODE_SCOPED), K::None),
    ("flushall", -1, W.union(F::NODE_SCOPED), K::None),

    // --- Hashes ---
    ("hget", 3, R, K::SINGLE),
    ("hmget", -3, R, K::SINGLE),
    ("hgetall", 2, R, K::SINGLE),
    ("hkeys", 2, R, K::SINGLE),
    ("hvals", 2, R, K::SINGLE),
    ("hlen", 2, R, K::SINGLE),
    ("hexists", 3, R, K::SINGLE),
    ("hstrlen", 3, R, K::SINGLE),
    ("hrandfield", -2, R, K::SINGLE),
    ("hscan", -3, R, K::SINGLE),
    ("hset", -4, W, K::SINGLE),
    ("hsetnx", 4, W, K::SINGLE),
    ("hmset", -4, W, K::SINGLE),
    ("hdel", -3, W, K::SINGLE),
    ("hincrby", 4, W, K::SINGLE),
    ("hincrbyfloat", 4, W, K::SINGLE),

    // --- Lists ---
    ("llen", 2, R, K::SINGLE),
    ("lrange", 4, R, K::SINGLE),
    ("lindex", 3, R, K::SINGLE),
    ("lpos", -3, R, K::SINGLE),
    ("lpush", -3, W, K::SINGLE),
    ("rpush", -3, W, K::SINGLE),
    ("lpushx", -3, W, K::SINGLE),
    ("rpushx", -3, W, K::SINGLE),
    ("lpop", -2, W, K::SINGLE),
    ("rpop", -2, W, K::SINGLE),
    ("lset", 4, W, K::SINGLE),
    ("lrem", 4, W, K::SINGLE),
    ("ltrim", 4, W, K::SINGLE),
    ("linsert", 5, W, K::SINGLE),
    ("rpoplpush", 3, W, TWO),
    ("lmove", 5, W, TWO),

    // --- Sets ---
    ("scard", 2, R, K::SINGLE),
    ("smembers", 2, R, K::SINGLE),
    ("sismember", 3, R, K::SINGLE),
    ("smismember", -3, R, K::SINGLE),
    ("srandmember", -2, R, K::SINGLE),
    ("sscan", -3, R, K::SINGLE),
    ("sinter", -2, R, K::ALL),
    ("sunion", -2, R, K::ALL),
    ("sdiff", -2, R, K::ALL),
    ("sintercard", -3, R, NUMKEYS_AT_1),
    ("sadd", -3, W, K::SINGLE),
    ("srem", -3, W, K::SINGLE),
    ("spop", -2, W, K::SINGLE),
    ("smove", 4, W, TWO),
    ("sinterstore", -3, W, K::ALL),
    ("sunionstore", -3, W, K::ALL),
    ("sdiffstore", -3, W, K::ALL),

    // --- Sorted sets ---
    ("zcard", 2, R, K::SINGLE),
    ("zscore", 3, R, K::SINGLE),
    ("zmscore", -3, R, K::SINGLE),
    ("zrank", -3, R, K::SINGLE),
    ("zrevrank", -3, R, K::SINGLE),
    ("zcount", 4, R, K::SINGLE),
    ("zlexcount", 4, R, K::SINGLE),
    ("zrange", -4, R, K::SINGLE),
    ("zrevrange", -4, R, K::SINGLE),
    ("zrangebyscore", -4, R, K::SINGLE),
    ("zrevrangebyscore", -4, R, K::SINGLE),
    ("zrangebylex", -4, R, K::SINGLE),
    ("zrevrangebylex", -4, R, K::SINGLE),
    ("zrandmember", -2, R, K::SINGLE),
    ("zscan", -3, R, K::SINGLE),
    ("zunion", -3, R, NUMKEYS_AT_1),
    ("zinter", -3, R, NUMKEYS_AT_1),
    ("zdiff", -3, R, NUMKEYS_AT_1),
    ("zadd", -4, W, K::SINGLE),
    ("zincrby", 4, W, K::SINGLE),
    ("zrem", -3, W, K::SINGLE),
    ("zpopmin", -2, W, K::SINGLE),
    ("zpopmax", -2, W, K::SINGLE),
    ("zremrangebyscore", 4, W, K::SINGLE),
    ("zremrangebyrank", 4, W, K::SINGLE),
    ("zremrangebylex", 4, W, K::SINGLE),
    ("zrangestore", -5, W, TWO),
    ("zunionstore", -4, W, DEST_NUMKEYS),
    ("zinterstore", -4, W, DEST_NUMKEYS),
    ("zdiffstore", -4, W, DEST_NUMKEYS),

    // --- HyperLogLog / geo / streams ---
    ("pfcount", -2, R, K::ALL),
    ("pfadd", -2, W, K::SINGLE),
    ("pfmerge", -2, W, K::ALL),
    ("geopos", -2, R, K::SINGLE),
    ("geodist", -4, R, K::SINGLE),
    ("geohash", -2, R, K::SINGLE),
    ("geosearch", -7, R, K::SINGLE),
    ("geoadd", -5, W, K::SINGLE),
    ("xlen", 2, R, K::SINGLE),
    ("xrange", -4, R, K::SINGLE),
    ("xrevrange", -4, R, K::SINGLE),
    ("xpending", -3, R, K::SINGLE),
    ("xinfo", -3, R, SECOND),
    ("xadd", -5, W, K::SINGLE),
    ("xdel", -3, W, K::SINGLE),
    ("xtrim", -4, W, K::SINGLE),
    ("xack", -4, W, K::SINGLE),
    ("xclaim", -6, W, K::SINGLE),
    ("xautoclaim", -6, W, K::SINGLE),
    ("xgroup", -3, W, SECOND),

    // --- Scripting ---
    ("eval", -3, W, NUMKEYS_AT_2),
    ("evalsha", -3, W, NUMKEYS_AT_2),
    ("eval_ro", -3, R, NUMKEYS_AT_2),
    ("evalsha_ro", -3, R, NUMKEYS_AT_2),

    // --- Require upstream connection affinity ---
    ("subscribe", -2, F::UNSUPPORTED, K::None),
    ("psubscribe", -2, F::UNSUPPORTED, K::None),
    ("ssubscribe", -2, F::UNSUPPORTED, K::None),
    ("unsubscribe", -1, F::UNSUPPORTED, K::None),
    ("punsubscribe", -1, F::UNSUPPORTED, K::None),
    ("multi", 1, F::UNSUPPORTED, K::None),
    ("exec", 1, F::UNSUPPORTED, K::None),
    ("discard", 1, F::UNSUPPORTED, K::None),
    ("watch", -2, F::UNSUPPORTED, K::None),
    ("unwatch", 1, F::UNSUPPORTED, K::None),
    ("blpop", -3, F::UNSUPPORTED, K::None),
    ("brpop", -3, F::UNSUPPORTED, K::None),
    ("blmove", 6, F::UNSUPPORTED, K::None),
    ("brpoplpush", 4, F::UNSUPPORTED, K::None),
    ("bzpopmin", -3, F::UNSUPPORTED, K::None),
    ("bzpopmax", -3, F::UNSUPPORTED, K::None),
    ("monitor", 1, F::UNSUPPORTED, K::None),
    ("sync", 1, F::UNSUPPORTED, K::None),
    ("psync", -3, F::UNSUPPORTED, K::None),
    ("shutdown", -1, F::UNSUPPORTED, K::None),
    ("hello", -1, F::UNSUPPORTED, K::None),
];

/// The command table, keyed by lowercase command name.
pub static COMMAND_TABLE: Lazy<HashMap<&'static str, CommandSpec>> = Lazy::new(|| {
    ENTRIES
        .iter()
        .map(|&(name, arity, flags, keys)| {
            (
                name,
                CommandSpec {
                    name,
                    arity,
                    flags,
                    keys,
                },
            )
        })
        .collect()
});

/// Looks up a command by its lowercase name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.get(name)
}
