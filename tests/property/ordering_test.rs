// tests/property/ordering_test.rs

//! Property-based tests for reply ordering under random upstream latency.

use crate::test_helpers::{TestContext, bulk};
use proptest::prelude::*;
use spinelproxy::core::protocol::RespFrame;
use std::time::Duration;

const NODE: &str = "10.0.0.1:6379";

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24, // Each case sleeps on simulated latency
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_replies_match_submission_order(
        delays in prop::collection::vec(0u64..30, 1..=8),
        picks in prop::collection::vec(0usize..8, 1..=40),
        split in 1usize..=40,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new();
            for (i, delay) in delays.iter().enumerate() {
                let key = format!("k{i}");
                ctx.pool.seed(NODE, &key, &format!("v{i}"));
                ctx.pool.delay_key(&key, Duration::from_millis(*delay));
            }

            let keys: Vec<String> = picks
                .iter()
                .map(|p| format!("k{}", p % delays.len()))
                .collect();
            let mut conn = ctx.connection();
            // Split the commands over two batches to cover batch boundaries.
            let split = split.min(keys.len());
            for chunk in [&keys[..split], &keys[split..]] {
                let commands: Vec<[&str; 2]> = chunk.iter().map(|k| ["GET", k.as_str()]).collect();
                let batch: Vec<&[&str]> = commands.iter().map(|c| &c[..]).collect();
                conn.send(&batch).unwrap();
            }

            let expected: Vec<RespFrame> = keys
                .iter()
                .map(|k| bulk(&k.replacen('k', "v", 1)))
                .collect();
            assert_eq!(conn.replies(keys.len()).await, expected);

            // The upstream also saw the commands in submission order.
            let seen: Vec<String> = ctx.pool.calls().into_iter().map(|c| c.args[1].clone()).collect();
            assert_eq!(seen, keys);
        });
    }

    #[test]
    fn test_too_busy_replies_keep_their_position(
        max_pending in 1usize..=5,
        count in 1usize..=12,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::from_toml(&format!(
                "max_pending_per_connection = {max_pending}\n{}",
                crate::test_helpers::DEFAULT_ROUTE_TOML
            ));
            ctx.pool.delay_key("slow", Duration::from_millis(20));

            let mut conn = ctx.connection();
            let batch: Vec<&[&str]> = (0..count).map(|_| &["GET", "slow"][..]).collect();
            conn.send(&batch).unwrap();

            let replies = conn.replies(count).await;
            for (i, reply) in replies.iter().enumerate() {
                if i < max_pending {
                    assert_eq!(reply, &RespFrame::Null);
                } else {
                    assert!(reply.is_error(), "reply {i} should be TOO BUSY");
                }
            }
            assert_eq!(ctx.pool.calls().len(), count.min(max_pending));
        });
    }
}
