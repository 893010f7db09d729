// tests/integration/plugin_test.rs

//! The plugin chain as seen through the command processor.

use super::test_helpers::{DEFAULT_ROUTE_TOML, TestContext, bulk, cmd};
use bytes::Bytes;
use parking_lot::Mutex;
use spinelproxy::config::Config;
use spinelproxy::core::ProxyError;
use spinelproxy::core::metrics;
use spinelproxy::core::plugin::{PluginAction, PluginContext, ProxyPlugin};
use spinelproxy::core::protocol::{Command, RespFrame};
use std::sync::Arc;

/// Appends `<name>.before` and `<name>.after` to a shared log.
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    answer: Option<RespFrame>,
}

impl Recorder {
    fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            answer: None,
        })
    }

    fn answering(name: &'static str, log: &Arc<Mutex<Vec<String>>>, answer: RespFrame) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            answer: Some(answer),
        })
    }
}

impl ProxyPlugin for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn before(&self, _ctx: &PluginContext, _command: &Command) -> Result<PluginAction, ProxyError> {
        self.log.lock().push(format!("{}.before", self.name));
        Ok(match &self.answer {
            Some(frame) => PluginAction::Reply(frame.clone()),
            None => PluginAction::Continue,
        })
    }

    fn after(&self, _ctx: &PluginContext, _command: &Command, _reply: &mut RespFrame) -> Result<(), ProxyError> {
        self.log.lock().push(format!("{}.after", self.name));
        Ok(())
    }
}

/// Prefixes every key with the tenant label.
struct KeyPrefixer;

impl ProxyPlugin for KeyPrefixer {
    fn name(&self) -> &str {
        "key-prefixer"
    }

    fn before(&self, ctx: &PluginContext, command: &Command) -> Result<PluginAction, ProxyError> {
        if command.name() != "get" {
            return Ok(PluginAction::Continue);
        }
        let key = String::from_utf8_lossy(&command.args()[1]);
        let rewritten = Command::from_strs(&["GET", &format!("{}:{}", ctx.tenant.label(), key)])?;
        Ok(PluginAction::Rewrite(rewritten))
    }
}

/// Upper-cases bulk string replies.
struct Shouter;

impl ProxyPlugin for Shouter {
    fn name(&self) -> &str {
        "shouter"
    }

    fn after(&self, _ctx: &PluginContext, _command: &Command, reply: &mut RespFrame) -> Result<(), ProxyError> {
        if let RespFrame::BulkString(b) = reply {
            *b = Bytes::from(b.to_ascii_uppercase());
        }
        Ok(())
    }
}

/// Panics in both hooks.
struct Panicker;

impl ProxyPlugin for Panicker {
    fn name(&self) -> &str {
        "panicker"
    }

    fn before(&self, _ctx: &PluginContext, _command: &Command) -> Result<PluginAction, ProxyError> {
        panic!("before hook blew up");
    }

    fn after(&self, _ctx: &PluginContext, _command: &Command, _reply: &mut RespFrame) -> Result<(), ProxyError> {
        panic!("after hook blew up");
    }
}

/// Edits the reply and then fails; the edit must not survive.
struct HalfEditor;

impl ProxyPlugin for HalfEditor {
    fn name(&self) -> &str {
        "half-editor"
    }

    fn after(&self, _ctx: &PluginContext, _command: &Command, reply: &mut RespFrame) -> Result<(), ProxyError> {
        *reply = RespFrame::Null;
        Err(ProxyError::Internal("changed my mind".into()))
    }
}

#[tokio::test]
async fn test_short_circuit_skips_dispatch_but_runs_after_hooks_in_reverse() {
    let ctx = TestContext::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    ctx.state.plugins.install(vec![
        Recorder::new("a", &log),
        Recorder::answering("b", &log, RespFrame::SimpleString("CACHED".into())),
        Recorder::new("c", &log),
    ]);

    let mut session = ctx.session();
    let reply = ctx.exec(&mut session, &["GET", "k"]).await;

    assert_eq!(reply, RespFrame::SimpleString("CACHED".into()));
    assert!(ctx.pool.calls().is_empty());
    assert_eq!(
        *log.lock(),
        vec!["a.before", "b.before", "c.after", "b.after", "a.after"]
    );
}

#[tokio::test]
async fn test_full_chain_order_around_dispatch() {
    let ctx = TestContext::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    ctx.state
        .plugins
        .install(vec![Recorder::new("a", &log), Recorder::new("b", &log)]);

    let mut session = ctx.session();
    ctx.exec(&mut session, &["SET", "k", "v"]).await;

    assert_eq!(ctx.pool.calls().len(), 1);
    assert_eq!(*log.lock(), vec!["a.before", "b.before", "b.after", "a.after"]);
}

#[tokio::test]
async fn test_rewrite_changes_what_is_dispatched() {
    let ctx = TestContext::new();
    ctx.pool.seed("10.0.0.1:6379", "default_default:k", "scoped");
    ctx.state
        .plugins
        .install(vec![Arc::new(KeyPrefixer), Arc::new(Shouter)]);

    let mut session = ctx.session();
    let reply = ctx.exec(&mut session, &["GET", "k"]).await;

    assert_eq!(reply, bulk("SCOPED"));
    assert_eq!(ctx.pool.calls()[0].args, vec!["GET", "default_default:k"]);
}

#[tokio::test]
async fn test_panicking_plugin_is_skipped() {
    let ctx = TestContext::new();
    ctx.pool.seed("10.0.0.1:6379", "k", "v");
    ctx.state
        .plugins
        .install(vec![Arc::new(Panicker), Arc::new(Shouter)]);
    let failures_before = metrics::PLUGIN_FAILURES_TOTAL
        .with_label_values(&["panicker"])
        .get();

    let mut session = ctx.session();
    let reply = ctx.exec(&mut session, &["GET", "k"]).await;

    assert_eq!(reply, bulk("V"));
    let failures_after = metrics::PLUGIN_FAILURES_TOTAL
        .with_label_values(&["panicker"])
        .get();
    assert!(failures_after >= failures_before + 2.0);
}

#[tokio::test]
async fn test_failed_after_hook_does_not_leak_partial_edits() {
    let ctx = TestContext::new();
    ctx.pool.seed("10.0.0.1:6379", "k", "v");
    ctx.state.plugins.install(vec![Arc::new(HalfEditor)]);

    let mut session = ctx.session();
    assert_eq!(ctx.exec(&mut session, &["GET", "k"]).await, bulk("v"));
}

#[tokio::test]
async fn test_after_hooks_see_local_and_error_replies() {
    let ctx = TestContext::new();
    ctx.state.plugins.install(vec![Arc::new(Shouter)]);

    let mut session = ctx.session();
    assert_eq!(ctx.exec(&mut session, &["ECHO", "hi"]).await, bulk("HI"));
    let reply = ctx.exec(&mut session, &["GET"]).await;
    assert_eq!(
        reply,
        RespFrame::Error("ERR wrong number of arguments for 'get' command".into())
    );
}

#[tokio::test]
async fn test_builtin_plugins_from_config() {
    let ctx = TestContext::from_toml(&format!(
        r#"
[[plugins]]
name = "deny-keys"
order = 2
settings = {{ patterns = ["secret:*"] }}

[[plugins]]
name = "deny-commands"
order = 1
settings = {{ commands = ["FLUSHALL"] }}

[[plugins]]
name = "big-key-log"
enabled = false
{DEFAULT_ROUTE_TOML}"#
    ));
    assert_eq!(
        ctx.state.plugins.snapshot().names(),
        vec!["deny-commands", "deny-keys"]
    );

    let mut session = ctx.session();
    assert_eq!(
        ctx.exec(&mut session, &["FLUSHALL"]).await,
        RespFrame::Error("ERR command denied: flushall".into())
    );
    assert_eq!(
        ctx.exec(&mut session, &["GET", "secret:1"]).await,
        RespFrame::Error("ERR command denied: key 'secret:1' is not allowed".into())
    );
    assert_eq!(ctx.exec(&mut session, &["GET", "public"]).await, RespFrame::Null);
    assert_eq!(ctx.pool.calls().len(), 1);
}

#[tokio::test]
async fn test_plugin_chain_swap_on_reload() {
    let ctx = TestContext::new();
    let initial = ctx.state.plugins.snapshot();
    assert!(initial.is_empty());

    let config = Config::parse(&format!(
        "[[plugins]]\nname = \"deny-commands\"\nsettings = {{ commands = [\"get\"] }}\n{DEFAULT_ROUTE_TOML}"
    ))
    .unwrap();
    ctx.state.apply_config(config).await.unwrap();

    let current = ctx.state.plugins.snapshot();
    assert_eq!(current.version(), initial.version() + 1);
    assert_eq!(current.names(), vec!["deny-commands"]);

    let mut session = ctx.session();
    assert!(ctx.exec(&mut session, &["GET", "k"]).await.is_error());
}

#[tokio::test]
async fn test_unknown_plugin_fails_the_reload() {
    let ctx = TestContext::new();
    let config = Config::parse(&format!(
        "[[plugins]]\nname = \"does-not-exist\"\n{DEFAULT_ROUTE_TOML}"
    ))
    .unwrap();

    let err = ctx.state.apply_config(config).await.unwrap_err();
    assert!(err.to_string().contains("does-not-exist"));
    assert!(ctx.state.plugins.snapshot().is_empty());
    assert_eq!(ctx.state.routes.version(), 1);
}

#[tokio::test]
async fn test_chain_can_be_driven_directly() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let chain = spinelproxy::core::plugin::PluginChain::new(
        7,
        vec![Recorder::new("only", &log) as Arc<dyn ProxyPlugin>],
    );
    let ctx = PluginContext {
        client_id: 1,
        addr: "127.0.0.1:1".parse().unwrap(),
        tenant: Default::default(),
    };

    let outcome = chain.before(&ctx, cmd(&["PING"]));
    assert!(outcome.reply.is_none());
    let reply = chain.after(&ctx, &outcome.command, RespFrame::ok());
    assert_eq!(reply, RespFrame::ok());
    assert_eq!(chain.version(), 7);
    assert_eq!(*log.lock(), vec!["only.before", "only.after"]);
}
