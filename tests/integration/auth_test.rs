// tests/integration/auth_test.rs

//! Auth gating and tenant binding through the command processor.

use super::test_helpers::{TestContext, bulk};
use parking_lot::Mutex;
use spinelproxy::core::ProxyError;
use spinelproxy::core::plugin::{PluginAction, PluginContext, ProxyPlugin};
use spinelproxy::core::protocol::{Command, RespFrame};
use spinelproxy::core::routing::TenantKey;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TENANT_CONFIG: &str = r#"
[auth]
password = "legacy-secret"

[[auth.users]]
username = "alice"
password = "alice-pass"
tenant_id = 1
tenant_group = "blue"

[[auth.users]]
username = "bob"
password = "bob-pass"
tenant_id = 2

[[auth.users]]
username = "ops"
password = "ops-pass"
tenant_id = 2
allow_rebind = true

[[auth.users]]
username = "carol"
password = "carol-pass"
tenant_id = 42
tenant_group = "groupA"

[[routes]]
resource = { type = "standalone", addr = "redis://10.0.0.1:6379" }

[[routes]]
tenant_id = 1
tenant_group = "blue"
resource = { type = "standalone", addr = "redis://10.0.1.1:6379" }

[[routes]]
tenant_id = 2
resource = { type = "standalone", addr = "redis://10.0.2.1:6379" }
"#;

/// Records every hook call it sees.
#[derive(Default)]
struct HookLog {
    calls: Mutex<Vec<String>>,
}

impl ProxyPlugin for HookLog {
    fn name(&self) -> &str {
        "hook-log"
    }

    fn before(&self, _ctx: &PluginContext, command: &Command) -> Result<PluginAction, ProxyError> {
        self.calls.lock().push(format!("before {}", command.name()));
        Ok(PluginAction::Continue)
    }

    fn after(&self, _ctx: &PluginContext, command: &Command, _reply: &mut RespFrame) -> Result<(), ProxyError> {
        self.calls.lock().push(format!("after {}", command.name()));
        Ok(())
    }
}

#[tokio::test]
async fn test_commands_require_auth_when_credentials_are_configured() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let hooks = Arc::new(HookLog::default());
    ctx.state.plugins.install(vec![hooks.clone() as Arc<dyn ProxyPlugin>]);
    let mut session = ctx.session();

    let reply = ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(reply, RespFrame::Error("NOAUTH Authentication required.".into()));
    let reply = ctx.exec(&mut session, &["PING"]).await;
    assert_eq!(reply, RespFrame::Error("NOAUTH Authentication required.".into()));
    assert!(ctx.pool.calls().is_empty());
    assert!(hooks.calls.lock().is_empty());

    // AUTH itself stays out of the chain; the next command goes through it.
    assert_eq!(ctx.exec(&mut session, &["AUTH", "alice", "alice-pass"]).await, RespFrame::ok());
    assert!(hooks.calls.lock().is_empty());
    ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(*hooks.calls.lock(), vec!["before get", "after get"]);
}

#[tokio::test]
async fn test_legacy_password_binds_the_default_tenant() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let mut session = ctx.session();

    assert_eq!(ctx.exec(&mut session, &["AUTH", "legacy-secret"]).await, RespFrame::ok());
    assert_eq!(session.tenant, Some(TenantKey::default_domain()));

    ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(ctx.pool.addrs(), vec!["10.0.0.1:6379"]);
}

#[tokio::test]
async fn test_tenant_users_are_routed_to_their_own_resource() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    ctx.pool.seed("10.0.1.1:6379", "k", "blue");
    ctx.pool.seed("10.0.2.1:6379", "k", "two");

    let mut alice = ctx.session();
    let mut bob = ctx.session();
    assert_eq!(ctx.exec(&mut alice, &["AUTH", "alice", "alice-pass"]).await, RespFrame::ok());
    assert_eq!(ctx.exec(&mut bob, &["AUTH", "bob", "bob-pass"]).await, RespFrame::ok());

    assert_eq!(ctx.exec(&mut alice, &["GET", "k"]).await, bulk("blue"));
    assert_eq!(ctx.exec(&mut bob, &["GET", "k"]).await, bulk("two"));

    let counts = ctx.state.clients.tenant_counts();
    assert_eq!(counts.get("1_blue"), Some(&1));
    assert_eq!(counts.get("2_default"), Some(&1));
}

#[tokio::test]
async fn test_tenant_without_route_gets_no_route_error() {
    // No default route here, so nothing falls back.
    let ctx = TestContext::from_toml(
        r#"
[[auth.users]]
username = "carol"
password = "carol-pass"
tenant_id = 42
tenant_group = "groupA"

[[routes]]
tenant_id = 7
resource = { type = "standalone", addr = "redis://10.0.7.1:6379" }
"#,
    );
    let mut session = ctx.session();
    assert_eq!(ctx.exec(&mut session, &["AUTH", "carol", "carol-pass"]).await, RespFrame::ok());

    let reply = ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(
        reply,
        RespFrame::Error("ERR no route configured for tenant (42, groupA)".into())
    );
    assert!(ctx.pool.calls().is_empty());
}

#[tokio::test]
async fn test_tenant_without_own_route_falls_back_to_default() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let mut session = ctx.session();
    assert_eq!(ctx.exec(&mut session, &["AUTH", "carol", "carol-pass"]).await, RespFrame::ok());

    ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(ctx.pool.addrs(), vec!["10.0.0.1:6379"]);
}

#[tokio::test]
async fn test_wrong_password_is_rejected_after_a_delay() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let mut session = ctx.session();

    let started = Instant::now();
    let reply = ctx.exec(&mut session, &["AUTH", "alice", "nope"]).await;
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(
        reply,
        RespFrame::Error("WRONGPASS invalid username-password pair or user is disabled.".into())
    );
    assert!(!session.is_authenticated);
    assert_eq!(session.tenant, None);
}

#[tokio::test]
async fn test_rebinding_to_another_tenant_is_refused() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let mut session = ctx.session();
    assert_eq!(ctx.exec(&mut session, &["AUTH", "alice", "alice-pass"]).await, RespFrame::ok());

    let reply = ctx.exec(&mut session, &["AUTH", "bob", "bob-pass"]).await;
    assert_eq!(
        reply,
        RespFrame::Error("ERR connection is already bound to tenant (1, blue)".into())
    );
    assert_eq!(session.tenant, Some(TenantKey::new(Some(1), Some("blue"))));

    // Re-authenticating as the same tenant is fine.
    assert_eq!(ctx.exec(&mut session, &["AUTH", "alice", "alice-pass"]).await, RespFrame::ok());
}

#[tokio::test]
async fn test_rebinding_is_allowed_when_the_grant_permits_it() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let mut session = ctx.session();
    assert_eq!(ctx.exec(&mut session, &["AUTH", "alice", "alice-pass"]).await, RespFrame::ok());
    assert_eq!(ctx.exec(&mut session, &["AUTH", "ops", "ops-pass"]).await, RespFrame::ok());
    assert_eq!(session.tenant, Some(TenantKey::new(Some(2), None::<String>)));
}

#[tokio::test]
async fn test_failed_reauth_keeps_the_existing_binding() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let mut session = ctx.session();
    assert_eq!(ctx.exec(&mut session, &["AUTH", "alice", "alice-pass"]).await, RespFrame::ok());

    let reply = ctx.exec(&mut session, &["AUTH", "alice", "wrong"]).await;
    assert!(reply.is_error());
    assert!(session.is_authenticated);
    assert_eq!(session.tenant, Some(TenantKey::new(Some(1), Some("blue"))));
}

#[tokio::test]
async fn test_auth_without_configured_credentials() {
    let ctx = TestContext::new();
    let mut session = ctx.session();

    let reply = ctx.exec(&mut session, &["AUTH", "whatever"]).await;
    assert_eq!(
        reply,
        RespFrame::Error("ERR Client sent AUTH, but no password is set".into())
    );
    // The session was usable before and still is.
    assert_eq!(ctx.exec(&mut session, &["PING"]).await, RespFrame::SimpleString("PONG".into()));
}

#[tokio::test]
async fn test_optional_auth_still_binds_a_tenant() {
    let ctx = TestContext::from_toml(&TENANT_CONFIG.replacen("[auth]", "[auth]\nrequired = false", 1));
    let mut session = ctx.session();

    // Unauthenticated sessions use the default tenant.
    ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(ctx.exec(&mut session, &["AUTH", "alice", "alice-pass"]).await, RespFrame::ok());
    ctx.exec(&mut session, &["GET", "k"]).await;
    assert_eq!(ctx.pool.addrs(), vec!["10.0.0.1:6379", "10.0.1.1:6379"]);
}

#[tokio::test]
async fn test_auth_arity_is_checked() {
    let ctx = TestContext::from_toml(TENANT_CONFIG);
    let mut session = ctx.session();
    let reply = ctx.exec(&mut session, &["AUTH", "a", "b", "c"]).await;
    assert_eq!(
        reply,
        RespFrame::Error("ERR wrong number of arguments for 'auth' command".into())
    );
}
