// src/core/processor.rs

//! The command processor: auth gate, then the plugin `before` phase, then
//! dispatch (local or upstream), then the plugin `after` phase.

use crate::connection::SessionState;
use crate::core::ProxyError;
use crate::core::auth::AuthOutcome;
use crate::core::commands::CommandFlags;
use crate::core::info;
use crate::core::metrics;
use crate::core::plugin::{BeforeOutcome, PluginChain, PluginContext};
use crate::core::protocol::{Command, RespFrame};
use crate::core::state::ProxyState;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info_span};

/// Added before a bad-credential reply is released.
const AUTH_FAILURE_DELAY: Duration = Duration::from_millis(100);

/// A future that always resolves to the command's reply.
pub type ReplyFuture = BoxFuture<'static, RespFrame>;

/// How a processed command's reply becomes available.
pub enum Dispatch {
    /// Known without waiting on anything.
    Ready(RespFrame),
    /// Resolves later, possibly on another worker.
    Pending(ReplyFuture),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Ready(frame) => f.debug_tuple("Ready").field(frame).finish(),
            Dispatch::Pending(_) => f.write_str("Pending"),
        }
    }
}

impl Dispatch {
    /// Waits for the reply. Mostly useful outside a transponder.
    pub async fn resolve(self) -> RespFrame {
        match self {
            Dispatch::Ready(frame) => frame,
            Dispatch::Pending(future) => future.await,
        }
    }
}

/// What a local command produced.
enum LocalReply {
    Frame(RespFrame),
    Info(Option<String>),
}

/// Processes single commands for one proxy. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    state: Arc<ProxyState>,
}

impl CommandProcessor {
    pub fn new(state: Arc<ProxyState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ProxyState> {
        &self.state
    }

    /// Runs the synchronous part of the pipeline against `session` and
    /// returns the reply, or the future that will produce it.
    ///
    /// Everything that touches the session happens here, on the connection's
    /// own task. The returned future owns what it needs and may run anywhere.
    pub fn process(&self, session: &mut SessionState, command: Command) -> Dispatch {
        let span = info_span!(
            "command",
            name = %command.name(),
            client.id = session.client_id,
            tenant = %session.tenant()
        );
        let _enter = span.enter();

        match self.state.auth.authenticate(session, &command) {
            AuthOutcome::Accepted(tenant) => {
                self.state.clients.bind_tenant(session.client_id, tenant);
                return Dispatch::Ready(RespFrame::ok());
            }
            AuthOutcome::Rejected(e) => {
                metrics::AUTH_REJECTIONS_TOTAL.inc();
                debug!("Command rejected by auth gate: {}", e);
                if e == ProxyError::InvalidPassword {
                    return Dispatch::Pending(
                        async move {
                            tokio::time::sleep(AUTH_FAILURE_DELAY).await;
                            RespFrame::from(e)
                        }
                        .boxed(),
                    );
                }
                return Dispatch::Ready(e.into());
            }
            AuthOutcome::NotAnAuthCommand => {}
        }

        let chain = self.state.plugins.snapshot();
        let ctx = PluginContext {
            client_id: session.client_id,
            addr: session.addr,
            tenant: session.tenant(),
        };
        let BeforeOutcome { command, reply } = chain.before(&ctx, command);
        if let Some(reply) = reply {
            return Dispatch::Ready(chain.after(&ctx, &command, reply));
        }

        if let Err(e) = self.check(&command) {
            return Dispatch::Ready(chain.after(&ctx, &command, e.into()));
        }

        if command.spec().is_some_and(|spec| spec.is_local()) {
            return match self.execute_local(session, &command) {
                LocalReply::Frame(frame) => Dispatch::Ready(chain.after(&ctx, &command, frame)),
                LocalReply::Info(section) => {
                    let state = self.state.clone();
                    Dispatch::Pending(
                        async move {
                            let text = info::render(&state, section.as_deref()).await;
                            let reply = RespFrame::BulkString(Bytes::from(text));
                            chain.after(&ctx, &command, reply)
                        }
                        .boxed(),
                    )
                }
            };
        }

        self.dispatch_upstream(chain, ctx, command, span.clone())
    }

    fn check(&self, command: &Command) -> Result<(), ProxyError> {
        let Some(spec) = command.spec() else {
            return Err(ProxyError::UnknownCommand(command.name().to_string()));
        };
        if spec.flags.contains(CommandFlags::UNSUPPORTED) {
            return Err(ProxyError::UnsupportedCommand(command.name().to_string()));
        }
        command.check_arity()
    }

    fn dispatch_upstream(
        &self,
        chain: Arc<PluginChain>,
        ctx: PluginContext,
        command: Command,
        span: tracing::Span,
    ) -> Dispatch {
        let kind = command.kind();
        self.state.stats.record_command(kind);
        metrics::COMMANDS_PROCESSED_TOTAL
            .with_label_values(&[kind.as_ref()])
            .inc();

        let template = self.state.templates.get_template(&ctx.tenant);
        let timeout = self.state.command_timeout;
        let started = Instant::now();

        Dispatch::Pending(
            async move {
                let send = template.send(command.clone());
                let reply = if timeout.is_zero() {
                    send.await
                } else {
                    match tokio::time::timeout(timeout, send).await {
                        Ok(reply) => reply,
                        Err(_) => {
                            metrics::UPSTREAM_TIMEOUTS_TOTAL.inc();
                            debug!("Upstream timeout after {:?}", timeout);
                            ProxyError::UpstreamTimeout.into()
                        }
                    }
                };
                metrics::COMMAND_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
                chain.after(&ctx, &command, reply)
            }
            .instrument(span)
            .boxed(),
        )
    }

    fn execute_local(&self, session: &mut SessionState, command: &Command) -> LocalReply {
        let text = |i: usize| command.arg(i).map(|b| String::from_utf8_lossy(b).into_owned());
        let frame = match command.name() {
            "ping" => match command.arg(1) {
                Some(msg) if command.argc() == 2 => RespFrame::BulkString(msg.clone()),
                Some(_) => ProxyError::WrongArgumentCount("ping".into()).into(),
                None => RespFrame::SimpleString("PONG".into()),
            },
            "echo" => RespFrame::BulkString(command.args()[1].clone()),
            "quit" => {
                session.quit_requested = true;
                RespFrame::ok()
            }
            "select" => match text(1).as_deref() {
                Some("0") => RespFrame::ok(),
                _ => RespFrame::Error("ERR SELECT is not allowed through the proxy".into()),
            },
            "command" => RespFrame::Array(Vec::new()),
            "info" => return LocalReply::Info(text(1)),
            "client" => self.execute_client(session, command),
            other => ProxyError::UnknownCommand(other.to_string()).into(),
        };
        LocalReply::Frame(frame)
    }

    fn execute_client(&self, session: &mut SessionState, command: &Command) -> RespFrame {
        let sub = command
            .arg(1)
            .map(|b| String::from_utf8_lossy(b).to_ascii_lowercase())
            .unwrap_or_default();
        match (sub.as_str(), command.argc()) {
            ("id", 2) => RespFrame::Integer(session.client_id as i64),
            ("getname", 2) => match &session.name {
                Some(name) => RespFrame::BulkString(Bytes::from(name.clone())),
                None => RespFrame::Null,
            },
            ("setname", 3) => {
                let name = String::from_utf8_lossy(&command.args()[2]).into_owned();
                if name.contains(' ') {
                    return RespFrame::Error(
                        "ERR Client names cannot contain spaces, newlines or special characters."
                            .into(),
                    );
                }
                let name = (!name.is_empty()).then_some(name);
                session.name = name.clone();
                self.state.clients.set_name(session.client_id, name);
                RespFrame::ok()
            }
            ("id" | "getname" | "setname", _) => {
                ProxyError::WrongArgumentCount(format!("client|{sub}")).into()
            }
            _ => RespFrame::Error(format!(
                "ERR unknown subcommand '{sub}'. Try CLIENT ID, GETNAME or SETNAME."
            )),
        }
    }
}
