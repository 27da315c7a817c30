use std::{collections::HashMap, sync::Arc};

use tracing::{error, info};

use crate::event::{InboundEvent, Reply};
use crate::gate::Gate;
use crate::ledger::ModerationLedger;
use crate::platform::ChatPlatform;
use crate::purge::PurgeEngine;
use crate::settings::SettingsStore;
use crate::supervisor::{self, ProcessSupervisor};
use crate::Result;

/// Shared dependencies handed to every operation handler.
#[derive(Clone)]
pub struct OpContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub ledger: Arc<ModerationLedger>,
    pub purge: Arc<PurgeEngine>,
    pub settings: Arc<SettingsStore>,
    pub supervisor: Arc<ProcessSupervisor>,
}

/// A named, registered unit of dispatchable behavior.
///
/// Immutable after registration; the dispatcher owns the registry and looks
/// operations up by their exact name.
#[async_trait::async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;
    fn usage(&self) -> &'static str;
    fn gate(&self) -> &dyn Gate;

    async fn run(&self, ctx: &OpContext, event: &InboundEvent, args: &[String]) -> Result<Reply>;
}

#[derive(Default)]
pub struct Registry {
    ops: HashMap<&'static str, Arc<dyn Operation>>,
}

impl Registry {
    pub fn register(&mut self, op: Arc<dyn Operation>) {
        self.ops.insert(op.name(), op);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.ops.get(name).cloned()
    }
}

/// Parses inbound events, applies the operation's gate, invokes the
/// handler, and converts every handler failure into a reply.
///
/// Independent dispatches interleave freely; a suspended handler never
/// blocks the next event.
pub struct CommandDispatcher {
    registry: Registry,
    ctx: OpContext,
}

impl CommandDispatcher {
    pub fn new(registry: Registry, ctx: OpContext) -> Self {
        Self { registry, ctx }
    }

    pub fn context(&self) -> &OpContext {
        &self.ctx
    }

    /// Dispatch one inbound event.
    ///
    /// `None` means the event was not addressed to us (no prefix, or a bot
    /// author). Everything else, including unknown commands and handler
    /// failures, comes back as a reply for the invoking channel.
    pub async fn dispatch(&self, event: InboundEvent) -> Option<Reply> {
        if event.actor.is_bot {
            return None;
        }

        let prefix = self.ctx.settings.prefix().await;
        let rest = event.content.strip_prefix(&prefix)?;

        let mut tokens = rest.split_whitespace();
        let name = tokens.next()?.to_string();
        let args: Vec<String> = tokens.map(str::to_owned).collect();

        let Some(op) = self.registry.get(&name) else {
            return Some(Reply::text(format!(":x: No such command: `{name}`")));
        };

        // The gate runs before the handler can cause any side effect.
        if !op.gate().allows(&event.actor) {
            info!(user = %event.actor.id, command = %name, "permission denied");
            return Some(Reply::text(
                ":x: You are not permitted to use this command.",
            ));
        }

        self.ctx.supervisor.note_task(op.name());

        // Handlers run in their own task: their panics stop at this
        // boundary, and a suspended handler does not hold up the caller's
        // event loop, which dispatches from separate tasks anyway.
        let ctx = self.ctx.clone();
        let run_event = event.clone();
        let run_op = Arc::clone(&op);
        let handle = tokio::spawn(supervisor::contained(async move {
            run_op.run(&ctx, &run_event, &args).await
        }));

        match handle.await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(err)) => match err.user_message() {
                Some(msg) => Some(Reply::text(msg)),
                None => {
                    error!(command = %name, "command failed: {err}");
                    Some(Reply::text(":x: Something went wrong running that command."))
                }
            },
            Err(join_err) => {
                error!(command = %name, "command handler panicked: {join_err}");
                Some(Reply::text(":x: Something went wrong running that command."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::gate::{OwnerAllowList, Permissions, RequirePermission};
    use crate::supervisor::SupervisorState;
    use crate::testing::{test_context, test_event, TestContext};
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        gate: RequirePermission,
        runs: AtomicUsize,
        behavior: Behavior,
    }

    enum Behavior {
        Reply,
        Fail(fn() -> Error),
        Panic,
    }

    impl Probe {
        fn new(required: Permissions, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                gate: RequirePermission(required),
                runs: AtomicUsize::new(0),
                behavior,
            })
        }
    }

    #[async_trait::async_trait]
    impl Operation for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn usage(&self) -> &'static str {
            "probe [args]"
        }

        fn gate(&self) -> &dyn Gate {
            &self.gate
        }

        async fn run(
            &self,
            _ctx: &OpContext,
            _event: &InboundEvent,
            args: &[String],
        ) -> Result<Reply> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Reply => Ok(Reply::text(format!("ran with {} args", args.len()))),
                Behavior::Fail(make) => Err(make()),
                Behavior::Panic => panic!("handler exploded"),
            }
        }
    }

    fn dispatcher(tc: &TestContext, op: Arc<Probe>) -> CommandDispatcher {
        let mut registry = Registry::default();
        registry.register(op);
        CommandDispatcher::new(registry, tc.ctx.clone())
    }

    #[tokio::test]
    async fn unprefixed_and_bot_events_are_ignored() {
        let tc = test_context();
        let op = Probe::new(Permissions::empty(), Behavior::Reply);
        let d = dispatcher(&tc, op.clone());

        let mut event = test_event("probe one two");
        event.content = "probe without prefix".to_string();
        assert_eq!(d.dispatch(event).await, None);

        let mut event = test_event("probe");
        event.actor.is_bot = true;
        assert_eq!(d.dispatch(event).await, None);

        assert_eq!(op.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tokens_after_the_name_become_positional_args() {
        let tc = test_context();
        let op = Probe::new(Permissions::empty(), Behavior::Reply);
        let d = dispatcher(&tc, op.clone());

        let reply = d.dispatch(test_event("probe  one   two")).await.unwrap();
        assert_eq!(reply.message(), Some("ran with 2 args"));
    }

    #[tokio::test]
    async fn unknown_command_is_a_reply_not_an_error() {
        let tc = test_context();
        let d = dispatcher(&tc, Probe::new(Permissions::empty(), Behavior::Reply));

        let reply = d.dispatch(test_event("nosuch")).await.unwrap();
        assert_eq!(reply.message(), Some(":x: No such command: `nosuch`"));
    }

    #[tokio::test]
    async fn gate_denial_prevents_the_handler_from_running() {
        let tc = test_context();
        let op = Probe::new(Permissions::BAN_MEMBERS, Behavior::Reply);
        let d = dispatcher(&tc, op.clone());

        let mut event = test_event("probe");
        event.actor.permissions = Permissions::empty();
        let reply = d.dispatch(event).await.unwrap();

        assert_eq!(
            reply.message(),
            Some(":x: You are not permitted to use this command.")
        );
        assert_eq!(op.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn operation_errors_surface_as_their_reply() {
        let tc = test_context();
        let op = Probe::new(
            Permissions::empty(),
            Behavior::Fail(|| Error::OutOfRange(150)),
        );
        let d = dispatcher(&tc, op);

        let reply = d.dispatch(test_event("probe")).await.unwrap();
        assert!(reply.message().unwrap().contains("out of range"));
    }

    #[tokio::test]
    async fn unexpected_errors_become_a_generic_failure_reply() {
        let tc = test_context();
        let op = Probe::new(
            Permissions::empty(),
            Behavior::Fail(|| Error::Platform("api fell over".to_string())),
        );
        let d = dispatcher(&tc, op);

        let reply = d.dispatch(test_event("probe")).await.unwrap();
        assert_eq!(
            reply.message(),
            Some(":x: Something went wrong running that command.")
        );
    }

    #[tokio::test]
    async fn handler_panics_stop_at_the_dispatcher_boundary() {
        let tc = test_context();
        let op = Probe::new(Permissions::empty(), Behavior::Panic);
        let d = dispatcher(&tc, op);

        let reply = d.dispatch(test_event("probe")).await.unwrap();
        assert_eq!(
            reply.message(),
            Some(":x: Something went wrong running that command.")
        );
        // The failure never escalated to the supervisor tier.
        assert_eq!(tc.ctx.supervisor.state(), SupervisorState::Running);
        assert!(tc.control.exit_codes().is_empty());
    }

    #[tokio::test]
    async fn owner_gate_applies_to_lifecycle_style_operations() {
        struct OwnerProbe {
            gate: OwnerAllowList,
        }

        #[async_trait::async_trait]
        impl Operation for OwnerProbe {
            fn name(&self) -> &'static str {
                "ownerprobe"
            }
            fn usage(&self) -> &'static str {
                "ownerprobe"
            }
            fn gate(&self) -> &dyn Gate {
                &self.gate
            }
            async fn run(
                &self,
                _ctx: &OpContext,
                _event: &InboundEvent,
                _args: &[String],
            ) -> Result<Reply> {
                Ok(Reply::text("ok"))
            }
        }

        let tc = test_context();
        let mut registry = Registry::default();
        registry.register(Arc::new(OwnerProbe {
            gate: OwnerAllowList(vec![UserId(777)]),
        }));
        let d = CommandDispatcher::new(registry, tc.ctx.clone());

        let denied = d.dispatch(test_event("ownerprobe")).await.unwrap();
        assert!(denied.message().unwrap().contains("not permitted"));

        let mut event = test_event("ownerprobe");
        event.actor.id = UserId(777);
        let allowed = d.dispatch(event).await.unwrap();
        assert_eq!(allowed.message(), Some("ok"));
    }
}
