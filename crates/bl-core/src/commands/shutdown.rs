use tracing::warn;

use crate::dispatcher::{OpContext, Operation};
use crate::domain::UserId;
use crate::event::{InboundEvent, Reply};
use crate::gate::{Gate, OwnerAllowList};
use crate::Result;

/// `shutdown [-f|-r]`
///
/// Owner-only lifecycle control: graceful by default, `-f` skips the
/// platform disconnect, `-r` exits for an external process manager to
/// restart us. The farewell goes out before the supervisor starts tearing
/// things down.
pub struct Shutdown {
    gate: OwnerAllowList,
}

impl Shutdown {
    pub fn new(owners: Vec<UserId>) -> Self {
        Self {
            gate: OwnerAllowList(owners),
        }
    }
}

#[async_trait::async_trait]
impl Operation for Shutdown {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    fn usage(&self) -> &'static str {
        "shutdown [-f|-r]"
    }

    fn gate(&self) -> &dyn Gate {
        &self.gate
    }

    async fn run(&self, ctx: &OpContext, event: &InboundEvent, args: &[String]) -> Result<Reply> {
        let mode = args.first().map(String::as_str);
        let farewell = match mode {
            Some("-r") => "Restarting.",
            _ => "Bye.",
        };
        if let Err(err) = ctx.platform.send_message(event.channel_id, farewell).await {
            warn!(error = %err, "farewell message failed");
        }

        match mode {
            Some("-f") => ctx.supervisor.shutdown(true).await,
            Some("-r") => ctx.supervisor.reboot().await,
            _ => ctx.supervisor.shutdown(false).await,
        }

        Ok(Reply::silent())
    }
}
