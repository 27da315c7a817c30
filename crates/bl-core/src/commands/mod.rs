//! The registered operations. Each file holds one command (or one family)
//! with its gate; `registry` wires them all up for the dispatcher.

use std::sync::Arc;

use crate::dispatcher::Registry;
use crate::domain::UserId;

mod ban;
mod purge;
mod settings;
mod shutdown;

pub fn registry(owners: Vec<UserId>) -> Registry {
    let mut registry = Registry::default();
    registry.register(Arc::new(ban::Ban::new()));
    registry.register(Arc::new(purge::Purge::new()));
    registry.register(Arc::new(shutdown::Shutdown::new(owners)));
    registry.register(Arc::new(settings::SetLog::new()));
    registry.register(Arc::new(settings::SetNotifyRep::new()));
    registry
}
