//! Events posted back to the runtime by background tasks

use crate::proxy::InstallOutcome;
use tokio::sync::mpsc;
use types::{Identity, Message};

#[derive(Debug)]
pub enum RuntimeEvent {
    /// A locally originated message, e.g. a timer tick
    Deliver(Message),
    /// Result of a background installation step of a proxy
    Install {
        proxy: Identity,
        outcome: InstallOutcome,
    },
}

pub type EventSender = mpsc::UnboundedSender<RuntimeEvent>;
