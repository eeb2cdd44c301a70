use nsm_cells::{CellEndpoint, CellPath, CellStub};
use tracing::debug;

use crate::messages::NamespaceMessage;

/// Fire-and-forget copies of namespace messages to another cell.
#[derive(Clone)]
pub struct Relay {
    stub: CellStub<NamespaceMessage>,
    destination: CellPath,
}

impl Relay {
    pub fn new(endpoint: CellEndpoint<NamespaceMessage>, destination: CellPath) -> Self {
        Self {
            stub: CellStub::new(endpoint),
            destination,
        }
    }

    pub fn destination(&self) -> &CellPath {
        &self.destination
    }

    /// Send `msg` on without asking for an answer. Delivery failures are
    /// logged by the stub and otherwise ignored.
    pub fn forward(&self, msg: NamespaceMessage) {
        debug!(destination = %self.destination, "relaying {}", msg);
        self.stub
            .notify(self.destination.clone(), msg.without_reply());
    }
}
