use tokio::sync::mpsc::UnboundedSender;

use crate::chain::NodeId;

/// Notifications from a conductor chain to whoever owns the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConductorEvent {
	/// Bytes for the transport, already encoded.
	Write { node: NodeId, text: String },
	/// The node gave up on framing; a login shell was requested instead.
	Abort { node: NodeId, reason: String },
	Quit { node: NodeId },
	StateChanged { node: NodeId },
	/// Input typed by the user may now go straight to the remote shell.
	StopQueueingInput { node: NodeId },
	/// The remote shell is ready for text queued before it started.
	SendInitialText { node: NodeId },
	/// A complete process snapshot pushed by the framer.
	Autopoll { node: NodeId, output: String },
}

impl ConductorEvent {
	pub fn node(&self) -> NodeId {
		match self {
			Self::Write { node, .. }
			| Self::Abort { node, .. }
			| Self::Quit { node }
			| Self::StateChanged { node }
			| Self::StopQueueingInput { node }
			| Self::SendInitialText { node }
			| Self::Autopoll { node, .. } => *node,
		}
	}
}

pub trait ConductorDelegate: Send + Sync {
	fn conductor_event(&self, event: ConductorEvent);
}

impl ConductorDelegate for UnboundedSender<ConductorEvent> {
	fn conductor_event(&self, event: ConductorEvent) {
		if self.send(event).is_err() {
			tracing::trace!("conductor.delegate_closed");
		}
	}
}
