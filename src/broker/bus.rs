//! In-process message surfaces the broker protocol runs on.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use tokio::sync::{Notify, broadcast, mpsc};
// self
use crate::_prelude::*;

const ECHO_CAPACITY: usize = 64;

/// Message posted on a [`MessageBus`], optionally transferring a port to the recipient.
#[derive(Debug)]
pub struct BusMessage {
	/// Payload.
	pub data: Value,
	/// Port handed to whoever handles the message.
	pub port: Option<MessagePort>,
}

/// Verdict of a [`BusInterceptor`].
#[derive(Debug)]
pub enum Interception {
	/// The message was consumed; later interceptors and listeners do not see it.
	Handled,
	/// The message was not for this interceptor.
	Pass(BusMessage),
}

/// Party that sees bus messages before ordinary listeners, the way a broker's content
/// script sees page messages first.
pub trait BusInterceptor
where
	Self: Send + Sync,
{
	/// Inspects `message`, taking ownership of it when handled.
	fn intercept(&self, message: BusMessage) -> Interception;
}

/// Shared page-level message surface.
///
/// Interceptors run in registration order. A message no interceptor handles is echoed to
/// every listener, without its port.
#[derive(Clone)]
pub struct MessageBus {
	interceptors: Arc<RwLock<Vec<Arc<dyn BusInterceptor>>>>,
	echoes: broadcast::Sender<Value>,
}
impl MessageBus {
	/// Creates a bus with no interceptors.
	pub fn new() -> Self {
		let (echoes, _) = broadcast::channel(ECHO_CAPACITY);

		Self { interceptors: Default::default(), echoes }
	}

	/// Registers an interceptor.
	pub fn add_interceptor(&self, interceptor: Arc<dyn BusInterceptor>) {
		self.interceptors.write().push(interceptor);
	}

	/// Registers a listener; dropping the receiver removes it.
	pub fn subscribe(&self) -> broadcast::Receiver<Value> {
		self.echoes.subscribe()
	}

	/// Posts `data`, transferring `port` to the handler if one is given.
	pub fn post(&self, data: Value, port: Option<MessagePort>) {
		let interceptors = self.interceptors.read().clone();
		let mut message = BusMessage { data, port };

		for interceptor in interceptors {
			match interceptor.intercept(message) {
				Interception::Handled => return,
				Interception::Pass(passed) => message = passed,
			}
		}

		// A bus without listeners drops the echo.
		let _ = self.echoes.send(message.data);
	}
}
impl Default for MessageBus {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for MessageBus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MessageBus")
			.field("interceptors", &self.interceptors.read().len())
			.field("listeners", &self.echoes.receiver_count())
			.finish()
	}
}

#[derive(Debug, Default)]
struct Entanglement {
	closed: AtomicBool,
	notify: Notify,
}

/// One end of a [`MessageChannel`].
///
/// Closing either end closes both; posting to a closed port is a no-op.
#[derive(Debug)]
pub struct MessagePort {
	outbound: mpsc::UnboundedSender<Value>,
	inbound: AsyncMutex<mpsc::UnboundedReceiver<Value>>,
	entanglement: Arc<Entanglement>,
}
impl MessagePort {
	/// Sends `message` to the other end.
	pub fn post(&self, message: Value) {
		if self.is_closed() {
			return;
		}

		// The peer may have been dropped.
		let _ = self.outbound.send(message);
	}

	/// Waits for the next message; `None` once the channel is closed or the peer is gone.
	pub async fn recv(&self) -> Option<Value> {
		let mut inbound = self.inbound.lock().await;
		let closed = self.entanglement.notify.notified();

		if self.is_closed() {
			return None;
		}

		tokio::select! {
			_ = closed => None,
			message = inbound.recv() => message.filter(|_| !self.is_closed()),
		}
	}

	/// Closes both ends.
	pub fn close(&self) {
		if !self.entanglement.closed.swap(true, Ordering::AcqRel) {
			self.entanglement.notify.notify_waiters();
		}
	}

	/// Returns true once either end was closed.
	pub fn is_closed(&self) -> bool {
		self.entanglement.closed.load(Ordering::Acquire)
	}
}

/// Dedicated two-port pipe.
#[derive(Debug)]
pub struct MessageChannel {
	/// End kept by the creator.
	pub port1: MessagePort,
	/// End transferred to the peer.
	pub port2: MessagePort,
}
impl MessageChannel {
	/// Creates an open channel.
	pub fn new() -> Self {
		let (to_port2, port2_inbound) = mpsc::unbounded_channel();
		let (to_port1, port1_inbound) = mpsc::unbounded_channel();
		let entanglement = Arc::new(Entanglement::default());

		Self {
			port1: MessagePort {
				outbound: to_port2,
				inbound: AsyncMutex::new(port1_inbound),
				entanglement: entanglement.clone(),
			},
			port2: MessagePort {
				outbound: to_port1,
				inbound: AsyncMutex::new(port2_inbound),
				entanglement,
			},
		}
	}
}
impl Default for MessageChannel {
	fn default() -> Self {
		Self::new()
	}
}
