//! The client session engine.
//!
//! A [`Client`] owns one transport. A single background reader task
//! parses everything the server sends, drives the QoS handshakes and
//! hands acknowledgements to whichever caller is waiting on them;
//! callers may invoke the public operations from any task.
mod task;

#[cfg(test)]
mod tests;

use crate::{
	error::Error,
	misc::Credentials,
	options::{ConnectOptions, PublishOptions, SessionOptions},
	packets::{ConnAck, Connect, EncodeError, Publish, Subscribe, Unsubscribe},
	router::{DeliveryTx, Router},
	stream::{PacketIo, Transport},
	tables::{AckWaiters, PendingTable},
	FilterBuf, Packet, PacketId, QoS, Result, Topic, Version,
};
use bytes::Bytes;
use std::{
	sync::{
		atomic::{AtomicU32, Ordering},
		Arc, Mutex as StdMutex,
	},
	time::{Duration, Instant},
};
use tokio::sync::{mpsc, Mutex};

/// One subscription request: a topic filter, the requested quality of
/// service, and the sink matching payloads are delivered to.
#[derive(Clone, Debug)]
pub struct Subscription {
	pub filter: FilterBuf,
	pub qos: QoS,
	pub sink: DeliveryTx,
}

impl Subscription {
	pub fn new(filter: FilterBuf, qos: QoS, sink: DeliveryTx) -> Self {
		Self { filter, qos, sink }
	}
}

pub(crate) struct Session {
	pub(crate) io: PacketIo,
	pub(crate) pending: PendingTable,
	pub(crate) waiters: AckWaiters,
	pub(crate) router: Router,
	pub(crate) id_counter: AtomicU32,
	pub(crate) fatal_tx: mpsc::Sender<Arc<Error>>,
	fatal_rx: Mutex<mpsc::Receiver<Arc<Error>>>,
	pub(crate) conn_ack_tx: mpsc::Sender<ConnAck>,
	conn_ack_rx: Mutex<mpsc::Receiver<ConnAck>>,
	pub(crate) ping_resp_tx: mpsc::Sender<()>,
	ping_resp_rx: Mutex<mpsc::Receiver<()>>,
	expires_at: StdMutex<Option<Instant>>,
}

/// An MQTT client session over one transport.
///
/// The session lives until the transport closes; errors observed by
/// the background reader are fatal, and a new client over a new
/// transport must be constructed afterwards. No automatic reconnect
/// is performed.
pub struct Client {
	/// The client identity communicated with the server on connect.
	pub client_id: String,
	version: Version,
	session: Arc<Session>,
}

impl Client {
	/// Creates a session over `transport` and starts its background
	/// reader. The user must call [`connect`](Self::connect) before
	/// using the rest of the client API.
	///
	/// Must be called from within a tokio runtime.
	pub fn new(transport: impl Transport + Unpin + 'static, options: SessionOptions) -> Self {
		let client_id = if options.client_id.is_empty() {
			uuid::Uuid::new_v4().to_string()
		} else {
			options.client_id
		};

		let (fatal_tx, fatal_rx) = mpsc::channel(1);
		let (conn_ack_tx, conn_ack_rx) = mpsc::channel(1);
		let (ping_resp_tx, ping_resp_rx) = mpsc::channel(1);

		let session = Arc::new(Session {
			io: PacketIo::new(Box::new(transport), options.version, options.timeout),
			pending: PendingTable::new(),
			waiters: AckWaiters::new(),
			router: Router::new(),
			id_counter: AtomicU32::new(rand::random::<u16>() as u32),
			fatal_tx,
			fatal_rx: Mutex::new(fatal_rx),
			conn_ack_tx,
			conn_ack_rx: Mutex::new(conn_ack_rx),
			ping_resp_tx,
			ping_resp_rx: Mutex::new(ping_resp_rx),
			expires_at: StdMutex::new(None),
		});

		tokio::spawn(task::read_loop(Arc::clone(&session)));

		Self {
			client_id,
			version: options.version,
			session,
		}
	}

	#[inline]
	pub fn version(&self) -> Version {
		self.version
	}

	/// The instant the keep-alive interval agreed at connect runs out,
	/// if one was set.
	pub fn expires_at(&self) -> Option<Instant> {
		*self
			.session
			.expires_at
			.lock()
			.expect("session lock poisoned")
	}

	/// Establishes the MQTT connection: sends CONNECT and waits for
	/// the server's CONNACK, mapping its return code.
	pub async fn connect(&self, options: ConnectOptions) -> Result<()> {
		let credentials = match (options.username, options.password) {
			(Some(username), password) => Some(Credentials { username, password }),
			(None, Some(_)) => {
				return Err(
					EncodeError::ProtocolViolation("password set without a username").into(),
				)
			}
			(None, None) => None,
		};

		let connect = Connect {
			version: self.version,
			client_id: self.client_id.clone(),
			clean_session: options.clean_session,
			keep_alive: options.keep_alive,
			will: options.will,
			credentials,
			properties: options.properties,
		};

		if connect.keep_alive > 0 {
			let deadline = Instant::now() + Duration::from_secs(connect.keep_alive.into());
			*self
				.session
				.expires_at
				.lock()
				.expect("session lock poisoned") = Some(deadline);
		}

		self.session.io.send(&connect.into()).await?;

		let ack = self.session.wait_conn_ack().await?;
		match ack.code {
			ConnAck::ACCEPTED => Ok(()),
			ConnAck::BAD_VERSION => Err(Error::BadVersion),
			ConnAck::ID_NOT_ALLOWED => Err(Error::IdNotAllowed),
			ConnAck::SERVER_UNAVAILABLE => Err(Error::Unavailable),
			ConnAck::BAD_CREDENTIALS => Err(Error::BadCredentials),
			ConnAck::NOT_AUTHORIZED => Err(Error::NotAuthorized),
			_ => Err(Error::IllegalResponse),
		}
	}

	/// Sends DISCONNECT and closes the transport. The send error, if
	/// any, takes precedence over the close error.
	pub async fn disconnect(self) -> Result<()> {
		let sent = self.session.io.send(&Packet::Disconnect).await;
		let closed = self.session.io.close().await;
		sent.and(closed)
	}

	/// Sends PINGREQ and blocks until the matching PINGRESP.
	pub async fn ping(&self) -> Result<()> {
		self.session.io.send(&Packet::PingReq).await?;
		self.session.wait_ping_resp().await
	}

	/// Publishes `payload` to `topic` at the given quality of service.
	///
	/// At `AtMostOnce` the call returns once the packet is written; at
	/// `AtLeastOnce` it also returns after the write, and the reader
	/// clears the in-flight entry when PUBACK arrives; at
	/// `ExactlyOnce` the call blocks until the server's PUBREC, with
	/// the reader completing the PUBREL/PUBCOMP exchange.
	pub async fn publish(
		&self,
		topic: impl AsRef<Topic>,
		payload: impl Into<Bytes>,
		qos: QoS,
		options: PublishOptions,
	) -> Result<()> {
		let topic = topic.as_ref().to_topic_buf();
		let payload = payload.into();

		match qos {
			QoS::AtMostOnce => {
				let publish = Publish::AtMostOnce {
					retain: options.retain,
					topic,
					payload,
				};
				self.session.io.send(&publish.into()).await
			}
			QoS::AtLeastOnce => {
				let id = self.session.acquire_id()?;
				let publish: Packet = Publish::AtLeastOnce {
					id,
					retain: options.retain,
					duplicate: false,
					topic,
					payload,
				}
				.into();

				if !self.session.pending.add(id, publish.clone()) {
					return Err(Error::InternalConflict);
				}
				if let Err(error) = self.session.io.send(&publish).await {
					self.session.pending.del(id);
					return Err(error);
				}
				Ok(())
			}
			QoS::ExactlyOnce => {
				let id = self.session.acquire_id()?;
				let Some(mut waiter) = self.session.waiters.new_waiter(id) else {
					return Err(Error::InternalConflict);
				};
				let publish: Packet = Publish::ExactlyOnce {
					id,
					retain: options.retain,
					duplicate: false,
					topic,
					payload,
				}
				.into();

				if !self.session.pending.add(id, publish.clone()) {
					self.session.waiters.del(id);
					return Err(Error::InternalConflict);
				}
				if let Err(error) = self.session.io.send(&publish).await {
					self.session.waiters.del(id);
					self.session.pending.del(id);
					return Err(error);
				}

				let result = self.session.wait_ack(&mut waiter).await;
				self.session.waiters.del(id);
				match result? {
					Packet::PubRec(_) => Ok(()),
					_ => Err(Error::InternalConflict),
				}
			}
		}
	}

	/// Sends SUBSCRIBE for the given filters and blocks until the
	/// matching SUBACK, returning the server's per-filter return
	/// codes. A filter the server refuses (code above 2) is removed
	/// from the router again.
	pub async fn subscribe(&self, subscriptions: Vec<Subscription>) -> Result<Vec<u8>> {
		if subscriptions.is_empty() {
			return Ok(Vec::new());
		}

		let id = self.session.acquire_id()?;
		let Some(mut waiter) = self.session.waiters.new_waiter(id) else {
			return Err(Error::InternalConflict);
		};

		// Sinks are registered before the SUBSCRIBE goes out so that a
		// publish racing the SUBACK still finds its subscriber.
		for subscription in &subscriptions {
			self.session
				.router
				.insert(&subscription.filter, subscription.sink.clone());
		}

		let packet = Subscribe {
			id,
			filters: subscriptions
				.iter()
				.map(|subscription| (subscription.filter.clone(), subscription.qos))
				.collect(),
		};

		if let Err(error) = self.session.io.send(&packet.into()).await {
			self.session.waiters.del(id);
			for subscription in &subscriptions {
				self.session.router.remove(&subscription.filter);
			}
			return Err(error);
		}

		let result = self.session.wait_ack(&mut waiter).await;
		self.session.waiters.del(id);
		let ack = match result? {
			Packet::SubAck(ack) => ack,
			_ => return Err(Error::InternalConflict),
		};

		for (subscription, code) in subscriptions.iter().zip(&ack.return_codes) {
			if *code > QoS::ExactlyOnce as u8 {
				self.session.router.remove(&subscription.filter);
			}
		}

		Ok(ack.return_codes)
	}

	/// Sends UNSUBSCRIBE and blocks until the matching UNSUBACK, then
	/// drops the filters from the router.
	pub async fn unsubscribe(&self, filters: Vec<FilterBuf>) -> Result<()> {
		if filters.is_empty() {
			return Ok(());
		}

		let id = self.session.acquire_id()?;
		let Some(mut waiter) = self.session.waiters.new_waiter(id) else {
			return Err(Error::InternalConflict);
		};

		let packet = Unsubscribe {
			id,
			filters: filters.clone(),
		};

		if let Err(error) = self.session.io.send(&packet.into()).await {
			self.session.waiters.del(id);
			return Err(error);
		}

		let result = self.session.wait_ack(&mut waiter).await;
		self.session.waiters.del(id);
		match result? {
			Packet::UnsubAck(_) => {
				for filter in &filters {
					self.session.router.remove(filter);
				}
				Ok(())
			}
			_ => Err(Error::InternalConflict),
		}
	}
}

impl Session {
	/// Reserves a packet identifier not currently used by either
	/// table. The counter is 32 bits truncated to 16 so concurrent
	/// increments cannot collide within one sweep.
	pub(crate) fn acquire_id(&self) -> Result<PacketId> {
		for _ in 0..=u16::MAX as u32 {
			let id = self.id_counter.fetch_add(1, Ordering::Relaxed) as u16;
			let Some(id) = PacketId::new(id) else {
				continue;
			};
			if self.pending.contains(id) || self.waiters.contains(id) {
				continue;
			}
			return Ok(id);
		}
		Err(Error::OutOfPacketIds)
	}

	async fn wait_conn_ack(&self) -> Result<ConnAck> {
		let mut rx = self.conn_ack_rx.lock().await;
		let mut fatal = self.fatal_rx.lock().await;
		tokio::select! {
			ack = rx.recv() => ack.ok_or(Error::ConnectionClosed),
			error = fatal.recv() => Err(self.repost(error)),
		}
	}

	async fn wait_ping_resp(&self) -> Result<()> {
		let mut rx = self.ping_resp_rx.lock().await;
		let mut fatal = self.fatal_rx.lock().await;
		tokio::select! {
			resp = rx.recv() => resp.ok_or(Error::ConnectionClosed),
			error = fatal.recv() => Err(self.repost(error)),
		}
	}

	async fn wait_ack(&self, rx: &mut mpsc::Receiver<Packet>) -> Result<Packet> {
		let mut fatal = self.fatal_rx.lock().await;
		tokio::select! {
			packet = rx.recv() => packet.ok_or(Error::ConnectionClosed),
			error = fatal.recv() => Err(self.repost(error)),
		}
	}

	/// Re-posts a fatal error so the next blocked caller observes it
	/// too, and returns it to the current one.
	fn repost(&self, error: Option<Arc<Error>>) -> Error {
		let error = error.unwrap_or_else(|| Arc::new(Error::ConnectionClosed));
		let _ = self.fatal_tx.try_send(Arc::clone(&error));
		Error::Fatal(error)
	}
}
