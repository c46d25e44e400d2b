//! The background reader task.
//!
//! Exactly one runs per session. It parses every inbound packet,
//! forwards acknowledgements to waiting callers, answers the QoS 1/2
//! handshakes for inbound publishes, and continues the QoS 2 exchange
//! for outbound ones. The first I/O or protocol failure is deposited
//! on the session's fatal channel and ends the task.
use super::Session;
use crate::{error::Error, packets, Packet, PacketId, Result};
use std::sync::Arc;

pub(crate) async fn read_loop(session: Arc<Session>) {
	loop {
		let packet = match session.io.recv().await {
			Ok(Some(packet)) => packet,
			Ok(None) => {
				// Clean end-of-stream. Deposited so callers blocked on
				// an acknowledgement are released promptly.
				let _ = session.fatal_tx.try_send(Arc::new(Error::ConnectionClosed));
				return;
			}
			Err(error) => {
				let _ = session.fatal_tx.try_send(Arc::new(error));
				return;
			}
		};

		if let Err(error) = dispatch(&session, packet).await {
			tracing::error!(error = %error, "reader task failed");
			let _ = session.fatal_tx.try_send(Arc::new(error));
			return;
		}
	}
}

async fn dispatch(session: &Session, packet: Packet) -> Result<()> {
	match packet {
		Packet::ConnAck(ack) => {
			if session.conn_ack_tx.try_send(ack).is_err() {
				tracing::error!("packet lost: no caller waiting for ConnAck");
			}
			Ok(())
		}
		Packet::PingResp => {
			if session.ping_resp_tx.try_send(()).is_err() {
				tracing::error!("packet lost: no caller waiting for PingResp");
			}
			Ok(())
		}
		Packet::SubAck(ack) => {
			let id = ack.id;
			forward_ack(session, id, ack.into());
			Ok(())
		}
		Packet::UnsubAck(ack) => {
			let id = ack.id;
			forward_ack(session, id, ack.into());
			Ok(())
		}
		Packet::Publish(publish) => handle_publish(session, *publish).await,
		Packet::PubAck(packets::PubAck { id }) => {
			// QoS 1 terminal: the outbound publish is done.
			session.pending.del(id);
			Ok(())
		}
		Packet::PubRec(packets::PubRec { id }) => {
			// Outbound QoS 2, first half: release the publisher, then
			// continue with PUBREL and keep it for retransmission.
			session.pending.del(id);
			if let Some(waiter) = session.waiters.get(id) {
				let _ = waiter.try_send(Packet::PubRec(packets::PubRec { id }));
			}
			let pubrel = packets::PubRel { id };
			session.io.send(&pubrel.clone().into()).await?;
			session.pending.set(id, pubrel.into());
			Ok(())
		}
		Packet::PubRel(packets::PubRel { id }) => {
			// Inbound QoS 2, second half: drop the stored PUBREC state
			// and complete.
			session.pending.del(id);
			session.io.send(&packets::PubComp { id }.into()).await?;
			Ok(())
		}
		Packet::PubComp(packets::PubComp { id }) => {
			// QoS 2 terminal.
			session.pending.del(id);
			Ok(())
		}
		Packet::Connect(_)
		| Packet::Subscribe(_)
		| Packet::Unsubscribe(_)
		| Packet::PingReq
		| Packet::Disconnect
		| Packet::Auth => Err(Error::IllegalResponse),
	}
}

fn forward_ack(session: &Session, id: PacketId, packet: Packet) {
	match session.waiters.get(id) {
		Some(waiter) => {
			if waiter.try_send(packet).is_err() {
				tracing::error!(id = id.get(), "packet lost: ack waiter unavailable");
			}
		}
		None => {
			tracing::error!(id = id.get(), "packet lost: no ack waiter registered");
		}
	}
}

async fn handle_publish(session: &Session, publish: packets::Publish) -> Result<()> {
	if !session
		.router
		.deliver(publish.topic(), publish.payload().clone())
	{
		tracing::warn!(topic = %publish.topic(), "no subscriber for topic");
	}

	match publish {
		packets::Publish::AtMostOnce { .. } => Ok(()),
		packets::Publish::AtLeastOnce { id, .. } => {
			session.io.send(&packets::PubAck { id }.into()).await?;
			session.pending.del(id);
			Ok(())
		}
		packets::Publish::ExactlyOnce { id, .. } => {
			// The stored PUBREC makes a duplicate inbound publish with
			// the same id idempotent until PUBREL settles the flow.
			let pubrec = packets::PubRec { id };
			session.io.send(&pubrec.clone().into()).await?;
			session.pending.set(id, pubrec.into());
			Ok(())
		}
	}
}
