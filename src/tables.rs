//! Concurrent per-session tables keyed by packet identifier.
//!
//! Both tables are touched by the background reader and by caller
//! tasks; each has its own mutex and neither is held across an await
//! or while the other is locked.
use crate::{Packet, PacketId};
use std::{collections::HashMap, sync::Mutex};
use tokio::sync::mpsc;

/// In-flight packets awaiting their terminal acknowledgement.
#[derive(Debug, Default)]
pub struct PendingTable {
	packets: Mutex<HashMap<PacketId, Packet>>,
}

impl PendingTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts only if `id` is free. Returns `false` on a duplicate.
	pub fn add(&self, id: PacketId, packet: Packet) -> bool {
		let mut packets = self.packets.lock().expect("pending table lock poisoned");
		if packets.contains_key(&id) {
			return false;
		}
		packets.insert(id, packet);
		true
	}

	/// Inserts unconditionally, replacing any previous entry.
	pub fn set(&self, id: PacketId, packet: Packet) {
		self.packets
			.lock()
			.expect("pending table lock poisoned")
			.insert(id, packet);
	}

	pub fn get(&self, id: PacketId) -> Option<Packet> {
		self.packets
			.lock()
			.expect("pending table lock poisoned")
			.get(&id)
			.cloned()
	}

	pub fn contains(&self, id: PacketId) -> bool {
		self.packets
			.lock()
			.expect("pending table lock poisoned")
			.contains_key(&id)
	}

	pub fn del(&self, id: PacketId) -> Option<Packet> {
		self.packets
			.lock()
			.expect("pending table lock poisoned")
			.remove(&id)
	}
}

/// Single-slot sinks used to hand an acknowledgement packet to the
/// caller that is blocked waiting for it.
#[derive(Debug, Default)]
pub struct AckWaiters {
	waiters: Mutex<HashMap<PacketId, mpsc::Sender<Packet>>>,
}

impl AckWaiters {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a capacity-1 waiter for `id` and returns its receiving
	/// end, or `None` if a waiter is already registered.
	pub fn new_waiter(&self, id: PacketId) -> Option<mpsc::Receiver<Packet>> {
		let mut waiters = self.waiters.lock().expect("ack waiters lock poisoned");
		if waiters.contains_key(&id) {
			return None;
		}
		let (tx, rx) = mpsc::channel(1);
		waiters.insert(id, tx);
		Some(rx)
	}

	pub fn get(&self, id: PacketId) -> Option<mpsc::Sender<Packet>> {
		self.waiters
			.lock()
			.expect("ack waiters lock poisoned")
			.get(&id)
			.cloned()
	}

	pub fn contains(&self, id: PacketId) -> bool {
		self.waiters
			.lock()
			.expect("ack waiters lock poisoned")
			.contains_key(&id)
	}

	pub fn del(&self, id: PacketId) {
		self.waiters
			.lock()
			.expect("ack waiters lock poisoned")
			.remove(&id);
	}
}
