//! Routing of inbound PUBLISH payloads to subscriber sinks.
//!
//! Filters live in a prefix tree over `/`-separated levels with the
//! reserved child keys `+` (one level) and `#` (the remainder). A
//! concrete match always beats `+`, which beats `#`; if a more
//! specific branch dead-ends, matching backs up and tries the next
//! wildcard.
use crate::{Filter, Topic};
use bytes::Bytes;
use std::{collections::HashMap, sync::RwLock};
use tokio::sync::mpsc;

/// Sink a subscriber receives matching payloads on.
pub type DeliveryTx = mpsc::Sender<Bytes>;

#[derive(Debug, Default)]
struct Node {
	children: HashMap<String, Node>,
	sink: Option<DeliveryTx>,
}

impl Node {
	fn find(&self, levels: &[&str]) -> Option<&DeliveryTx> {
		let Some((level, rest)) = levels.split_first() else {
			// Topic exhausted: this node, or a terminal `#` child
			// covering zero further levels.
			return self
				.sink
				.as_ref()
				.or_else(|| self.children.get("#").and_then(|node| node.sink.as_ref()));
		};

		if let Some(sink) = self
			.children
			.get(*level)
			.and_then(|child| child.find(rest))
		{
			return Some(sink);
		}

		if let Some(sink) = self.children.get("+").and_then(|child| child.find(rest)) {
			return Some(sink);
		}

		self.children.get("#").and_then(|node| node.sink.as_ref())
	}

	/// Removes the sink at the end of `levels`, pruning nodes left
	/// with no sink and no children on the way back up.
	fn remove(&mut self, levels: &[&str]) {
		let Some((level, rest)) = levels.split_first() else {
			self.sink = None;
			return;
		};

		if let Some(child) = self.children.get_mut(*level) {
			child.remove(rest);
			if child.sink.is_none() && child.children.is_empty() {
				self.children.remove(*level);
			}
		}
	}
}

#[derive(Debug, Default)]
pub struct Router {
	root: RwLock<Node>,
}

impl Router {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `sink` under `filter`, replacing any previous sink.
	pub fn insert(&self, filter: &Filter, sink: DeliveryTx) {
		let mut guard = self.root.write().expect("router lock poisoned");
		let mut node = &mut *guard;
		for level in filter.levels() {
			node = node.children.entry(String::from(level)).or_default();
		}
		node.sink = Some(sink);
	}

	pub fn remove(&self, filter: &Filter) {
		let levels: Vec<&str> = filter.levels().collect();
		self.root
			.write()
			.expect("router lock poisoned")
			.remove(&levels);
	}

	/// Delivers `payload` to the most specific matching sink without
	/// blocking. A full sink drops the payload; back-pressure is the
	/// subscriber's responsibility. Returns `false` when no filter
	/// matches.
	pub fn deliver(&self, topic: &Topic, payload: Bytes) -> bool {
		let levels: Vec<&str> = topic.levels().collect();
		let sink = {
			let root = self.root.read().expect("router lock poisoned");
			root.find(&levels).cloned()
		};

		let Some(sink) = sink else {
			return false;
		};

		match sink.try_send(payload) {
			Ok(()) => {}
			Err(mpsc::error::TrySendError::Full(_)) => {
				tracing::error!(topic = %topic, "subscriber sink is full, discarding payload");
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				tracing::warn!(topic = %topic, "subscriber sink is closed, discarding payload");
			}
		}
		true
	}
}
