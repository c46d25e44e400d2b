//! Configuration carriers for session creation, connect and publish.
use crate::{misc::Will, properties::ConnectProperties, Version};
use bytes::Bytes;
use std::time::Duration;

/// Options for [`Client::new`](crate::Client::new).
#[derive(Clone, Debug)]
pub struct SessionOptions {
	/// Protocol version spoken on the wire. Defaults to 3.1.1.
	pub version: Version,
	/// Client identity communicated to the server on connect. A random
	/// UUIDv4 is generated when left empty.
	pub client_id: String,
	/// Deadline applied to each I/O operation. Zero disables it.
	pub timeout: Duration,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			version: Version::V3_1_1,
			client_id: String::new(),
			timeout: Duration::ZERO,
		}
	}
}

impl SessionOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_version(mut self, version: Version) -> Self {
		self.version = version;
		self
	}

	pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = client_id.into();
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}
}

/// Options for [`Client::connect`](crate::Client::connect).
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
	/// Ask the server to discard any previous session state.
	pub clean_session: bool,
	/// Keep-alive interval in seconds; zero means no keep-alive.
	pub keep_alive: u16,
	pub username: Option<String>,
	pub password: Option<String>,
	pub will: Option<Will>,
	/// MQTT 5 connect properties; ignored on a 3.1.1 session.
	pub properties: ConnectProperties,
}

impl ConnectOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_clean_session(mut self) -> Self {
		self.clean_session = true;
		self
	}

	/// Sets the keep-alive interval, clamped to 65,535 seconds.
	pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
		self.keep_alive = keep_alive.as_secs().min(u16::MAX as u64) as u16;
		self
	}

	pub fn with_username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	/// Note: a password without a username is rejected by
	/// [`connect`](crate::Client::connect).
	pub fn with_password(mut self, password: impl Into<String>) -> Self {
		self.password = Some(password.into());
		self
	}

	pub fn with_will(mut self, will: Will) -> Self {
		self.will = Some(will);
		self
	}

	pub fn with_session_expiry(mut self, seconds: u32) -> Self {
		self.properties.session_expiry = Some(seconds);
		self
	}

	pub fn with_receive_max(mut self, max: u16) -> Self {
		self.properties.receive_max = Some(max);
		self
	}

	pub fn with_max_packet_size(mut self, size: u32) -> Self {
		self.properties.max_packet_size = Some(size);
		self
	}

	pub fn with_topic_alias_max(mut self, max: u16) -> Self {
		self.properties.topic_alias_max = Some(max);
		self
	}

	pub fn with_request_response_info(mut self) -> Self {
		self.properties.request_response_info = true;
		self
	}

	pub fn with_disable_problem_info(mut self) -> Self {
		self.properties.disable_problem_info = true;
		self
	}

	pub fn with_auth(mut self, method: impl Into<String>, data: impl Into<Bytes>) -> Self {
		self.properties.auth_method = Some(method.into());
		self.properties.auth_data = Some(data.into());
		self
	}

	pub fn with_user_property(
		mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.properties
			.user_properties
			.push((key.into(), value.into()));
		self
	}
}

/// Options for [`Client::publish`](crate::Client::publish).
#[derive(Clone, Copy, Debug, Default)]
pub struct PublishOptions {
	/// Ask the server to retain the message for future subscribers.
	pub retain: bool,
}

impl PublishOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_retain(mut self) -> Self {
		self.retain = true;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keep_alive_clamps_to_u16() {
		let options = ConnectOptions::new().with_keep_alive(Duration::from_secs(1 << 20));
		assert_eq!(options.keep_alive, u16::MAX);

		let options = ConnectOptions::new().with_keep_alive(Duration::from_secs(30));
		assert_eq!(options.keep_alive, 30);
	}

	#[test]
	fn builders_compose() {
		let options = ConnectOptions::new()
			.with_clean_session()
			.with_username("foo")
			.with_password("bar")
			.with_session_expiry(120)
			.with_user_property("this", "is");

		assert!(options.clean_session);
		assert_eq!(options.username.as_deref(), Some("foo"));
		assert_eq!(options.password.as_deref(), Some("bar"));
		assert_eq!(options.properties.session_expiry, Some(120));
		assert_eq!(options.properties.user_properties.len(), 1);
	}
}
