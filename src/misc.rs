use crate::{properties::WillProperties, QoS, TopicBuf};
use bytes::Bytes;

/// Client credentials
///
/// Note that it is not possible to set a password without also setting
/// a username.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
	pub username: String,
	pub password: Option<String>,
}

impl From<&str> for Credentials {
	#[inline]
	fn from(username: &str) -> Self {
		Self {
			username: String::from(username),
			password: None,
		}
	}
}

impl From<(&str, &str)> for Credentials {
	#[inline]
	fn from((username, password): (&str, &str)) -> Self {
		Self {
			username: String::from(username),
			password: Some(String::from(password)),
		}
	}
}

/// Will Message
///
/// The will message is set by the Client when it connects to the
/// Server. If the Client disconnects abnormally, the Server publishes
/// the will message to the topic on behalf of the Client. The will
/// message MUST be published with the Will QoS and Retain flags as
/// specified.
#[derive(Clone, Debug, PartialEq)]
pub struct Will {
	/// The topic to publish the will message to.
	pub topic: TopicBuf,

	/// The message to publish as the will.
	pub payload: Bytes,

	/// The quality of service to publish the will message at.
	pub qos: QoS,

	/// Whether or not the will message should be retained.
	pub retain: bool,

	/// Will properties, encoded for MQTT 5 connections only.
	pub properties: WillProperties,
}

impl Will {
	pub fn new(topic: TopicBuf, payload: impl Into<Bytes>) -> Self {
		Self {
			topic,
			payload: payload.into(),
			qos: QoS::AtMostOnce,
			retain: false,
			properties: WillProperties::default(),
		}
	}

	pub fn with_qos(mut self, qos: QoS) -> Self {
		self.qos = qos;
		self
	}

	pub fn with_retain(mut self) -> Self {
		self.retain = true;
		self
	}

	pub fn with_properties(mut self, properties: WillProperties) -> Self {
		self.properties = properties;
		self
	}
}
