use super::*;
use crate::{
	packets::{self, ConnAck},
	stream::PacketIo,
	Packet, QoS, Version,
};
use tokio::{io::duplex, sync::mpsc, time};

fn session_pair() -> (Client, PacketIo) {
	let (near, far) = duplex(4096);
	let client = Client::new(
		near,
		SessionOptions::new().with_client_id("tester"),
	);
	let broker = PacketIo::new(Box::new(far), Version::V3_1_1, Duration::ZERO);
	(client, broker)
}

async fn recv(broker: &PacketIo) -> Packet {
	broker.recv().await.unwrap().expect("stream closed")
}

async fn eventually(condition: impl Fn() -> bool) {
	for _ in 0..200 {
		if condition() {
			return;
		}
		time::sleep(Duration::from_millis(2)).await;
	}
	panic!("condition not reached in time");
}

fn filter(s: &str) -> FilterBuf {
	FilterBuf::new(s).unwrap()
}

fn topic(s: &str) -> &Topic {
	Topic::new(s).unwrap()
}

async fn connect_with_code(code: u8) -> Result<()> {
	let (client, broker) = session_pair();
	let (result, _) = tokio::join!(client.connect(ConnectOptions::new()), async {
		let Packet::Connect(connect) = recv(&broker).await else {
			panic!("expected Connect");
		};
		assert_eq!(connect.client_id, "tester");
		broker
			.send(
				&ConnAck {
					session_present: false,
					code,
				}
				.into(),
			)
			.await
			.unwrap();
	});
	result
}

#[tokio::test]
async fn connect_accepted() {
	let (client, broker) = session_pair();

	let options = ConnectOptions::new()
		.with_clean_session()
		.with_keep_alive(Duration::from_secs(60))
		.with_username("foo")
		.with_password("bar");

	let (result, _) = tokio::join!(client.connect(options), async {
		let Packet::Connect(connect) = recv(&broker).await else {
			panic!("expected Connect");
		};
		assert_eq!(connect.client_id, "tester");
		assert!(connect.clean_session);
		assert_eq!(connect.keep_alive, 60);
		assert_eq!(
			connect.credentials,
			Some(("foo", "bar").into())
		);
		broker
			.send(
				&ConnAck {
					session_present: false,
					code: ConnAck::ACCEPTED,
				}
				.into(),
			)
			.await
			.unwrap();
	});
	result.unwrap();
	assert!(client.expires_at().is_some());
}

#[tokio::test]
async fn connect_maps_return_codes() {
	assert!(matches!(
		connect_with_code(ConnAck::BAD_VERSION).await,
		Err(Error::BadVersion)
	));
	assert!(matches!(
		connect_with_code(ConnAck::ID_NOT_ALLOWED).await,
		Err(Error::IdNotAllowed)
	));
	assert!(matches!(
		connect_with_code(ConnAck::SERVER_UNAVAILABLE).await,
		Err(Error::Unavailable)
	));
	assert!(matches!(
		connect_with_code(ConnAck::BAD_CREDENTIALS).await,
		Err(Error::BadCredentials)
	));
	assert!(matches!(
		connect_with_code(ConnAck::NOT_AUTHORIZED).await,
		Err(Error::NotAuthorized)
	));
	assert!(matches!(
		connect_with_code(69).await,
		Err(Error::IllegalResponse)
	));
}

#[tokio::test]
async fn connect_rejects_password_without_username() {
	let (client, _broker) = session_pair();
	let result = client
		.connect(ConnectOptions::new().with_password("hunter2"))
		.await;
	assert!(matches!(result, Err(Error::Encode(_))));
}

#[tokio::test]
async fn ping_round_trip() {
	let (client, broker) = session_pair();

	let (result, _) = tokio::join!(client.ping(), async {
		assert_eq!(recv(&broker).await, Packet::PingReq);
		broker.send(&Packet::PingResp).await.unwrap();
	});
	result.unwrap();
}

#[tokio::test]
async fn publish_qos0_is_fire_and_forget() {
	let (client, broker) = session_pair();

	client
		.publish(topic("foo/bar"), &b"baz"[..], QoS::AtMostOnce, PublishOptions::new())
		.await
		.unwrap();

	let Packet::Publish(publish) = recv(&broker).await else {
		panic!("expected Publish");
	};
	assert_eq!(publish.topic().as_str(), "foo/bar");
	assert_eq!(&publish.payload()[..], b"baz");
	assert_eq!(publish.qos(), QoS::AtMostOnce);
	assert_eq!(publish.id(), None);
}

#[tokio::test]
async fn publish_qos1_returns_after_send_and_clears_pending() {
	let (client, broker) = session_pair();

	client
		.publish(
			topic("foo/bar"),
			&b"foobar"[..],
			QoS::AtLeastOnce,
			PublishOptions::new().with_retain(),
		)
		.await
		.unwrap();

	let Packet::Publish(publish) = recv(&broker).await else {
		panic!("expected Publish");
	};
	let id = publish.id().unwrap();
	assert!(publish.retain());
	assert!(client.session.pending.contains(id));

	broker
		.send(&packets::PubAck { id }.into())
		.await
		.unwrap();
	eventually(|| !client.session.pending.contains(id)).await;
}

#[tokio::test]
async fn publish_qos2_completes_the_handshake() {
	let (client, broker) = session_pair();

	let broker_task = async {
		let Packet::Publish(publish) = recv(&broker).await else {
			panic!("expected Publish");
		};
		let id = publish.id().unwrap();
		assert_eq!(publish.qos(), QoS::ExactlyOnce);
		broker
			.send(&packets::PubRec { id }.into())
			.await
			.unwrap();

		// Exactly one PUBREL must follow.
		let Packet::PubRel(pubrel) = recv(&broker).await else {
			panic!("expected PubRel");
		};
		assert_eq!(pubrel.id, id);
		broker
			.send(&packets::PubComp { id }.into())
			.await
			.unwrap();
		id
	};

	let (result, id) = tokio::join!(
		client.publish(topic("a/b"), &b"x"[..], QoS::ExactlyOnce, PublishOptions::new()),
		broker_task
	);
	result.unwrap();

	// PUBCOMP is terminal: the pending entry disappears and no further
	// packets are sent.
	eventually(|| !client.session.pending.contains(id)).await;
	assert!(
		time::timeout(Duration::from_millis(50), broker.recv())
			.await
			.is_err()
	);
}

#[tokio::test]
async fn subscribe_routes_and_rolls_back_failures() {
	let (client, broker) = session_pair();
	let (sink, mut delivered) = mpsc::channel(8);

	let subscriptions = vec![
		Subscription::new(filter("foo"), QoS::AtMostOnce, sink.clone()),
		Subscription::new(filter("foo/+"), QoS::AtLeastOnce, sink.clone()),
		Subscription::new(filter("foo/+/baz"), QoS::ExactlyOnce, sink.clone()),
		Subscription::new(filter("n/+"), QoS::AtMostOnce, sink.clone()),
	];

	let (result, _) = tokio::join!(client.subscribe(subscriptions), async {
		let Packet::Subscribe(subscribe) = recv(&broker).await else {
			panic!("expected Subscribe");
		};
		assert_eq!(subscribe.filters.len(), 4);
		broker
			.send(
				&packets::SubAck {
					id: subscribe.id,
					return_codes: vec![0, 1, 2, 0x80],
				}
				.into(),
			)
			.await
			.unwrap();
	});
	assert_eq!(result.unwrap(), vec![0, 1, 2, 0x80]);

	// "n/+" was refused and rolled back: a matching publish is not
	// delivered, while a later one on "foo" is.
	broker
		.send(
			&packets::Publish::AtMostOnce {
				retain: false,
				topic: topic("n/a").to_topic_buf(),
				payload: Bytes::from_static(b"nope"),
			}
			.into(),
		)
		.await
		.unwrap();
	broker
		.send(
			&packets::Publish::AtMostOnce {
				retain: false,
				topic: topic("foo").to_topic_buf(),
				payload: Bytes::from_static(b"foo"),
			}
			.into(),
		)
		.await
		.unwrap();
	assert_eq!(&delivered.recv().await.unwrap()[..], b"foo");

	// Inbound QoS 1 is delivered and acknowledged.
	let id = PacketId::new(41).unwrap();
	broker
		.send(
			&packets::Publish::AtLeastOnce {
				id,
				retain: false,
				duplicate: false,
				topic: topic("foo/bar").to_topic_buf(),
				payload: Bytes::from_static(b"foobar"),
			}
			.into(),
		)
		.await
		.unwrap();
	assert_eq!(&delivered.recv().await.unwrap()[..], b"foobar");
	assert_eq!(
		recv(&broker).await,
		Packet::PubAck(packets::PubAck { id })
	);

	// Inbound QoS 2 runs the full receive-side handshake.
	let id = PacketId::new(42).unwrap();
	broker
		.send(
			&packets::Publish::ExactlyOnce {
				id,
				retain: false,
				duplicate: false,
				topic: topic("foo/bar/baz").to_topic_buf(),
				payload: Bytes::from_static(b"foobarbaz"),
			}
			.into(),
		)
		.await
		.unwrap();
	assert_eq!(&delivered.recv().await.unwrap()[..], b"foobarbaz");
	assert_eq!(
		recv(&broker).await,
		Packet::PubRec(packets::PubRec { id })
	);
	broker
		.send(&packets::PubRel { id }.into())
		.await
		.unwrap();
	assert_eq!(
		recv(&broker).await,
		Packet::PubComp(packets::PubComp { id })
	);
	eventually(|| !client.session.pending.contains(id)).await;
}

#[tokio::test]
async fn subscribe_with_no_filters_is_a_no_op() {
	let (client, broker) = session_pair();
	assert!(client.subscribe(Vec::new()).await.unwrap().is_empty());
	assert!(
		time::timeout(Duration::from_millis(50), broker.recv())
			.await
			.is_err()
	);
}

#[tokio::test]
async fn unsubscribe_removes_the_filter() {
	let (client, broker) = session_pair();
	let (sink, mut delivered) = mpsc::channel(8);

	let (result, _) = tokio::join!(
		client.subscribe(vec![Subscription::new(
			filter("foo"),
			QoS::AtMostOnce,
			sink
		)]),
		async {
			let Packet::Subscribe(subscribe) = recv(&broker).await else {
				panic!("expected Subscribe");
			};
			broker
				.send(
					&packets::SubAck {
						id: subscribe.id,
						return_codes: vec![0],
					}
					.into(),
				)
				.await
				.unwrap();
		}
	);
	result.unwrap();

	let (result, _) = tokio::join!(client.unsubscribe(vec![filter("foo")]), async {
		let Packet::Unsubscribe(unsubscribe) = recv(&broker).await else {
			panic!("expected Unsubscribe");
		};
		assert_eq!(unsubscribe.filters, vec![filter("foo")]);
		broker
			.send(&packets::UnsubAck { id: unsubscribe.id }.into())
			.await
			.unwrap();
	});
	result.unwrap();

	broker
		.send(
			&packets::Publish::AtMostOnce {
				retain: false,
				topic: topic("foo").to_topic_buf(),
				payload: Bytes::from_static(b"late"),
			}
			.into(),
		)
		.await
		.unwrap();
	time::sleep(Duration::from_millis(20)).await;
	assert!(delivered.try_recv().is_err());
}

#[tokio::test]
async fn unexpected_packet_is_fatal_and_reposted() {
	let (client, broker) = session_pair();

	// A server must never send PINGREQ; the reader treats it as fatal.
	broker.send(&Packet::PingReq).await.unwrap();

	let first = client.ping().await.unwrap_err();
	assert!(matches!(
		first,
		Error::Fatal(ref inner) if matches!(**inner, Error::IllegalResponse)
	));

	// The error is re-posted for the next blocked caller.
	let second = client.ping().await.unwrap_err();
	assert!(matches!(
		second,
		Error::Fatal(ref inner) if matches!(**inner, Error::IllegalResponse)
	));
}

#[tokio::test]
async fn closed_transport_releases_blocked_callers() {
	let (client, broker) = session_pair();

	// The ping goes out while the broker is still alive, then the
	// transport closes underneath the blocked caller.
	let (error, _) = tokio::join!(client.ping(), async {
		assert_eq!(broker.recv().await.unwrap(), Some(Packet::PingReq));
		drop(broker);
	});
	assert!(matches!(
		error.unwrap_err(),
		Error::Fatal(ref inner) if matches!(**inner, Error::ConnectionClosed)
	));
}

#[tokio::test]
async fn disconnect_closes_the_transport() {
	let (client, broker) = session_pair();

	client.disconnect().await.unwrap();
	assert_eq!(recv(&broker).await, Packet::Disconnect);
	assert_eq!(broker.recv().await.unwrap(), None);
}

#[tokio::test]
async fn acquired_ids_are_unique_while_outstanding() {
	let (client, _broker) = session_pair();
	let session = &client.session;

	let mut seen = std::collections::HashSet::new();
	for _ in 0..300 {
		let id = session.acquire_id().unwrap();
		assert!(session.pending.add(id, Packet::PingReq));
		assert!(seen.insert(id), "id {id} handed out twice");
	}
}

#[tokio::test]
async fn id_counter_skips_zero_and_in_use_ids() {
	let (client, _broker) = session_pair();
	let session = &client.session;

	session
		.id_counter
		.store(u16::MAX as u32, std::sync::atomic::Ordering::Relaxed);
	let first = session.acquire_id().unwrap();
	assert_eq!(first.get(), u16::MAX);

	// The counter wraps past zero, which is never a valid id.
	let second = session.acquire_id().unwrap();
	assert_eq!(second.get(), 1);

	// An id parked in the ack-waiter table is skipped over.
	let _waiter = session.waiters.new_waiter(PacketId::new(2).unwrap()).unwrap();
	let third = session.acquire_id().unwrap();
	assert_eq!(third.get(), 3);
}

#[tokio::test]
async fn session_deadline_surfaces_as_io_timeout() {
	let (near, _far) = duplex(4096);
	let client = Client::new(
		near,
		SessionOptions::new()
			.with_client_id("tester")
			.with_timeout(Duration::from_millis(30)),
	);

	// No broker ever answers: the reader's recv deadline fires and the
	// blocked ping observes it through the fatal channel.
	let error = client.ping().await.unwrap_err();
	assert!(matches!(
		error,
		Error::Fatal(ref inner)
			if matches!(**inner, Error::Io(ref e) if e.kind() == std::io::ErrorKind::TimedOut)
	));
}

#[tokio::test]
async fn generates_a_client_id_when_unset() {
	let (near, _far) = duplex(64);
	let client = Client::new(near, SessionOptions::new());
	assert!(!client.client_id.is_empty());
	uuid::Uuid::parse_str(&client.client_id).unwrap();
}
