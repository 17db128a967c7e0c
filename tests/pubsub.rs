use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use zrpc::{Publisher, Subscriber};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Message {
    v: i32,
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// run `f` on a helper thread, fail instead of hanging if it doesn't finish
fn within<T: Send + 'static>(limit: Duration, f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        tx.send(f()).ok();
    });
    rx.recv_timeout(limit).expect("did not finish in time")
}

/// tear down both ends without risking a hung test
fn teardown(publisher: Publisher, subscriber: Subscriber) {
    within(Duration::from_secs(10), move || drop(subscriber));
    within(Duration::from_secs(10), move || drop(publisher));
}

fn wait_subscribers(publisher: &Publisher, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while publisher.subscriber_count() < n {
        assert!(Instant::now() < deadline, "subscribers never joined");
        thread::sleep(Duration::from_millis(10));
    }
}

fn uri_of(publisher: &Publisher) -> String {
    format!("tcp://{}", publisher.local_addr().unwrap())
}

#[test]
fn topic_routing() {
    init();
    let publisher = Publisher::new("tcp://127.0.0.1:0");
    let subscriber = Subscriber::new();
    let (tx, rx) = mpsc::channel();
    subscriber
        .subscribe(&uri_of(&publisher), "A", move |topic: &str, m: Message| {
            tx.send((topic.to_owned(), m)).ok();
        })
        .unwrap();
    wait_subscribers(&publisher, 1);

    for i in 0..5 {
        assert_eq!(publisher.try_publish("A", &Message { v: i }).unwrap(), 1);
        assert_eq!(publisher.try_publish("B", &Message { v: i + 100 }).unwrap(), 0);
    }

    for i in 0..5 {
        let (topic, m) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(topic, "A");
        assert_eq!(m, Message { v: i });
    }
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    teardown(publisher, subscriber);
}

#[test]
fn empty_filter_receives_everything() {
    init();
    let publisher = Publisher::new("tcp://127.0.0.1:0");
    let subscriber = Subscriber::new();
    let (tx, rx) = mpsc::channel();
    subscriber
        .subscribe(&uri_of(&publisher), "", move |topic: &str, v: i32| {
            tx.send((topic.to_owned(), v)).ok();
        })
        .unwrap();
    wait_subscribers(&publisher, 1);

    publisher.publish("A", &1);
    publisher.publish("B", &2);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), ("A".to_owned(), 1));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), ("B".to_owned(), 2));

    teardown(publisher, subscriber);
}

#[test]
fn bad_type_is_dropped() {
    init();
    let publisher = Publisher::new("tcp://127.0.0.1:0");
    let subscriber = Subscriber::new();
    let (tx, rx) = mpsc::channel();
    subscriber
        .subscribe(&uri_of(&publisher), "T", move |_: &str, v: i32| {
            tx.send(v).ok();
        })
        .unwrap();
    wait_subscribers(&publisher, 1);

    publisher.publish("T", "not a number");
    publisher.publish("T", &7);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    teardown(publisher, subscriber);
}

#[test]
fn overlapping_subscriptions_run_independently() {
    init();
    let publisher = Publisher::new("tcp://127.0.0.1:0");
    let subscriber = Subscriber::new();
    let (tx, rx) = mpsc::channel();
    for tag in ["first", "second"] {
        let tx = tx.clone();
        subscriber
            .subscribe(&uri_of(&publisher), "A", move |_: &str, v: i32| {
                tx.send((tag, v)).ok();
            })
            .unwrap();
    }
    wait_subscribers(&publisher, 2);

    assert_eq!(publisher.try_publish("A", &9).unwrap(), 2);
    let mut got = vec![
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
    ];
    got.sort();
    assert_eq!(got, vec![("first", 9), ("second", 9)]);

    teardown(publisher, subscriber);
}

#[test]
fn shutdown_stops_delivery() {
    init();
    let publisher = Publisher::new("tcp://127.0.0.1:0");
    let subscriber = Subscriber::new();
    let (tx, rx) = mpsc::channel();
    subscriber
        .subscribe(&uri_of(&publisher), "A", move |_: &str, v: i32| {
            tx.send(v).ok();
        })
        .unwrap();
    wait_subscribers(&publisher, 1);

    subscriber.shutdown();
    assert!(!subscriber.is_running());
    publisher.publish("A", &1);
    // the callback, and the sender it owns, is gone with the subscription
    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(1)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));
    assert!(subscriber
        .subscribe(&uri_of(&publisher), "A", |_: &str, _: i32| {})
        .is_err());

    teardown(publisher, subscriber);
}

#[test]
fn corrupted_publish_is_dropped() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("tcp://{}", listener.local_addr().unwrap());
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let fake = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut len = [0u8; 8];
        stream.read_exact(&mut len).unwrap();
        let mut filter = vec![0u8; u64::from_be_bytes(len) as usize];
        stream.read_exact(&mut filter).unwrap();
        assert_eq!(filter, b"T");

        for (value, flip) in [(6i32, 1u32), (7, 0)] {
            let payload = bincode::serialize(&value).unwrap();
            let crc = zrpc::checksum(&payload) ^ flip;
            let mut msg = b"T:".to_vec();
            msg.extend(bincode::serialize(&("T", payload, crc)).unwrap());
            stream.write_all(&(msg.len() as u64).to_be_bytes()).unwrap();
            stream.write_all(&msg).unwrap();
        }
        // hold the connection until the subscriber is done with it
        done_rx.recv().ok();
    });

    let subscriber = Subscriber::new();
    let (tx, rx) = mpsc::channel();
    subscriber
        .subscribe(&uri, "T", move |_: &str, v: i32| {
            tx.send(v).ok();
        })
        .unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    within(Duration::from_secs(10), move || drop(subscriber));
    done_tx.send(()).unwrap();
    within(Duration::from_secs(5), move || fake.join()).unwrap();
}

#[test]
fn drop_publisher_with_live_subscribers() {
    init();
    let publisher = Publisher::new("tcp://127.0.0.1:0");
    let subscriber = Subscriber::new();
    let (tx, rx) = mpsc::channel();
    for topic in ["A", "B"] {
        let tx = tx.clone();
        subscriber
            .subscribe(&uri_of(&publisher), topic, move |_: &str, v: i32| {
                tx.send(v).ok();
            })
            .unwrap();
    }
    wait_subscribers(&publisher, 2);
    publisher.publish("A", &1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

    // the subscriber outlives the publisher and keeps reconnecting
    within(Duration::from_secs(10), move || drop(publisher));
    assert!(subscriber.is_running());
    within(Duration::from_secs(10), move || drop(subscriber));
}
