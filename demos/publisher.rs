use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Serialize)]
struct Message {
    v: i32,
}

fn main() {
    env_logger::init();

    let publisher = zrpc::Publisher::with_port(54321);
    println!("Starting zRPC publisher!");

    for i in 0..30 {
        publisher.publish("A", &Message { v: i });
        publisher.publish("B", &Message { v: i + 100 });
        std::thread::sleep(Duration::from_secs(1));
    }

    println!("Exiting publisher!");
}
