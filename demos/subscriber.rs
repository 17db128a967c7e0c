use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Message {
    v: i32,
}

fn show_data(topic: &str, data: Message) {
    println!(" ** Topic '{topic}': {}", data.v);
}

fn main() -> Result<(), zrpc::Error> {
    env_logger::init();

    let subscriber = zrpc::Subscriber::new();
    println!("Starting zRPC subscriber!");

    subscriber.subscribe("tcp://localhost:54321", "", show_data)?;
    subscriber.subscribe("tcp://localhost:54321", "B", |topic: &str, data: Message| {
        show_data(&format!("--{topic}--"), data)
    })?;

    std::thread::sleep(Duration::from_secs(20));
    println!("Exiting subscriber!");
    Ok(())
}
