use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    v: i32,
}

impl Default for Message {
    fn default() -> Self {
        Message { v: 5 }
    }
}

mod test_ns {
    pub fn f_ns(m: super::Message) {
        println!(" ** Executing f_ns: {}", m.v);
    }
}

fn f1() {
    println!(" ** Executing f1");
}

fn f2(m: Message) {
    println!(" ** Executing f2: {}", m.v);
}

fn f3() -> Message {
    println!(" ** Executing f3");
    may::coroutine::sleep(Duration::from_secs(5));
    Message::default()
}

fn f4(mut m: Message) -> Message {
    m.v = 73;
    println!(" ** Executing f4: {}", m.v);
    m
}

fn main() -> Result<(), zrpc::Error> {
    env_logger::init();
    may::config().set_workers(4);

    let server = zrpc::Server::with_port(12345, 4);
    println!("Starting zRPC server!");

    server.bind("f1", f1)?;
    server.bind("f2", f2)?;
    server.bind("f3", f3)?;
    server.bind("f4", f4)?;
    server.bind("l1", |a: i32, b: u8| -> f64 {
        println!("Inside l1");
        may::coroutine::sleep(Duration::from_secs(1));
        (a + b as i32) as f64
    })?;
    server.bind("l2", |a: i32, b: u16| {
        println!("Inside l2");
        may::coroutine::sleep(Duration::from_secs(2));
        a + b as i32
    })?;
    server.bind("fNS", test_ns::f_ns)?;

    // a client calling "terminate" stops the server
    server.start()?;

    println!("Exiting server!");
    Ok(())
}
