use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use zrpc::Client;

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    v: i32,
}

fn f1(client: &Client) {
    client.call("f1", ());
}

fn f2(client: &Client) {
    client.call("f2", (Message { v: 2 },));
}

fn f3(client: &Client) {
    if let Some(reply) = client.call("f3", ()) {
        match reply.into_value::<Message>() {
            Ok(m) => println!("f3 result = {}", m.v),
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn f4(client: &Client) {
    let m = Message { v: 1 };
    println!("f4 pre-result = {}", m.v);
    if let Some(reply) = client.call("f4", (m,)) {
        match reply.into_value::<Message>() {
            Ok(m) => println!("f4 result = {}", m.v),
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn l1(client: &Client) {
    for i in 0..10 {
        if let Some(reply) = client.call("l1", (7, 3 + i)) {
            match reply.into_value::<f64>() {
                Ok(v) => println!("l1 result = {v}"),
                Err(e) => eprintln!("{e}"),
            }
        }
    }
}

fn l2(client: &Client) {
    for i in 0..10 {
        if let Some(reply) = client.call("l2", (11, 9 + i)) {
            match reply.into_value::<i32>() {
                Ok(v) => println!("l2 result = {v}"),
                Err(e) => eprintln!("{e}"),
            }
        }
    }
}

fn main() {
    env_logger::init();
    let client = Arc::new(Client::new("TEST-CLIENT", "tcp://localhost:12345"));

    let calls: Vec<fn(&Client)> = vec![f3, f2, f1, l1, l2, f4];
    let handles: Vec<_> = calls
        .into_iter()
        .map(|f| {
            let client = client.clone();
            thread::spawn(move || f(&client))
        })
        .collect();
    for h in handles {
        h.join().ok();
    }

    // error replies
    let report = |name: &str, reply: Option<zrpc::Reply>| {
        if let Some(reply) = reply {
            match reply.error() {
                Some(e) => println!("{name} error = {}", e.message),
                None => println!("{name} reply = {reply:?}"),
            }
        }
    };
    report("l3", client.call("l3", ()));
    report("l1", client.call("l1", (7,)));
    report("l1", client.call("l1", ("seven", 1)));

    client.call("terminate", ());
}
