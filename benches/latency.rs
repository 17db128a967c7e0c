#![feature(test)]

#[cfg(test)]
extern crate test;
#[cfg(test)]
use test::Bencher;

#[cfg(test)]
#[bench]
fn latency(bencher: &mut Bencher) {
    use std::sync::Arc;

    let server = Arc::new(zrpc::Server::new("tcp://127.0.0.1:0", zrpc::DEFAULT_WORKERS));
    server.bind("ack", || {}).unwrap();
    let uri = format!("tcp://{}", server.local_addr().unwrap());
    let s = server.clone();
    let handle = std::thread::spawn(move || s.start());

    let client = zrpc::Client::new("BENCH-", &uri);
    bencher.iter(|| {
        client.try_call("ack", ()).unwrap();
    });

    client.call("terminate", ());
    handle.join().unwrap().unwrap();
}
