use std::io::{self, BufReader};
use std::time::Duration;

use bytes::BytesMut;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::transport::{frame, Context, Endpoint, Stream};
use crate::Error;

const RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// The receiving side of pub/sub
///
/// each `subscribe` runs in its own coroutine and invokes its callback
/// there, a slow callback only delays its own subscription.
/// dropping the subscriber stops and joins every subscription
#[derive(Debug, Default)]
pub struct Subscriber {
    ctx: Context,
}

impl Subscriber {
    /// create a subscriber without any subscription
    pub fn new() -> Self {
        Subscriber {
            ctx: Context::new(),
        }
    }

    /// receive the messages published on `uri` whose topic starts with
    /// `topic`, an empty topic receives everything
    ///
    /// the value is decoded as `T`, a message that fails the checksum or
    /// can't be decoded as `T` is logged and dropped. the subscription keeps
    /// reconnecting until the subscriber is shut down
    pub fn subscribe<T, F>(&self, uri: &str, topic: &str, callback: F) -> Result<(), Error>
    where
        T: DeserializeOwned + 'static,
        F: FnMut(&str, T) + Send + 'static,
    {
        let endpoint = Endpoint::parse(uri)?;
        let filter = topic.to_owned();
        let name = format!("zrpc subscriber {uri} {topic:?}");
        self.ctx
            .spawn(name, move || subscription_loop(endpoint, filter, callback))?;
        info!("subscribe {topic:?} on {uri}");
        Ok(())
    }

    /// true until `shutdown` is called
    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// stop every subscription, no callback is invoked after it returns
    /// must not be called from inside a callback
    pub fn shutdown(&self) {
        self.ctx.shutdown();
        self.ctx.join();
    }
}

fn subscription_loop<T, F>(endpoint: Endpoint, filter: String, mut callback: F)
where
    T: DeserializeOwned,
    F: FnMut(&str, T),
{
    loop {
        match Stream::connect(&endpoint) {
            Ok(stream) => {
                if let Err(e) = receive(stream, &filter, &mut callback) {
                    warn!("subscription to {endpoint} lost, err={e}");
                }
            }
            Err(e) => debug!("connect {endpoint} failed, err={e}"),
        }
        may::coroutine::sleep(RECONNECT_DELAY);
    }
}

fn receive<T, F>(mut stream: Stream, filter: &str, callback: &mut F) -> io::Result<()>
where
    T: DeserializeOwned,
    F: FnMut(&str, T),
{
    frame::write_frames(&mut stream, &[filter.as_bytes()])?;

    let mut rs = BufReader::new(stream);
    let mut buf = BytesMut::with_capacity(1024 * 32);
    loop {
        let msg = frame::decode_from(&mut rs, &mut buf)?;
        if !msg.starts_with(filter.as_bytes()) {
            continue;
        }
        match codec::decode_publish::<T>(&msg) {
            Ok((topic, value)) => callback(&topic, value),
            Err(e) => warn!("drop message, err={e}"),
        }
    }
}
