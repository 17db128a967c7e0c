use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::BytesMut;

use crate::codec::{self, Args, Reply};
use crate::transport::{frame, Endpoint, Stream};
use crate::Error;

/// The RPC client
///
/// every call opens its own short lived connection with a unique routing
/// identity, `identity base + call counter`, so one client can be shared by
/// many threads or coroutines without their replies getting mixed up.
/// there is no ordering guarantee between two calls.
#[derive(Debug)]
pub struct Client {
    id_base: String,
    next: AtomicU64,
    uri: String,
    timeout: Option<Duration>,
}

impl Client {
    /// create a client, it doesn't connect until the first call
    pub fn new(identity: &str, uri: &str) -> Self {
        Client {
            id_base: identity.to_owned(),
            next: AtomicU64::new(0),
            uri: uri.to_owned(),
            timeout: None,
        }
    }

    /// set the default time to wait for a reply, by default it waits forever
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// call the procedure, any failure is returned as an error
    ///
    /// a failure on the server side is not an error here, it comes back
    /// as a `Reply::Error`
    pub fn try_call<A: Args>(&self, name: &str, args: A) -> Result<Reply, Error> {
        self.request(name, args.into_args()?, self.timeout)
    }

    /// call the procedure and wait at most `timeout` for the reply
    pub fn try_call_timeout<A: Args>(
        &self,
        name: &str,
        args: A,
        timeout: Duration,
    ) -> Result<Reply, Error> {
        self.request(name, args.into_args()?, Some(timeout))
    }

    /// call the procedure, a local failure is logged and gives `None`
    pub fn call<A: Args>(&self, name: &str, args: A) -> Option<Reply> {
        self.try_call(name, args)
            .map_err(|e| error!("call {name} failed, err={e}"))
            .ok()
    }

    /// call the procedure with a reply timeout, an expired wait gives `None`
    pub fn call_timeout<A: Args>(&self, name: &str, args: A, timeout: Duration) -> Option<Reply> {
        self.try_call_timeout(name, args, timeout)
            .map_err(|e| error!("call {name} failed, err={e}"))
            .ok()
    }

    fn next_identity(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.id_base)
    }

    fn request(
        &self,
        name: &str,
        args: Vec<Vec<u8>>,
        timeout: Option<Duration>,
    ) -> Result<Reply, Error> {
        let endpoint = Endpoint::parse(&self.uri)?;
        let request = codec::encode_call(name, &args)?;
        let identity = self.next_identity();

        let mut stream = Stream::connect(&endpoint)?;
        stream.set_read_timeout(timeout)?;
        debug!("call {name} as {identity}");
        frame::write_frames(&mut stream, &[identity.as_bytes(), &request])?;

        let mut buf = BytesMut::with_capacity(1024);
        let rsp = frame::decode_from(&mut stream, &mut buf).map_err(Error::from_recv)?;
        codec::decode_reply(&rsp)
    }
}
