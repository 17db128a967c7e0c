use std::io::{self, BufReader, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use may::sync::{mpsc, Mutex};
use serde::Serialize;

use crate::codec;
use crate::transport::{frame, Context, Endpoint, Listener, Stream};
use crate::Error;

/// one connected subscriber
struct Peer {
    filter: Bytes,
    queue: mpsc::Sender<Bytes>,
}

type Peers = Arc<Mutex<Vec<Peer>>>;

/// read the topic filter, then write every queued message to the subscriber
fn serve_subscriber(peers: &Peers, stream: Stream) -> io::Result<()> {
    let mut rs = BufReader::new(stream.try_clone()?);
    let mut ws = stream;
    let mut buf = BytesMut::with_capacity(256);
    let filter = frame::decode_from(&mut rs, &mut buf)?;
    info!("subscriber joined, filter={:?}", String::from_utf8_lossy(&filter));

    let (tx, rx) = mpsc::channel();
    peers.lock().unwrap().push(Peer { filter, queue: tx });

    while let Ok(data) = rx.recv() {
        ws.write_all(&data)?;
    }
    Ok(())
}

/// The publishing side of pub/sub
///
/// messages are fire and forget, each subscriber connection has its own
/// outbound queue so a slow subscriber never blocks `publish`
pub struct Publisher {
    peers: Peers,
    ctx: Arc<Context>,
    local_addr: Option<SocketAddr>,
    bound: bool,
}

impl Publisher {
    /// bind the broadcast socket
    ///
    /// a bind failure is logged, the publisher is still created but every
    /// publish is a no-op
    pub fn new(uri: &str) -> Self {
        let peers: Peers = Arc::new(Mutex::new(Vec::new()));
        let ctx = Arc::new(Context::new());

        let listener = match Endpoint::parse(uri).and_then(|ep| Listener::bind(&ep)) {
            Ok(l) => Some(l),
            Err(e) => {
                error!("failed to bind publisher {uri}, err={e}");
                None
            }
        };
        let local_addr = listener.as_ref().and_then(|l| l.local_addr());

        let bound = match listener {
            Some(listener) => {
                let peers = peers.clone();
                let owner = ctx.clone();
                let ret = ctx.spawn("zrpc publisher".to_owned(), move || {
                    for id in 0u64.. {
                        let stream = match listener.accept() {
                            Ok(s) => s,
                            Err(e) => {
                                error!("publisher accept err = {e:?}");
                                continue;
                            }
                        };
                        let peers = peers.clone();
                        // writers are owned by the context, not by this coroutine
                        let ret = owner.spawn(format!("zrpc subscriber {id}"), move || {
                            if let Err(e) = serve_subscriber(&peers, stream) {
                                info!("subscriber left, err={e}");
                            }
                        });
                        if let Err(e) = ret {
                            warn!("subscriber {id} not served, err={e}");
                        }
                    }
                });
                match ret {
                    Ok(()) => {
                        info!("publisher bound to {uri}");
                        true
                    }
                    Err(e) => {
                        error!("failed to spawn publisher, err={e}");
                        false
                    }
                }
            }
            None => false,
        };

        Publisher {
            peers,
            ctx,
            local_addr,
            bound,
        }
    }

    /// publish on all interfaces at the given tcp port
    pub fn with_port(port: u16) -> Self {
        Publisher::new(&Endpoint::any(port).to_string())
    }

    /// publish the value on the topic
    ///
    /// returns the number of subscriber connections the message was
    /// queued for, those whose filter is a prefix of the topic frame
    pub fn try_publish<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<usize, Error> {
        if !self.bound {
            return Err(Error::NotBound);
        }

        let msg = codec::encode_publish(topic, value)?;
        let data = Bytes::from(frame::encode(&msg)?);

        let mut peers = self.peers.lock().unwrap();
        let mut sent = 0;
        // a failed send means the connection is gone, drop the peer
        peers.retain(|peer| {
            if !msg.starts_with(&peer.filter) {
                return true;
            }
            match peer.queue.send(data.clone()) {
                Ok(()) => {
                    sent += 1;
                    true
                }
                Err(_) => false,
            }
        });
        debug!("publish {topic} to {sent} subscribers");
        Ok(sent)
    }

    /// publish the value on the topic, errors are logged and swallowed
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &str, value: &T) {
        if let Err(e) = self.try_publish(topic, value) {
            error!("publish {topic} failed, err={e}");
        }
    }

    /// number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// the bound tcp address, useful when listening on port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        // closing the queues ends every writer still waiting for a message
        self.peers.lock().unwrap().clear();
        self.ctx.shutdown();
        self.ctx.join();
    }
}
