use std::collections::HashMap;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use co_managed::Manager;
use may::sync::{mpmc, Mutex};

use crate::codec::{self, Reply, RpcError};
use crate::procedure::{BoundProcedure, Callable};
use crate::registry::Registry;
use crate::transport::{frame, Context, Endpoint, Listener, QueuedWriter, Stream};
use crate::Error;

/// default number of worker coroutines
pub const DEFAULT_WORKERS: usize = 16;
/// the reserved procedure that stops the server
pub const TERMINATE: &str = "terminate";

const DEFAULT_GRACE: Duration = Duration::from_millis(10);

macro_rules! t {
    ($e: expr) => {
        match $e {
            Ok(val) => val,
            Err(err) => {
                error!("call = {:?}\nerr = {:?}", stringify!($e), err);
                continue;
            }
        }
    };
}

/// the life cycle of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// socket bound and workers waiting, procedures can still be bound
    Created,
    /// serving requests
    Running,
    /// stop requested, tearing down
    Stopping,
    /// every worker has exited
    Stopped,
}

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;
const STOPPED: u8 = 3;

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            CREATED => State::Created,
            RUNNING => State::Running,
            STOPPING => State::Stopping,
            _ => State::Stopped,
        }
    }
}

/// one request pulled from a connection, tagged with the routing identity
/// of the connection it came from
struct Envelope {
    identity: Bytes,
    body: Bytes,
}

type Route = Arc<QueuedWriter<Stream>>;

/// the state shared by the front-end, the connections and the workers
struct Shared {
    registry: OnceLock<Registry>,
    routes: Mutex<HashMap<Bytes, Route>>,
    ctx: Context,
    state: AtomicU8,
    grace_ms: AtomicU64,
    next_identity: AtomicU64,
}

impl Shared {
    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    fn stop(&self) {
        if self.state.fetch_max(STOPPING, Ordering::AcqRel) >= STOPPING {
            return;
        }
        info!("server stopping");
        // let the in flight replies go out first
        may::coroutine::sleep(Duration::from_millis(self.grace_ms.load(Ordering::Relaxed)));
        self.ctx.shutdown();
    }

    fn generate_identity(&self) -> Bytes {
        let n = self.next_identity.fetch_add(1, Ordering::Relaxed);
        let mut id = Vec::with_capacity(9);
        id.push(0);
        id.extend_from_slice(&n.to_be_bytes());
        Bytes::from(id)
    }

    /// register the connection under its routing identity
    fn attach(&self, identity: Bytes, writer: Route) -> Bytes {
        let mut routes = self.routes.lock().unwrap();
        let identity = if identity.is_empty() {
            self.generate_identity()
        } else if routes.contains_key(&identity) {
            warn!(
                "identity {:?} is already connected, assign a generated one",
                String::from_utf8_lossy(&identity)
            );
            self.generate_identity()
        } else {
            identity
        };
        routes.insert(identity.clone(), writer);
        identity
    }

    fn detach(&self, identity: &Bytes) {
        self.routes.lock().unwrap().remove(identity);
    }

    /// send the reply back to the connection that owns the identity
    fn route(&self, identity: &Bytes, reply: &Reply) {
        let data = match codec::encode_reply(reply).and_then(|r| Ok(frame::encode(&r)?)) {
            Ok(data) => data,
            Err(e) => {
                error!("failed to encode reply, err={e}");
                return;
            }
        };

        let writer = self.routes.lock().unwrap().get(identity).cloned();
        match writer {
            Some(w) => {
                if let Err(e) = w.write(data) {
                    warn!(
                        "failed to reply to {:?}, err={e}",
                        String::from_utf8_lossy(identity)
                    );
                }
            }
            // the requester timed out or went away
            None => debug!(
                "drop reply for disconnected peer {:?}",
                String::from_utf8_lossy(identity)
            ),
        }
    }

    /// decode and verify the request, invoke the procedure
    /// returns the reply and whether a terminate was requested
    fn dispatch(&self, body: &[u8]) -> (Reply, bool) {
        let (name, args) = match codec::decode_call(body) {
            Ok(call) => call,
            Err(e) => {
                warn!("bad request, err={e}");
                return (e.into(), false);
            }
        };

        if name == TERMINATE {
            info!("terminate requested");
            return (Reply::Void, true);
        }

        let procedure = match self.registry.get().and_then(|r| r.lookup(&name)) {
            Some(p) => p,
            None => {
                warn!("'{name}' RPC not found");
                return (Error::NotFound(name).into(), false);
            }
        };

        debug!("invoke {name} with {} args", args.len());
        let reply = match panic::catch_unwind(AssertUnwindSafe(|| procedure.invoke(args))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("invoke {name} failed, err={e}");
                e.into()
            }
            Err(_) => {
                // panic happend inside!
                error!("{name} panicked");
                Reply::Error(RpcError::new("rpc panicked in server!"))
            }
        };
        (reply, false)
    }

    /// read the identity frame and then forward every request frame into
    /// the relay until the peer disconnects
    fn serve_connection(&self, stream: Stream, relay: &mpmc::Sender<Envelope>) -> io::Result<()> {
        struct RouteGuard<'a>(&'a Shared, Bytes);
        impl Drop for RouteGuard<'_> {
            fn drop(&mut self) {
                self.0.detach(&self.1);
            }
        }

        // the read half of the stream
        let mut rs = BufReader::new(stream.try_clone()?);
        // the write half, shared by all the workers replying on it
        let ws = Arc::new(QueuedWriter::new(stream));
        let mut buf = BytesMut::with_capacity(1024 * 32);

        let identity = frame::decode_from(&mut rs, &mut buf)?;
        let identity = self.attach(identity, ws);
        let guard = RouteGuard(self, identity);
        debug!("peer {:?} connected", String::from_utf8_lossy(&guard.1));

        loop {
            let body = match frame::decode_from(&mut rs, &mut buf) {
                Ok(b) => b,
                Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("peer {:?} closed", String::from_utf8_lossy(&guard.1));
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let envelope = Envelope {
                identity: guard.1.clone(),
                body,
            };
            if relay.send(envelope).is_err() {
                // no worker left
                return Ok(());
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>, relay: mpmc::Receiver<Envelope>) {
    while let Ok(Envelope { identity, body }) = relay.recv() {
        let (reply, terminate) = shared.dispatch(&body);
        shared.route(&identity, &reply);
        if terminate {
            shared.stop();
        }
    }
}

/// The RPC server
///
/// one listening socket fanned out to a fixed pool of worker coroutines.
/// procedures are bound before `start`, which then blocks the calling
/// thread until the server is stopped, either by `stop` or by a client
/// calling the reserved `terminate` procedure.
pub struct Server {
    shared: Arc<Shared>,
    pending: Mutex<Option<Registry>>,
    front: Mutex<Option<(Listener, mpmc::Sender<Envelope>)>>,
    local_addr: Option<SocketAddr>,
    uri: String,
}

impl Server {
    /// bind the listening socket and spawn the workers
    ///
    /// a bind failure is logged, the server is still created but `start`
    /// would return `Error::NotBound`
    pub fn new(uri: &str, workers: usize) -> Self {
        let shared = Arc::new(Shared {
            registry: OnceLock::new(),
            routes: Mutex::new(HashMap::new()),
            ctx: Context::new(),
            state: AtomicU8::new(CREATED),
            grace_ms: AtomicU64::new(DEFAULT_GRACE.as_millis() as u64),
            next_identity: AtomicU64::new(0),
        });

        let listener = match Endpoint::parse(uri).and_then(|ep| Listener::bind(&ep)) {
            Ok(l) => Some(l),
            Err(e) => {
                error!("failed to bind {uri}, err={e}");
                None
            }
        };
        let local_addr = listener.as_ref().and_then(|l| l.local_addr());

        let front = listener.map(|listener| {
            let (tx, rx) = mpmc::channel();
            let workers = workers.max(1);
            for i in 0..workers {
                let shared_w = shared.clone();
                let rx = rx.clone();
                if let Err(e) = shared
                    .ctx
                    .spawn(format!("zrpc worker {i}"), move || worker_loop(shared_w, rx))
                {
                    error!("failed to spawn worker {i}, err={e}");
                }
            }
            info!("server bound to {uri} with {workers} workers");
            (listener, tx)
        });

        Server {
            shared,
            pending: Mutex::new(Some(Registry::new())),
            front: Mutex::new(front),
            local_addr,
            uri: uri.to_owned(),
        }
    }

    /// listen on all interfaces at the given tcp port
    pub fn with_port(port: u16, workers: usize) -> Self {
        Server::new(&Endpoint::any(port).to_string(), workers)
    }

    /// bind a function or closure under the name
    ///
    /// must be called before `start`
    pub fn bind<F, A>(&self, name: &str, func: F) -> Result<(), Error>
    where
        F: Callable<A>,
    {
        if name.is_empty() || name == TERMINATE {
            return Err(Error::InvalidName(name.to_owned()));
        }

        let mut pending = self.pending.lock().unwrap();
        let registry = match pending.as_mut() {
            Some(r) if self.state() == State::Created => r,
            _ => return Err(Error::AlreadyStarted),
        };
        registry.register(BoundProcedure::new(name, func))?;
        debug!("bind {name}");
        Ok(())
    }

    /// the delay between a stop request and the transport teardown
    pub fn set_shutdown_grace(&self, grace: Duration) {
        self.shared
            .grace_ms
            .store(grace.as_millis() as u64, Ordering::Relaxed);
    }

    /// serve requests, blocks until the server is stopped
    pub fn start(&self) -> Result<(), Error> {
        let (listener, relay) = {
            let mut front = self.front.lock().unwrap();
            if self.state() != State::Created {
                return Err(Error::AlreadyStarted);
            }
            if front.is_none() {
                return Err(Error::NotBound);
            }
            if self
                .shared
                .state
                .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(Error::AlreadyStarted);
            }
            match front.take() {
                Some(f) => f,
                None => return Err(Error::NotBound),
            }
        };

        // the registry is read only from now on
        let registry = self.pending.lock().unwrap().take().unwrap_or_default();
        info!("server start on {}, procedures={:?}", self.uri, registry.names());
        self.shared.registry.set(registry).ok();

        let shared = self.shared.clone();
        let spawned = self.shared.ctx.spawn("zrpc front-end".to_owned(), move || {
            let manager = Manager::new();
            loop {
                let stream = t!(listener.accept());
                let shared = shared.clone();
                let relay = relay.clone();
                manager.add(move || {
                    if let Err(e) = shared.serve_connection(stream, &relay) {
                        error!("connection err = {e:?}");
                    }
                });
            }
        });
        if let Err(e) = spawned {
            self.stop();
            self.shared.ctx.join();
            self.shared.state.store(STOPPED, Ordering::Release);
            return Err(e.into());
        }

        self.shared.ctx.wait();
        self.shared.ctx.join();
        self.shared.routes.lock().unwrap().clear();
        self.shared.state.store(STOPPED, Ordering::Release);
        info!("server stopped");
        Ok(())
    }

    /// request the server to stop, can be called many times from any thread
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// the current life cycle state
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// the bound tcp address, useful when listening on port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// the names of the bound procedures
    pub fn procedures(&self) -> Vec<String> {
        match self.pending.lock().unwrap().as_ref() {
            Some(r) => r.names(),
            None => self
                .shared
                .registry
                .get()
                .map(Registry::names)
                .unwrap_or_default(),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shared.stop();
        self.shared.ctx.join();
        self.shared.state.store(STOPPED, Ordering::Release);
    }
}
