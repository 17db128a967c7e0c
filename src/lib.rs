//! zrpc is a lightweight RPC and publish/subscribe framework based on coroutines.
//! Any function or closure whose parameters and result are serde types can be
//! exposed as a remote procedure, there is no schema and no code generation:
//! the arity and the parameter types are taken from the function signature at
//! bind time.
//!
//! ## Request/reply
//! A [`Server`] owns one listening socket fanned out to a pool of worker
//! coroutines. Every request carries the procedure name and a generic
//! argument list, protected by a CRC-32 checksum. The reply is a [`Reply`]:
//! a value, a void acknowledgement or an error record.
//!
//! A [`Client`] opens a fresh connection with a unique routing identity for
//! every call, so a single client can be used from many threads at once.
//!
//! ## Publish/subscribe
//! A [`Publisher`] broadcasts typed values on named topics, a [`Subscriber`]
//! runs one coroutine per subscription and invokes a callback for every value
//! whose topic matches the subscription prefix.
//!
//! Example usage:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zrpc::{Client, Server};
//!
//! let server = Arc::new(Server::new("tcp://*:12345", zrpc::DEFAULT_WORKERS));
//! server.bind("sum", |a: i32, b: i32| a + b).unwrap();
//! server.bind("hello", |name: String| format!("Hello, {name}!")).unwrap();
//! let s = server.clone();
//! std::thread::spawn(move || s.start());
//!
//! let client = Client::new("CLIENT-", "tcp://localhost:12345");
//! let reply = client.call("sum", (2, 3)).unwrap();
//! assert_eq!(reply.into_value::<i32>().unwrap(), 5);
//!
//! // stop the server
//! client.call("terminate", ());
//! ```
//!

#![deny(missing_docs)]

#[macro_use]
extern crate log;

#[doc(hidden)]
pub extern crate may;
pub extern crate serde;

mod checksum;
mod client;
mod codec;
mod errors;
mod procedure;
mod publisher;
mod registry;
mod server;
mod subscriber;
mod transport;

pub use checksum::{checksum, verify};
pub use client::Client;
pub use codec::{Args, Reply, RpcError};
pub use errors::Error;
pub use procedure::{BoundProcedure, Callable, ReturnKind};
pub use publisher::Publisher;
pub use registry::Registry;
pub use server::{Server, State, DEFAULT_WORKERS, TERMINATE};
pub use subscriber::Subscriber;
pub use transport::Endpoint;
