//! the message transport that the rpc and pub/sub layers are built on
//!
//! it provides
//! 1. bind/connect by uri (`tcp://host:port`, `tcp://*:port`, `ipc://path`)
//! 2. send/recv of discrete byte frames over a stream
//! 3. a per connection routing identity, the first frame a requester sends
//! 4. a shutdown context that force unblocks every pending operation
//!
pub use context::Context;
pub use endpoint::Endpoint;
pub use queued_writer::QueuedWriter;
pub use stream::{Listener, Stream};

mod context;
mod endpoint;
/// raw frame protocol
pub mod frame;
mod queued_writer;
mod stream;
