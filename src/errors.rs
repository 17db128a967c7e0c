use std::io;

use thiserror::Error;

/// All errors that can occur during the use of zrpc.
#[derive(Debug, Error)]
pub enum Error {
    /// Any transport error, connect/bind/send/recv failure
    #[error("IO err: {0}")]
    Io(#[from] io::Error),
    /// Error in serializing a value or a frame.
    #[error("serializing err: {0}")]
    Encode(String),
    /// Error in deserializing a frame.
    ///
    /// Typically this indicates a malformed or truncated message.
    #[error("deserializing err: {0}")]
    Decode(String),
    /// The procedure was called with the wrong number of arguments.
    #[error("Function {name} called with {actual} arguments; expected {expected}")]
    ArityMismatch {
        /// procedure name
        name: String,
        /// number of arguments received
        actual: usize,
        /// number of arguments the procedure takes
        expected: usize,
    },
    /// An argument or a result could not be decoded into the wanted type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// No procedure is bound under the name.
    #[error("'{0}' RPC not found!")]
    NotFound(String),
    /// The integrity checksum of a frame did not match its payload.
    #[error("Bad checksum: CRC={expected:x} != {computed:x}=Checked")]
    Checksum {
        /// checksum carried in the frame
        expected: u32,
        /// checksum computed over the received payload
        computed: u32,
    },
    /// A procedure with the same name is already bound.
    #[error("'{0}' has already been registered as an RPC.")]
    DuplicateRegistration(String),
    /// The procedure name can't be bound.
    #[error("invalid RPC name '{0}'")]
    InvalidName(String),
    /// The topic can't be published, it contains the ':' separator or is empty.
    #[error("invalid topic '{0}'")]
    InvalidTopic(String),
    /// The server was already started or stopped.
    #[error("the server is already started")]
    AlreadyStarted,
    /// The listening socket was never bound.
    #[error("the socket is not bound")]
    NotBound,
    /// The server was unable to reply to the rpc client within some time.
    ///
    /// You can set the default timeout value in the client instance
    #[error("The server was unable to reply to the rpc client within some time")]
    Timeout,
    /// The server replied with an error record.
    #[error("remote error: {0}")]
    Remote(String),
    /// The reply carries no value, the procedure returns nothing.
    #[error("the reply carries no value")]
    NoValue,
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl Error {
    /// map a receive error, an expired read timeout becomes `Timeout`
    pub(crate) fn from_recv(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Io(err),
        }
    }
}
