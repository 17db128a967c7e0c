//! wire codec usage contract
//!
//! call frame    : (bincode((name, [arg bytes...])), crc32)
//! reply frame   : (bincode(Reply), crc32)
//! publish frame : topic ':' bincode((topic, value bytes, crc32))
//!
//! every argument, result and published value is encoded on its own, so the
//! argument count is known without decoding and each value is decoded into
//! the wanted type only where that type is known
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::checksum::checksum;
use crate::Error;

/// the topic separator of a publish frame
pub const TOPIC_SEPARATOR: u8 = b':';

// fixed int little endian like `bincode::serialize`, but a value must use up
// all of its bytes so a wrong target type is not silently accepted
fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// encode one value
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    options()
        .serialize(value)
        .map_err(|e| Error::Encode(e.to_string()))
}

/// decode one value, every byte must be consumed
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> bincode::Result<T> {
    options().deserialize(bytes)
}

/// The error record carried back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// error message
    pub message: String,
}

impl RpcError {
    /// create an error record
    pub fn new(message: impl Into<String>) -> Self {
        RpcError {
            message: message.into(),
        }
    }
}

/// The generic result of a remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// the encoded value returned by the procedure
    Value(Vec<u8>),
    /// the procedure returns nothing, also the `terminate` acknowledgement
    Void,
    /// the call failed on the server
    Error(RpcError),
}

impl Reply {
    /// decode the returned value into the wanted type
    pub fn into_value<T: DeserializeOwned>(self) -> Result<T, Error> {
        match self {
            Reply::Value(v) => decode_value(&v).map_err(|e| {
                Error::TypeMismatch(format!("result expected {}: {e}", std::any::type_name::<T>()))
            }),
            Reply::Void => Err(Error::NoValue),
            Reply::Error(e) => Err(Error::Remote(e.message)),
        }
    }

    /// true for the reply of a procedure that returns nothing
    pub fn is_void(&self) -> bool {
        matches!(self, Reply::Void)
    }

    /// the error record if the call failed
    pub fn error(&self) -> Option<&RpcError> {
        match self {
            Reply::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for Reply {
    fn from(err: Error) -> Self {
        Reply::Error(RpcError::new(err.to_string()))
    }
}

/// A value list that can be passed as the arguments of a remote call
///
/// implemented for tuples of up to 12 serializable values
pub trait Args {
    /// encode every element into its own byte string
    fn into_args(self) -> Result<Vec<Vec<u8>>, Error>;
}

macro_rules! impl_args {
    ($($arg:ident: $ty:ident),*) => {
        impl<$($ty: Serialize),*> Args for ($($ty,)*) {
            fn into_args(self) -> Result<Vec<Vec<u8>>, Error> {
                let ($($arg,)*) = self;
                Ok(vec![$(encode_value(&$arg)?),*])
            }
        }
    };
}

impl_args!();
impl_args!(a0: A0);
impl_args!(a0: A0, a1: A1);
impl_args!(a0: A0, a1: A1, a2: A2);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10);
impl_args!(a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11);

/// wrap the payload with its checksum
pub fn seal(payload: Vec<u8>) -> Result<Vec<u8>, Error> {
    let crc = checksum(&payload);
    encode_value(&(payload, crc))
}

/// unwrap an integrity frame, verifying the checksum
pub fn unseal(frame: &[u8]) -> Result<Vec<u8>, Error> {
    let (payload, expected): (Vec<u8>, u32) = decode_value(frame)?;
    let computed = checksum(&payload);
    if computed != expected {
        return Err(Error::Checksum { expected, computed });
    }
    Ok(payload)
}

/// encode the call envelope into a sealed frame
pub fn encode_call(name: &str, args: &[Vec<u8>]) -> Result<Vec<u8>, Error> {
    seal(encode_value(&(name, args))?)
}

/// decode a sealed call frame into the procedure name and argument list
pub fn decode_call(frame: &[u8]) -> Result<(String, Vec<Vec<u8>>), Error> {
    let envelope = unseal(frame)?;
    decode_value(&envelope).map_err(|e| Error::Decode(format!("call envelope: {e}")))
}

/// encode the reply into a sealed frame
pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>, Error> {
    seal(encode_value(reply)?)
}

/// decode a sealed reply frame
pub fn decode_reply(frame: &[u8]) -> Result<Reply, Error> {
    let body = unseal(frame)?;
    decode_value(&body).map_err(|e| Error::Decode(format!("reply: {e}")))
}

/// encode the published value, prefixed by the topic for transport filtering
pub fn encode_publish<T: Serialize + ?Sized>(topic: &str, value: &T) -> Result<Vec<u8>, Error> {
    if topic.is_empty() || topic.as_bytes().contains(&TOPIC_SEPARATOR) {
        return Err(Error::InvalidTopic(topic.to_owned()));
    }

    let payload = encode_value(value)?;
    let crc = checksum(&payload);
    let data = encode_value(&(topic, payload, crc))?;

    let mut msg = Vec::with_capacity(topic.len() + 1 + data.len());
    msg.extend_from_slice(topic.as_bytes());
    msg.push(TOPIC_SEPARATOR);
    msg.extend_from_slice(&data);
    Ok(msg)
}

/// decode a publish frame into the topic and the value of the wanted type
pub fn decode_publish<T: DeserializeOwned>(msg: &[u8]) -> Result<(String, T), Error> {
    // trim the topic prefix up to the first separator
    let pos = msg
        .iter()
        .position(|b| *b == TOPIC_SEPARATOR)
        .ok_or_else(|| Error::Decode("publish frame without topic separator".to_owned()))?;

    let (topic, payload, expected): (String, Vec<u8>, u32) = decode_value(&msg[pos + 1..])?;
    let computed = checksum(&payload);
    if computed != expected {
        return Err(Error::Checksum { expected, computed });
    }

    let value = decode_value(&payload).map_err(|e| {
        Error::TypeMismatch(format!(
            "topic '{topic}' expected {}: {e}",
            std::any::type_name::<T>()
        ))
    })?;
    Ok((topic, value))
}
