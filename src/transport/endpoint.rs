use std::fmt;
use std::io::{self, ErrorKind};
#[cfg(unix)]
use std::path::PathBuf;

/// a parsed transport address
///
/// * `tcp://host:port` connect to or bind a tcp address
/// * `tcp://*:port` bind on all interfaces
/// * `ipc://path` unix domain socket (unix only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// tcp `host:port`
    Tcp(String),
    /// unix domain socket path
    #[cfg(unix)]
    Ipc(PathBuf),
}

impl Endpoint {
    /// parse an uri like `tcp://localhost:12345`
    pub fn parse(uri: &str) -> io::Result<Self> {
        let invalid = |reason: &str| {
            io::Error::new(ErrorKind::InvalidInput, format!("invalid uri '{uri}': {reason}"))
        };

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        match scheme {
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| invalid("missing port"))?;
                port.parse::<u16>().map_err(|_| invalid("bad port"))?;
                let host = match host {
                    "*" | "" => "0.0.0.0",
                    h => h,
                };
                Ok(Endpoint::Tcp(format!("{host}:{port}")))
            }
            #[cfg(unix)]
            "ipc" if !rest.is_empty() => Ok(Endpoint::Ipc(PathBuf::from(rest))),
            _ => Err(invalid("unsupported scheme")),
        }
    }

    /// all interfaces on the given tcp port
    pub fn any(port: u16) -> Self {
        Endpoint::Tcp(format!("0.0.0.0:{port}"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}
