//! Control-plane client for the kernel `clt` tracing feature
//!
//! The kernel exposes trace enable/disable as a generic-netlink family named
//! `clt`. The client resolves the family once at open, then issues
//! request/acknowledge commands over the same connection. The connection is
//! one sequential channel: callers on multiple threads must serialize
//! access themselves.

pub mod netlink;

use std::fmt;
use std::io;

use netlink::{
    AttrEncoder, GenlSocket, CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_ATTR_VERSION,
    CTRL_CMD_GETFAMILY, GENL_ID_CTRL, NLM_F_ACK,
};

/// Well-known generic-netlink family name of the kernel tracing feature.
pub const CLT_FAMILY_NAME: &str = "clt";

const CLT_CMD_ENABLE: u8 = 1;
const CLT_CMD_DISABLE: u8 = 2;

const CLT_ATTR_SPAN_ID: u16 = 1;
const CLT_ATTR_TRACE_ID: u16 = 2;

/// Errors from the control client. Construction failures are fatal for the
/// caller; command failures are returned and not retried.
#[derive(Debug)]
pub enum CltError {
    /// Dialing the generic-netlink transport failed.
    TransportUnavailable(io::Error),
    /// The kernel does not expose the `clt` family (feature unsupported or
    /// not loaded).
    FamilyUnavailable(io::Error),
    EnableFailed(io::Error),
    DisableFailed(io::Error),
}

impl fmt::Display for CltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CltError::TransportUnavailable(e) => {
                write!(f, "failed to dial genetlink: {}", e)
            }
            CltError::FamilyUnavailable(e) => {
                write!(f, "failed to get genetlink family {:?}: {}", CLT_FAMILY_NAME, e)
            }
            CltError::EnableFailed(e) => write!(f, "failed to enable trace: {}", e),
            CltError::DisableFailed(e) => write!(f, "failed to disable trace: {}", e),
        }
    }
}

impl std::error::Error for CltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CltError::TransportUnavailable(e)
            | CltError::FamilyUnavailable(e)
            | CltError::EnableFailed(e)
            | CltError::DisableFailed(e) => Some(e),
        }
    }
}

/// Client for the `clt` generic-netlink family.
pub struct CltClient {
    sock: GenlSocket,
    family_id: u16,
    family_version: u8,
}

impl CltClient {
    /// Dials generic netlink and resolves the `clt` family. On resolution
    /// failure the socket is closed before the error is returned.
    pub fn open() -> Result<Self, CltError> {
        let mut sock = GenlSocket::connect().map_err(CltError::TransportUnavailable)?;

        match resolve_family(&mut sock, CLT_FAMILY_NAME) {
            Ok((family_id, family_version)) => Ok(CltClient {
                sock,
                family_id,
                family_version,
            }),
            Err(e) => {
                sock.close();
                Err(CltError::FamilyUnavailable(e))
            }
        }
    }

    /// Enables kernel tracing with the given span and trace identifiers.
    pub fn enable_trace(&mut self, span_id: u64, trace_id: u64) -> Result<(), CltError> {
        let mut attrs = AttrEncoder::new();
        attrs.u64(CLT_ATTR_SPAN_ID, span_id);
        attrs.u64(CLT_ATTR_TRACE_ID, trace_id);

        self.sock
            .execute(
                self.family_id,
                CLT_CMD_ENABLE,
                self.family_version,
                NLM_F_ACK,
                &attrs.encode(),
            )
            .map_err(CltError::EnableFailed)?;
        Ok(())
    }

    /// Disables kernel tracing. Carries no attributes and does not depend on
    /// a prior enable; calling it repeatedly is fine.
    pub fn disable_trace(&mut self) -> Result<(), CltError> {
        self.sock
            .execute(
                self.family_id,
                CLT_CMD_DISABLE,
                self.family_version,
                NLM_F_ACK,
                &[],
            )
            .map_err(CltError::DisableFailed)?;
        Ok(())
    }

    /// Releases the transport.
    pub fn close(self) {
        self.sock.close();
    }
}

/// Asks the genetlink controller for a family's id and version.
fn resolve_family(sock: &mut GenlSocket, name: &str) -> io::Result<(u16, u8)> {
    let mut attrs = AttrEncoder::new();
    attrs.string(CTRL_ATTR_FAMILY_NAME, name);

    let replies = sock.execute(GENL_ID_CTRL, CTRL_CMD_GETFAMILY, 1, 0, &attrs.encode())?;

    for payload in &replies {
        let reply = netlink::Reply {
            typ: GENL_ID_CTRL,
            seq: 0,
            payload,
        };
        let mut id = None;
        let mut version = 1u8;
        for attr in reply.genl_attrs() {
            match attr.typ {
                CTRL_ATTR_FAMILY_ID => id = attr.as_u16(),
                CTRL_ATTR_VERSION => {
                    if let Some(v) = attr.as_u32() {
                        version = v as u8;
                    }
                }
                _ => {}
            }
        }
        if let Some(id) = id {
            return Ok((id, version));
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no family id in reply for {:?}", name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_operation() {
        let e = CltError::FamilyUnavailable(io::Error::from_raw_os_error(libc::ENOENT));
        assert!(e.to_string().contains("clt"));

        let e = CltError::EnableFailed(io::Error::from_raw_os_error(libc::EPERM));
        assert!(e.to_string().starts_with("failed to enable trace"));

        let e = CltError::DisableFailed(io::Error::from_raw_os_error(libc::EPERM));
        assert!(e.to_string().starts_with("failed to disable trace"));
    }

    #[test]
    fn errors_expose_their_cause() {
        use std::error::Error;
        let e = CltError::TransportUnavailable(io::Error::from_raw_os_error(libc::EACCES));
        assert!(e.source().is_some());
    }
}
