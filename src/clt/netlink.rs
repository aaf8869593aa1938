//! Minimal generic-netlink plumbing
//!
//! Just enough to resolve a family by name and run request/acknowledge
//! command exchanges: a blocking `NETLINK_GENERIC` socket, message and
//! attribute encoding, and an attribute iterator for replies. Direct libc
//! socket calls, no netlink library.

use std::io;

// nlmsghdr is 16 bytes, genlmsghdr 4.
pub const NLMSG_HDRLEN: usize = 16;
pub const GENL_HDRLEN: usize = 4;

pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;

pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_ACK: u16 = 0x04;

// Controller family, used to resolve other families by name.
pub const GENL_ID_CTRL: u16 = 0x10;
pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
pub const CTRL_ATTR_VERSION: u16 = 4;

/// Rounds a length up to the 4-byte netlink alignment.
fn nla_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Typed attribute encoder. Attributes are `len(u16) | type(u16) | payload`,
/// padded to 4 bytes.
#[derive(Default)]
pub struct AttrEncoder {
    buf: Vec<u8>,
}

impl AttrEncoder {
    pub fn new() -> Self {
        AttrEncoder::default()
    }

    pub fn bytes(&mut self, typ: u16, payload: &[u8]) {
        let len = 4 + payload.len();
        self.buf.extend_from_slice(&(len as u16).to_ne_bytes());
        self.buf.extend_from_slice(&typ.to_ne_bytes());
        self.buf.extend_from_slice(payload);
        self.buf.resize(nla_align(self.buf.len()), 0);
    }

    pub fn u64(&mut self, typ: u16, value: u64) {
        self.bytes(typ, &value.to_ne_bytes());
    }

    pub fn string(&mut self, typ: u16, value: &str) {
        let mut payload = value.as_bytes().to_vec();
        payload.push(0);
        self.bytes(typ, &payload);
    }

    pub fn encode(self) -> Vec<u8> {
        self.buf
    }
}

/// One attribute from a reply.
pub struct Attr<'a> {
    pub typ: u16,
    pub payload: &'a [u8],
}

impl Attr<'_> {
    pub fn as_u16(&self) -> Option<u16> {
        self.payload
            .get(..2)
            .map(|b| u16::from_ne_bytes([b[0], b[1]]))
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.payload
            .get(..4)
            .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Iterates the attributes in a reply payload, skipping anything malformed.
pub struct AttrIter<'a> {
    buf: &'a [u8],
}

impl<'a> AttrIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        AttrIter { buf }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Attr<'a>;

    fn next(&mut self) -> Option<Attr<'a>> {
        if self.buf.len() < 4 {
            return None;
        }
        let len = u16::from_ne_bytes([self.buf[0], self.buf[1]]) as usize;
        let typ = u16::from_ne_bytes([self.buf[2], self.buf[3]]);
        if len < 4 || len > self.buf.len() {
            return None;
        }
        let payload = &self.buf[4..len];
        self.buf = &self.buf[nla_align(len).min(self.buf.len())..];
        Some(Attr { typ, payload })
    }
}

/// Builds one complete netlink message: nlmsghdr + genlmsghdr + attributes.
pub fn build_message(
    family_id: u16,
    flags: u16,
    seq: u32,
    cmd: u8,
    version: u8,
    attrs: &[u8],
) -> Vec<u8> {
    let len = NLMSG_HDRLEN + GENL_HDRLEN + attrs.len();
    let mut msg = Vec::with_capacity(len);
    msg.extend_from_slice(&(len as u32).to_ne_bytes());
    msg.extend_from_slice(&family_id.to_ne_bytes());
    msg.extend_from_slice(&(flags | NLM_F_REQUEST).to_ne_bytes());
    msg.extend_from_slice(&seq.to_ne_bytes());
    msg.extend_from_slice(&0u32.to_ne_bytes()); // pid: kernel assigns
    msg.push(cmd);
    msg.push(version);
    msg.extend_from_slice(&0u16.to_ne_bytes()); // reserved
    msg.extend_from_slice(attrs);
    msg
}

/// One parsed reply message.
pub struct Reply<'a> {
    pub typ: u16,
    pub seq: u32,
    /// Payload after the nlmsghdr.
    pub payload: &'a [u8],
}

impl Reply<'_> {
    /// For `NLMSG_ERROR` replies: the errno carried in the payload. Zero is
    /// an acknowledgment.
    pub fn error_code(&self) -> Option<i32> {
        if self.typ != NLMSG_ERROR {
            return None;
        }
        self.payload
            .get(..4)
            .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Attributes of a generic-netlink reply (payload past the genlmsghdr).
    pub fn genl_attrs(&self) -> AttrIter<'_> {
        AttrIter::new(self.payload.get(GENL_HDRLEN..).unwrap_or(&[]))
    }
}

/// Parses a receive buffer into its netlink messages.
pub fn parse_replies(buf: &[u8]) -> Vec<Reply<'_>> {
    let mut replies = Vec::new();
    let mut rest = buf;
    while rest.len() >= NLMSG_HDRLEN {
        let len = u32::from_ne_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if len < NLMSG_HDRLEN || len > rest.len() {
            break;
        }
        let typ = u16::from_ne_bytes([rest[4], rest[5]]);
        let seq = u32::from_ne_bytes([rest[8], rest[9], rest[10], rest[11]]);
        replies.push(Reply {
            typ,
            seq,
            payload: &rest[NLMSG_HDRLEN..len],
        });
        rest = &rest[nla_align(len).min(rest.len())..];
    }
    replies
}

/// A blocking `NETLINK_GENERIC` socket.
pub struct GenlSocket {
    fd: libc::c_int,
    seq: u32,
}

impl GenlSocket {
    /// Opens and binds the socket (kernel autobinds the port id).
    pub fn connect() -> io::Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW, libc::NETLINK_GENERIC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;
        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        Ok(GenlSocket { fd, seq: 0 })
    }

    fn send(&self, msg: &[u8]) -> io::Result<()> {
        let n = unsafe {
            libc::send(self.fd, msg.as_ptr() as *const libc::c_void, msg.len(), 0)
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Sends one command and reads replies until the matching acknowledgment
    /// or error arrives. Returns the data replies (for dump-less requests
    /// this is usually a single message or none).
    pub fn execute(
        &mut self,
        family_id: u16,
        cmd: u8,
        version: u8,
        flags: u16,
        attrs: &[u8],
    ) -> io::Result<Vec<Vec<u8>>> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let msg = build_message(family_id, flags, seq, cmd, version, attrs);
        self.send(&msg)?;

        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.recv(&mut buf)?;
            for reply in parse_replies(&buf[..n]) {
                if reply.seq != seq {
                    continue;
                }
                match reply.typ {
                    NLMSG_ERROR => {
                        let code = reply.error_code().unwrap_or(0);
                        if code != 0 {
                            return Err(io::Error::from_raw_os_error(-code));
                        }
                        return Ok(data);
                    }
                    NLMSG_DONE => return Ok(data),
                    _ => {
                        data.push(reply.payload.to_vec());
                        // Without NLM_F_ACK there is no trailing ack; a
                        // single data reply completes the exchange.
                        if flags & NLM_F_ACK == 0 {
                            return Ok(data);
                        }
                    }
                }
            }
        }
    }

    pub fn close(self) {
        // Drop closes the fd.
    }
}

impl Drop for GenlSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
