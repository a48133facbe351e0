//! Minimal netlink message codec and dump driver.
//!
//! The exporter only ever issues two kinds of request: a generic-netlink
//! dump of the GTP PDP table and an rtnetlink dump of the link table. This
//! module provides the framing shared by both: building a request, splitting
//! a receive buffer into messages, and walking the attribute list inside a
//! message payload.

pub mod genl;
pub mod route;

pub use genl::GtpTunnelTable;
pub use route::RtnlLinkTable;

use netlink_sys::{Socket, SocketAddr};
use std::io;
use thiserror::Error;

pub(crate) const NLMSG_HDRLEN: usize = 16;
const NLA_HDRLEN: usize = 4;

pub(crate) const NLMSG_ERROR: u16 = 2;
pub(crate) const NLMSG_DONE: u16 = 3;

pub(crate) const NLM_F_REQUEST: u16 = 0x01;
pub(crate) const NLM_F_MULTI: u16 = 0x02;
pub(crate) const NLM_F_DUMP: u16 = 0x300;

const NLA_F_NESTED: u16 = 0x8000;
const NLA_F_NET_BYTEORDER: u16 = 0x4000;
const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Errors raised while talking to the kernel over netlink.
#[derive(Debug, Error)]
pub enum NetlinkError {
    #[error("netlink socket error: {0}")]
    Io(#[from] io::Error),

    #[error("kernel returned error: {}", io::Error::from_raw_os_error(*errno))]
    Kernel { errno: i32 },

    #[error("truncated netlink {what}")]
    Truncated { what: &'static str },

    #[error("invalid UTF-8 in netlink {what}")]
    Encoding { what: &'static str },

    #[error("generic netlink family `{0}` is not registered")]
    FamilyNotFound(String),

    #[error("no reply to netlink request")]
    NoReply,
}

pub(crate) const fn align(len: usize) -> usize {
    (len + 3) & !3
}

/// An outgoing netlink message under construction.
pub(crate) struct Request {
    buf: Vec<u8>,
}

impl Request {
    pub fn new(msg_type: u16, flags: u16, seq: u32) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&msg_type.to_ne_bytes());
        buf.extend_from_slice(&flags.to_ne_bytes());
        buf.extend_from_slice(&seq.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        Self { buf }
    }

    /// Appends a fixed family header (genlmsghdr, ifinfomsg, ...).
    pub fn push_header(&mut self, header: &[u8]) {
        self.buf.extend_from_slice(header);
        self.pad();
    }

    pub fn push_attr(&mut self, attr_type: u16, value: &[u8]) {
        let len = (NLA_HDRLEN + value.len()) as u16;
        self.buf.extend_from_slice(&len.to_ne_bytes());
        self.buf.extend_from_slice(&attr_type.to_ne_bytes());
        self.buf.extend_from_slice(value);
        self.pad();
    }

    fn pad(&mut self) {
        let padded = align(self.buf.len());
        self.buf.resize(padded, 0);
    }

    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}

/// A received netlink message, borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Message<'a> {
    pub msg_type: u16,
    pub flags: u16,
    pub seq: u32,
    pub payload: &'a [u8],
}

/// Splits a receive buffer into the netlink messages it contains.
pub(crate) fn split_messages(mut buf: &[u8]) -> Result<Vec<Message<'_>>, NetlinkError> {
    let mut messages = Vec::new();
    while buf.len() >= NLMSG_HDRLEN {
        let len = read_u32(&buf[0..4]) as usize;
        if len < NLMSG_HDRLEN || len > buf.len() {
            return Err(NetlinkError::Truncated { what: "message" });
        }
        messages.push(Message {
            msg_type: read_u16(&buf[4..6]),
            flags: read_u16(&buf[6..8]),
            seq: read_u32(&buf[8..12]),
            payload: &buf[NLMSG_HDRLEN..len],
        });
        buf = &buf[align(len).min(buf.len())..];
    }
    Ok(messages)
}

/// A single netlink attribute (`struct nlattr`) with flag bits stripped from its type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Attr<'a> {
    pub attr_type: u16,
    pub value: &'a [u8],
}

impl<'a> Attr<'a> {
    pub fn as_u16(&self) -> Result<u16, NetlinkError> {
        self.value
            .get(0..2)
            .map(read_u16)
            .ok_or(NetlinkError::Truncated { what: "u16 attribute" })
    }

    pub fn as_u32(&self) -> Result<u32, NetlinkError> {
        self.value
            .get(0..4)
            .map(read_u32)
            .ok_or(NetlinkError::Truncated { what: "u32 attribute" })
    }

    /// Reads a NUL-terminated string attribute.
    pub fn as_str(&self) -> Result<&'a str, NetlinkError> {
        let bytes = match self.value.iter().position(|&b| b == 0) {
            Some(end) => &self.value[..end],
            None => self.value,
        };
        std::str::from_utf8(bytes).map_err(|_| NetlinkError::Encoding { what: "string attribute" })
    }

    pub fn nested(&self) -> Result<Vec<Attr<'a>>, NetlinkError> {
        attributes(self.value)
    }
}

/// Walks a packed attribute list.
pub(crate) fn attributes(mut buf: &[u8]) -> Result<Vec<Attr<'_>>, NetlinkError> {
    let mut attrs = Vec::new();
    while buf.len() >= NLA_HDRLEN {
        let len = read_u16(&buf[0..2]) as usize;
        if len < NLA_HDRLEN || len > buf.len() {
            return Err(NetlinkError::Truncated { what: "attribute" });
        }
        attrs.push(Attr {
            attr_type: read_u16(&buf[2..4]) & NLA_TYPE_MASK,
            value: &buf[NLA_HDRLEN..len],
        });
        buf = &buf[align(len).min(buf.len())..];
    }
    Ok(attrs)
}

pub(crate) fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_ne_bytes([bytes[0], bytes[1]])
}

pub(crate) fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decodes the `struct nlmsgerr` payload of an `NLMSG_ERROR` or the status
/// word of an `NLMSG_DONE`. Zero means success (an ACK).
pub(crate) fn status(payload: &[u8]) -> Result<(), NetlinkError> {
    let code = payload
        .get(0..4)
        .map(|b| read_u32(b) as i32)
        .ok_or(NetlinkError::Truncated { what: "error message" })?;
    if code == 0 {
        Ok(())
    } else {
        Err(NetlinkError::Kernel { errno: -code })
    }
}

/// Opens a netlink socket of the given protocol, bound to a kernel-assigned port.
pub(crate) fn connect(protocol: isize) -> Result<Socket, NetlinkError> {
    let mut socket = Socket::new(protocol)?;
    socket.bind_auto()?;
    socket.connect(&SocketAddr::new(0, 0))?;
    Ok(socket)
}

/// Sends `request` and feeds every reply carrying `seq` to `on_message`
/// until the kernel signals the end of the exchange.
pub(crate) fn exchange<F>(
    socket: &Socket,
    request: &[u8],
    seq: u32,
    on_message: F,
) -> Result<(), NetlinkError>
where
    F: FnMut(&Message<'_>) -> Result<(), NetlinkError>,
{
    socket.send(request, 0)?;
    drive(|| socket.recv_from_full().map(|(buf, _)| buf), seq, on_message)
}

/// Reads reply buffers from `recv` until the exchange for `seq` completes.
///
/// A dump ends with `NLMSG_DONE`, a request with its single reply or an
/// `NLMSG_ERROR` carrying the ACK or errno. Messages for other sequence
/// numbers are ignored.
pub(crate) fn drive<R, F>(mut recv: R, seq: u32, mut on_message: F) -> Result<(), NetlinkError>
where
    R: FnMut() -> io::Result<Vec<u8>>,
    F: FnMut(&Message<'_>) -> Result<(), NetlinkError>,
{
    let mut replied = false;
    loop {
        let buf = recv()?;
        if buf.is_empty() {
            return if replied { Ok(()) } else { Err(NetlinkError::NoReply) };
        }
        for message in split_messages(&buf)? {
            if message.seq != seq {
                continue;
            }
            match message.msg_type {
                NLMSG_DONE => return status(message.payload).or_else(ignore_short_done),
                NLMSG_ERROR => {
                    status(message.payload)?;
                    return Ok(());
                }
                _ => {
                    replied = true;
                    on_message(&message)?;
                    if message.flags & NLM_F_MULTI == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }
}

// Older kernels send NLMSG_DONE without a status word.
fn ignore_short_done(err: NetlinkError) -> Result<(), NetlinkError> {
    match err {
        NetlinkError::Truncated { .. } => Ok(()),
        other => Err(other),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a raw message as the kernel would send it.
    pub(crate) fn reply(msg_type: u16, flags: u16, seq: u32, header: &[u8], attrs: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut request = Request::new(msg_type, flags, seq);
        if !header.is_empty() {
            request.push_header(header);
        }
        for (attr_type, value) in attrs {
            request.push_attr(*attr_type, value);
        }
        request.finish()
    }

    #[test]
    fn request_length_is_written_and_padded() {
        let mut request = Request::new(16, NLM_F_REQUEST, 7);
        request.push_header(&[3, 1, 0, 0]);
        request.push_attr(2, b"gtp\0");
        let bytes = request.finish();

        assert_eq!(bytes.len(), NLMSG_HDRLEN + 4 + 8);
        assert_eq!(read_u32(&bytes[0..4]) as usize, bytes.len());
        assert_eq!(read_u16(&bytes[4..6]), 16);
        assert_eq!(read_u32(&bytes[8..12]), 7);
    }

    #[test]
    fn split_messages_walks_multipart_buffer() {
        let mut buf = reply(20, NLM_F_MULTI, 1, &[0, 0, 0, 0], &[(1, vec![1, 2, 3])]);
        buf.extend(reply(NLMSG_DONE, NLM_F_MULTI, 1, &0i32.to_ne_bytes(), &[]));

        let messages = split_messages(&buf).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].msg_type, 20);
        assert_eq!(messages[1].msg_type, NLMSG_DONE);
    }

    #[test]
    fn split_messages_rejects_overlong_length() {
        let mut buf = reply(20, 0, 1, &[], &[]);
        buf[0..4].copy_from_slice(&64u32.to_ne_bytes());
        assert!(matches!(
            split_messages(&buf),
            Err(NetlinkError::Truncated { what: "message" })
        ));
    }

    #[test]
    fn attributes_are_aligned_and_type_masked() {
        let mut buf = Vec::new();
        // 5-byte value, padded to 8 bytes on the wire.
        buf.extend_from_slice(&9u16.to_ne_bytes());
        buf.extend_from_slice(&(3u16 | NLA_F_NESTED).to_ne_bytes());
        buf.extend_from_slice(b"gtp0\0\0\0\0");
        buf.extend_from_slice(&8u16.to_ne_bytes());
        buf.extend_from_slice(&4u16.to_ne_bytes());
        buf.extend_from_slice(&1u32.to_ne_bytes());

        let attrs = attributes(&buf).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].attr_type, 3);
        assert_eq!(attrs[0].as_str().unwrap(), "gtp0");
        assert_eq!(attrs[1].attr_type, 4);
        assert_eq!(attrs[1].as_u32().unwrap(), 1);
    }

    #[test]
    fn truncated_attribute_is_an_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&12u16.to_ne_bytes());
        buf.extend_from_slice(&1u16.to_ne_bytes());
        buf.extend_from_slice(&[0, 0]);
        assert!(matches!(
            attributes(&buf),
            Err(NetlinkError::Truncated { what: "attribute" })
        ));
    }

    #[test]
    fn short_u32_attribute_is_an_error() {
        let attr = Attr { attr_type: 2, value: &[1, 0] };
        assert!(attr.as_u32().is_err());
    }

    #[test]
    fn error_status_maps_to_errno() {
        let payload = (-13i32).to_ne_bytes();
        match status(&payload) {
            Err(NetlinkError::Kernel { errno }) => assert_eq!(errno, 13),
            other => panic!("expected kernel error, got {:?}", other),
        }
        assert!(status(&0i32.to_ne_bytes()).is_ok());
    }
    /// Hands out `buffers` one receive at a time, then empty reads.
    fn receiver(buffers: Vec<Vec<u8>>) -> impl FnMut() -> io::Result<Vec<u8>> {
        let mut buffers = buffers.into_iter();
        move || Ok(buffers.next().unwrap_or_default())
    }

    fn done(seq: u32) -> Vec<u8> {
        reply(NLMSG_DONE, NLM_F_MULTI, seq, &0i32.to_ne_bytes(), &[])
    }

    fn collect_types(buffers: Vec<Vec<u8>>, seq: u32) -> (Result<(), NetlinkError>, Vec<u16>) {
        let mut seen = Vec::new();
        let result = drive(receiver(buffers), seq, |m| {
            seen.push(m.msg_type);
            Ok(())
        });
        (result, seen)
    }

    #[test]
    fn dump_spans_several_receives() {
        let first = reply(20, NLM_F_MULTI, 5, &[0; 4], &[]);
        let mut second = reply(21, NLM_F_MULTI, 5, &[0; 4], &[]);
        second.extend(done(5));

        let (result, seen) = collect_types(vec![first, second], 5);
        assert!(result.is_ok());
        assert_eq!(seen, [20, 21]);
    }

    #[test]
    fn replies_for_other_sequences_are_skipped() {
        let mut buf = reply(20, NLM_F_MULTI, 4, &[0; 4], &[]);
        buf.extend(reply(21, NLM_F_MULTI, 5, &[0; 4], &[]));
        buf.extend(done(4));
        buf.extend(done(5));

        let (result, seen) = collect_types(vec![buf], 5);
        assert!(result.is_ok());
        assert_eq!(seen, [21]);
    }

    #[test]
    fn done_with_error_status_fails_the_dump() {
        let mut buf = reply(20, NLM_F_MULTI, 5, &[0; 4], &[]);
        buf.extend(reply(NLMSG_DONE, NLM_F_MULTI, 5, &(-16i32).to_ne_bytes(), &[]));

        let (result, seen) = collect_types(vec![buf], 5);
        assert!(matches!(result, Err(NetlinkError::Kernel { errno: 16 })));
        assert_eq!(seen, [20]);
    }

    #[test]
    fn done_without_status_word_ends_the_dump() {
        let mut buf = reply(20, NLM_F_MULTI, 5, &[0; 4], &[]);
        buf.extend(reply(NLMSG_DONE, NLM_F_MULTI, 5, &[], &[]));

        let (result, seen) = collect_types(vec![buf], 5);
        assert!(result.is_ok());
        assert_eq!(seen, [20]);
    }

    #[test]
    fn error_message_ack_succeeds() {
        let ack = reply(NLMSG_ERROR, 0, 5, &0i32.to_ne_bytes(), &[]);
        let (result, seen) = collect_types(vec![ack], 5);
        assert!(result.is_ok());
        assert!(seen.is_empty());
    }

    #[test]
    fn error_message_errno_is_returned() {
        let nack = reply(NLMSG_ERROR, 0, 5, &(-2i32).to_ne_bytes(), &[]);
        let (result, _) = collect_types(vec![nack], 5);
        assert!(matches!(result, Err(NetlinkError::Kernel { errno: 2 })));
    }

    #[test]
    fn single_part_reply_ends_the_exchange() {
        let mut buf = reply(20, 0, 5, &[0; 4], &[]);
        buf.extend(reply(21, 0, 5, &[0; 4], &[]));

        let (result, seen) = collect_types(vec![buf], 5);
        assert!(result.is_ok());
        assert_eq!(seen, [20]);
    }

    #[test]
    fn empty_read_without_reply_is_no_reply() {
        let (result, _) = collect_types(vec![], 5);
        assert!(matches!(result, Err(NetlinkError::NoReply)));
    }

    #[test]
    fn empty_read_after_replies_ends_the_dump() {
        let buf = reply(20, NLM_F_MULTI, 5, &[0; 4], &[]);
        let (result, seen) = collect_types(vec![buf], 5);
        assert!(result.is_ok());
        assert_eq!(seen, [20]);
    }

    #[test]
    fn receive_error_is_propagated() {
        let result = drive(
            || Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            5,
            |_| Ok(()),
        );
        assert!(matches!(result, Err(NetlinkError::Io(_))));
    }

    #[test]
    fn callback_error_stops_the_dump() {
        let mut buf = reply(20, NLM_F_MULTI, 5, &[0; 4], &[]);
        buf.extend(reply(21, NLM_F_MULTI, 5, &[0; 4], &[]));
        let mut calls = 0;
        let result = drive(receiver(vec![buf]), 5, |_| {
            calls += 1;
            Err(NetlinkError::Truncated { what: "test payload" })
        });
        assert!(matches!(result, Err(NetlinkError::Truncated { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn invalid_utf8_string_attribute_is_an_encoding_error() {
        let attr = Attr { attr_type: 3, value: &[0xff, 0xfe, 0] };
        assert!(matches!(
            attr.as_str(),
            Err(NetlinkError::Encoding { what: "string attribute" })
        ));
    }
}
