//! Generic-netlink client for the kernel `gtp` family.

use super::{attributes, connect, exchange, Attr, Message, NetlinkError, Request};
use super::{NLM_F_DUMP, NLM_F_REQUEST};
use crate::core::{TunnelRecord, TunnelTable};
use netlink_sys::protocols::NETLINK_GENERIC;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

const GENL_HDRLEN: usize = 4;
const GENL_ID_CTRL: u16 = 0x10;
const CTRL_CMD_GETFAMILY: u8 = 3;
const CTRL_ATTR_FAMILY_ID: u16 = 1;
const CTRL_ATTR_FAMILY_NAME: u16 = 2;

const GTP_GENL_NAME: &str = "gtp";
const GTP_GENL_VERSION: u8 = 0;
const GTP_CMD_GETPDP: u8 = 2;

const GTPA_LINK: u16 = 1;
const GTPA_VERSION: u16 = 2;
const GTPA_TID: u16 = 3;
const GTPA_PEER_ADDRESS: u16 = 4;
const GTPA_MS_ADDRESS: u16 = 5;
const GTPA_I_TEI: u16 = 8;
const GTPA_O_TEI: u16 = 9;
const GTPA_PEER_ADDR6: u16 = 11;
const GTPA_MS_ADDR6: u16 = 12;

const ENOENT: i32 = 2;

/// Reads PDP contexts from the kernel through the `gtp` generic-netlink family.
///
/// Every call opens its own socket, so concurrent scrapes never share state.
#[derive(Debug, Clone, Default)]
pub struct GtpTunnelTable;

impl GtpTunnelTable {
    pub fn new() -> Self {
        Self
    }
}

impl TunnelTable for GtpTunnelTable {
    fn tunnels(&self) -> Result<Vec<TunnelRecord>, NetlinkError> {
        let socket = connect(NETLINK_GENERIC)?;
        let family = resolve_family(&socket, GTP_GENL_NAME)?;

        let mut request = Request::new(family, NLM_F_REQUEST | NLM_F_DUMP, 2);
        request.push_header(&[GTP_CMD_GETPDP, GTP_GENL_VERSION, 0, 0]);

        let mut tunnels = Vec::new();
        exchange(&socket, &request.finish(), 2, |message| {
            if message.msg_type == family {
                if let Some(tunnel) = parse_pdp(message)? {
                    tunnels.push(tunnel);
                }
            }
            Ok(())
        })?;
        debug!(count = tunnels.len(), "Dumped GTP PDP contexts");
        Ok(tunnels)
    }
}

fn resolve_family(socket: &netlink_sys::Socket, name: &str) -> Result<u16, NetlinkError> {
    let mut family_name = name.as_bytes().to_vec();
    family_name.push(0);

    let mut request = Request::new(GENL_ID_CTRL, NLM_F_REQUEST, 1);
    request.push_header(&[CTRL_CMD_GETFAMILY, 1, 0, 0]);
    request.push_attr(CTRL_ATTR_FAMILY_NAME, &family_name);

    let mut family = None;
    let result = exchange(socket, &request.finish(), 1, |message| {
        family = parse_family_id(message)?;
        Ok(())
    });
    match result {
        Err(NetlinkError::Kernel { errno: ENOENT }) => {
            return Err(NetlinkError::FamilyNotFound(name.to_string()))
        }
        other => other?,
    }
    family.ok_or_else(|| NetlinkError::FamilyNotFound(name.to_string()))
}

fn genl_attributes<'a>(message: &Message<'a>) -> Result<Vec<Attr<'a>>, NetlinkError> {
    let body = message
        .payload
        .get(GENL_HDRLEN..)
        .ok_or(NetlinkError::Truncated { what: "generic netlink header" })?;
    attributes(body)
}

fn parse_family_id(message: &Message<'_>) -> Result<Option<u16>, NetlinkError> {
    for attr in genl_attributes(message)? {
        if attr.attr_type == CTRL_ATTR_FAMILY_ID {
            return attr.as_u16().map(Some);
        }
    }
    Ok(None)
}

/// Decodes one `GTP_CMD_GETPDP` reply. Returns `None` for a context that
/// lacks a version or a peer address.
fn parse_pdp(message: &Message<'_>) -> Result<Option<TunnelRecord>, NetlinkError> {
    let mut version = None;
    let mut peer = None;
    let mut record = TunnelRecord::new(0, IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    for attr in genl_attributes(message)? {
        match attr.attr_type {
            GTPA_LINK => record.link = Some(attr.as_u32()?),
            GTPA_VERSION => version = Some(attr.as_u32()?),
            GTPA_TID => record.tid = Some(as_u64(&attr)?),
            GTPA_PEER_ADDRESS => peer = Some(ipv4(&attr)?),
            GTPA_PEER_ADDR6 => peer = Some(ipv6(&attr)?),
            GTPA_MS_ADDRESS => record.ms_address = Some(ipv4(&attr)?),
            GTPA_MS_ADDR6 => record.ms_address = Some(ipv6(&attr)?),
            GTPA_I_TEI => record.i_tei = Some(attr.as_u32()?),
            GTPA_O_TEI => record.o_tei = Some(attr.as_u32()?),
            _ => {}
        }
    }

    match (version, peer) {
        (Some(version), Some(peer)) => {
            record.version = version;
            record.peer = peer;
            Ok(Some(record))
        }
        _ => {
            debug!(?version, ?peer, "Skipping PDP context without version or peer");
            Ok(None)
        }
    }
}

fn as_u64(attr: &Attr<'_>) -> Result<u64, NetlinkError> {
    let bytes: [u8; 8] = attr
        .value
        .get(0..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(NetlinkError::Truncated { what: "u64 attribute" })?;
    Ok(u64::from_ne_bytes(bytes))
}

// Addresses are carried in network byte order.
fn ipv4(attr: &Attr<'_>) -> Result<IpAddr, NetlinkError> {
    let octets: [u8; 4] = attr
        .value
        .get(0..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(NetlinkError::Truncated { what: "IPv4 address" })?;
    Ok(IpAddr::V4(Ipv4Addr::from(octets)))
}

fn ipv6(attr: &Attr<'_>) -> Result<IpAddr, NetlinkError> {
    let octets: [u8; 16] = attr
        .value
        .get(0..16)
        .and_then(|b| b.try_into().ok())
        .ok_or(NetlinkError::Truncated { what: "IPv6 address" })?;
    Ok(IpAddr::V6(Ipv6Addr::from(octets)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::split_messages;
    use crate::netlink::tests::reply;
    use crate::netlink::NLM_F_MULTI;

    const FAMILY: u16 = 0x1c;

    fn genl_header() -> [u8; 4] {
        [GTP_CMD_GETPDP, GTP_GENL_VERSION, 0, 0]
    }

    #[test]
    fn pdp_reply_decodes_into_tunnel_record() {
        let buf = reply(
            FAMILY,
            NLM_F_MULTI,
            2,
            &genl_header(),
            &[
                (GTPA_LINK, 5u32.to_ne_bytes().to_vec()),
                (GTPA_VERSION, 1u32.to_ne_bytes().to_vec()),
                (GTPA_PEER_ADDRESS, vec![10, 0, 0, 1]),
                (GTPA_MS_ADDRESS, vec![192, 168, 0, 7]),
                (GTPA_I_TEI, 200u32.to_ne_bytes().to_vec()),
                (GTPA_O_TEI, 100u32.to_ne_bytes().to_vec()),
            ],
        );
        let messages = split_messages(&buf).unwrap();
        let record = parse_pdp(&messages[0]).unwrap().unwrap();

        assert_eq!(record.version, 1);
        assert_eq!(record.peer, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(record.ms_address, Some("192.168.0.7".parse().unwrap()));
        assert_eq!(record.link, Some(5));
        assert_eq!(record.i_tei, Some(200));
        assert_eq!(record.o_tei, Some(100));
        assert_eq!(record.tid, None);
    }

    #[test]
    fn pdp_reply_with_ipv6_peer() {
        let peer: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let buf = reply(
            FAMILY,
            NLM_F_MULTI,
            2,
            &genl_header(),
            &[
                (GTPA_VERSION, 0u32.to_ne_bytes().to_vec()),
                (GTPA_TID, 42u64.to_ne_bytes().to_vec()),
                (GTPA_PEER_ADDR6, peer.octets().to_vec()),
            ],
        );
        let messages = split_messages(&buf).unwrap();
        let record = parse_pdp(&messages[0]).unwrap().unwrap();

        assert_eq!(record.version, 0);
        assert_eq!(record.peer, IpAddr::V6(peer));
        assert_eq!(record.tid, Some(42));
    }

    #[test]
    fn pdp_reply_without_peer_is_skipped() {
        let buf = reply(
            FAMILY,
            NLM_F_MULTI,
            2,
            &genl_header(),
            &[(GTPA_VERSION, 1u32.to_ne_bytes().to_vec())],
        );
        let messages = split_messages(&buf).unwrap();
        assert!(parse_pdp(&messages[0]).unwrap().is_none());
    }

    #[test]
    fn truncated_peer_address_is_an_error() {
        let buf = reply(
            FAMILY,
            NLM_F_MULTI,
            2,
            &genl_header(),
            &[
                (GTPA_VERSION, 1u32.to_ne_bytes().to_vec()),
                (GTPA_PEER_ADDRESS, vec![10, 0]),
            ],
        );
        let messages = split_messages(&buf).unwrap();
        assert!(parse_pdp(&messages[0]).is_err());
    }

    #[test]
    fn family_id_is_read_from_ctrl_reply() {
        let buf = reply(
            GENL_ID_CTRL,
            0,
            1,
            &[1, 2, 0, 0],
            &[
                (CTRL_ATTR_FAMILY_NAME, b"gtp\0".to_vec()),
                (CTRL_ATTR_FAMILY_ID, FAMILY.to_ne_bytes().to_vec()),
            ],
        );
        let messages = split_messages(&buf).unwrap();
        assert_eq!(parse_family_id(&messages[0]).unwrap(), Some(FAMILY));
    }
}
