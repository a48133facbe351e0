//! rtnetlink client for the kernel link table.

use super::{attributes, connect, exchange, read_u32, Attr, Message, NetlinkError, Request};
use super::{NLM_F_DUMP, NLM_F_REQUEST};
use crate::core::{InterfaceDescriptor, LinkTable};
use netlink_sys::protocols::NETLINK_ROUTE;
use tracing::debug;

const RTM_NEWLINK: u16 = 16;
const RTM_GETLINK: u16 = 18;
const IFINFOMSG_LEN: usize = 16;

const IFLA_IFNAME: u16 = 3;
const IFLA_LINKINFO: u16 = 18;
const IFLA_INFO_KIND: u16 = 1;
const IFLA_INFO_DATA: u16 = 2;
const IFLA_GTP_ROLE: u16 = 4;

/// Lists network interfaces through an `RTM_GETLINK` dump.
#[derive(Debug, Clone, Default)]
pub struct RtnlLinkTable;

impl RtnlLinkTable {
    pub fn new() -> Self {
        Self
    }
}

impl LinkTable for RtnlLinkTable {
    fn links(&self) -> Result<Vec<InterfaceDescriptor>, NetlinkError> {
        let socket = connect(NETLINK_ROUTE)?;

        let mut request = Request::new(RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP, 1);
        // struct ifinfomsg with ifi_family = AF_UNSPEC
        request.push_header(&[0u8; IFINFOMSG_LEN]);

        let mut links = Vec::new();
        exchange(&socket, &request.finish(), 1, |message| {
            if message.msg_type != RTM_NEWLINK {
                return Ok(());
            }
            match parse_link(message) {
                Ok(link) => links.push(link),
                Err(e) => debug!(error = %e, "Skipping undecodable link"),
            }
            Ok(())
        })?;
        debug!(count = links.len(), "Dumped network links");
        Ok(links)
    }
}

fn parse_link(message: &Message<'_>) -> Result<InterfaceDescriptor, NetlinkError> {
    if message.payload.len() < IFINFOMSG_LEN {
        return Err(NetlinkError::Truncated { what: "ifinfomsg" });
    }
    let mut link = InterfaceDescriptor {
        index: read_u32(&message.payload[4..8]),
        ..Default::default()
    };

    let mut info_data = None;
    for attr in attributes(&message.payload[IFINFOMSG_LEN..])? {
        match attr.attr_type {
            IFLA_IFNAME => link.name = attr.as_str()?.to_string(),
            IFLA_LINKINFO => {
                for info in attr.nested()? {
                    match info.attr_type {
                        IFLA_INFO_KIND => link.kind = Some(info.as_str()?.to_string()),
                        IFLA_INFO_DATA => info_data = Some(info),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    // IFLA_INFO_DATA layouts are per kind; only GTP's carries a role.
    if let (true, Some(data)) = (link.is_gtp(), info_data) {
        link.gtp_role = gtp_role(&data.nested()?)?;
    }
    Ok(link)
}

fn gtp_role(data: &[Attr<'_>]) -> Result<Option<u32>, NetlinkError> {
    data.iter()
        .find(|attr| attr.attr_type == IFLA_GTP_ROLE)
        .map(|attr| attr.as_u32())
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::split_messages;
    use crate::netlink::tests::reply;
    use crate::netlink::NLM_F_MULTI;

    fn ifinfomsg(index: u32) -> Vec<u8> {
        let mut header = vec![0u8; IFINFOMSG_LEN];
        header[4..8].copy_from_slice(&index.to_ne_bytes());
        header
    }

    fn nest(attrs: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (attr_type, value) in attrs {
            let len = (4 + value.len()) as u16;
            out.extend_from_slice(&len.to_ne_bytes());
            out.extend_from_slice(&attr_type.to_ne_bytes());
            out.extend_from_slice(value);
            out.resize(crate::netlink::align(out.len()), 0);
        }
        out
    }

    #[test]
    fn gtp_link_reports_kind_and_role() {
        let linkinfo = nest(&[
            (IFLA_INFO_KIND, b"gtp\0".to_vec()),
            (IFLA_INFO_DATA, nest(&[(IFLA_GTP_ROLE, 1u32.to_ne_bytes().to_vec())])),
        ]);
        let buf = reply(
            RTM_NEWLINK,
            NLM_F_MULTI,
            1,
            &ifinfomsg(7),
            &[(IFLA_IFNAME, b"gtp0\0".to_vec()), (IFLA_LINKINFO, linkinfo)],
        );
        let messages = split_messages(&buf).unwrap();
        let link = parse_link(&messages[0]).unwrap();

        assert_eq!(link.index, 7);
        assert_eq!(link.name, "gtp0");
        assert!(link.is_gtp());
        assert_eq!(link.gtp_role, Some(1));
    }

    #[test]
    fn non_gtp_link_has_no_role() {
        let linkinfo = nest(&[
            (IFLA_INFO_KIND, b"veth\0".to_vec()),
            (IFLA_INFO_DATA, nest(&[(IFLA_GTP_ROLE, 9u32.to_ne_bytes().to_vec())])),
        ]);
        let buf = reply(
            RTM_NEWLINK,
            NLM_F_MULTI,
            1,
            &ifinfomsg(2),
            &[(IFLA_IFNAME, b"veth0\0".to_vec()), (IFLA_LINKINFO, linkinfo)],
        );
        let messages = split_messages(&buf).unwrap();
        let link = parse_link(&messages[0]).unwrap();

        assert_eq!(link.kind.as_deref(), Some("veth"));
        assert_eq!(link.gtp_role, None);
    }

    #[test]
    fn physical_link_has_no_kind() {
        let buf = reply(
            RTM_NEWLINK,
            NLM_F_MULTI,
            1,
            &ifinfomsg(1),
            &[(IFLA_IFNAME, b"eth0\0".to_vec())],
        );
        let messages = split_messages(&buf).unwrap();
        let link = parse_link(&messages[0]).unwrap();

        assert_eq!(link.name, "eth0");
        assert_eq!(link.kind, None);
        assert!(!link.is_gtp());
    }

    #[test]
    fn short_ifinfomsg_is_an_error() {
        let buf = reply(RTM_NEWLINK, NLM_F_MULTI, 1, &[0u8; 8], &[]);
        let messages = split_messages(&buf).unwrap();
        assert!(parse_link(&messages[0]).is_err());
    }
}
