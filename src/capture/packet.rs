//! Locating the IOAM trace option inside a raw IPv6 packet
//!
//! The kernel places IOAM data in a hop-by-hop extension header TLV
//! (option type 49, sub-type 0 for the pre-allocated trace). The capture
//! socket delivers whole IPv6 packets, so the agent walks the fixed IPv6
//! header and the hop-by-hop option list to find the trace bytes.

use crate::ioam::{IOAM_PREALLOC_TRACE, IPV6_TLV_IOAM};

/// Fixed IPv6 header size.
const IPV6_HEADER_LEN: usize = 40;

/// Next-header value for the hop-by-hop extension header.
const NEXT_HEADER_HOP_BY_HOP: u8 = 0;

/// Pad1 option (single zero byte, no length field).
const OPT_PAD1: u8 = 0;

/// Returns the pre-allocated trace sub-buffer of `packet`, or `None` when
/// the packet carries no IOAM trace option. `packet` starts at the IPv6
/// header.
pub fn find_trace_option(packet: &[u8]) -> Option<&[u8]> {
    if packet.len() < IPV6_HEADER_LEN {
        return None;
    }
    if packet[6] != NEXT_HEADER_HOP_BY_HOP {
        return None;
    }

    // Hop-by-hop header: next-header byte, length byte (8-byte units,
    // not counting the first 8), then the option TLVs.
    let hbh = &packet[IPV6_HEADER_LEN..];
    if hbh.len() < 2 {
        return None;
    }
    let hbh_len = (hbh[1] as usize + 1) * 8;
    if hbh.len() < hbh_len {
        return None;
    }

    let mut opts = &hbh[2..hbh_len];
    while !opts.is_empty() {
        let opt_type = opts[0];
        if opt_type == OPT_PAD1 {
            opts = &opts[1..];
            continue;
        }
        if opts.len() < 2 {
            return None;
        }
        let opt_len = opts[1] as usize;
        if opts.len() < 2 + opt_len {
            return None;
        }
        let body = &opts[2..2 + opt_len];
        if opt_type == IPV6_TLV_IOAM {
            // Option body: reserved byte, IOAM option sub-type, then the
            // trace header and node list.
            if body.len() >= 2 && body[1] == IOAM_PREALLOC_TRACE {
                return Some(&body[2..]);
            }
            return None;
        }
        opts = &opts[2 + opt_len..];
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an IPv6 packet whose hop-by-hop header carries `trace` inside
    /// an IOAM TLV, padded to an 8-byte boundary.
    pub fn build_ioam_packet(trace: &[u8]) -> Vec<u8> {
        let opt_body_len = 2 + trace.len(); // reserved + sub-type + trace
        let tlv_len = 2 + opt_body_len;
        let hbh_payload = 2 + tlv_len;
        let padded = hbh_payload.div_ceil(8) * 8;

        let mut packet = vec![0u8; IPV6_HEADER_LEN];
        packet[0] = 0x60; // version 6
        packet[6] = NEXT_HEADER_HOP_BY_HOP;

        let mut hbh = Vec::with_capacity(padded);
        hbh.push(59); // next header: no next header
        hbh.push((padded / 8 - 1) as u8);
        hbh.push(IPV6_TLV_IOAM);
        hbh.push(opt_body_len as u8);
        hbh.push(0); // reserved
        hbh.push(IOAM_PREALLOC_TRACE);
        hbh.extend_from_slice(trace);
        hbh.resize(padded, 0); // Pad1 fill
        packet.extend_from_slice(&hbh);
        packet
    }

    #[test]
    fn finds_trace_in_hop_by_hop() {
        let trace = [0xAAu8; 36];
        let packet = build_ioam_packet(&trace);
        assert_eq!(find_trace_option(&packet), Some(&trace[..]));
    }

    #[test]
    fn skips_leading_padding_options() {
        let trace = [0x55u8; 8];
        let mut packet = vec![0u8; IPV6_HEADER_LEN];
        packet[6] = NEXT_HEADER_HOP_BY_HOP;
        let mut hbh = vec![59u8, 1]; // 16 bytes total
        hbh.push(OPT_PAD1);
        hbh.push(OPT_PAD1);
        hbh.push(IPV6_TLV_IOAM);
        hbh.push(10);
        hbh.push(0);
        hbh.push(IOAM_PREALLOC_TRACE);
        hbh.extend_from_slice(&trace);
        assert_eq!(hbh.len(), 16);
        packet.extend_from_slice(&hbh);
        assert_eq!(find_trace_option(&packet), Some(&trace[..]));
    }

    #[test]
    fn no_hop_by_hop_header() {
        let mut packet = vec![0u8; IPV6_HEADER_LEN];
        packet[6] = 6; // TCP
        assert_eq!(find_trace_option(&packet), None);
    }

    #[test]
    fn other_option_types_are_skipped() {
        let mut packet = vec![0u8; IPV6_HEADER_LEN];
        packet[6] = NEXT_HEADER_HOP_BY_HOP;
        // One router-alert option, no IOAM.
        let hbh = [59u8, 0, 5, 2, 0, 0, OPT_PAD1, OPT_PAD1];
        packet.extend_from_slice(&hbh);
        assert_eq!(find_trace_option(&packet), None);
    }

    #[test]
    fn truncated_packet_is_none() {
        assert_eq!(find_trace_option(&[0u8; 10]), None);
        let mut packet = vec![0u8; IPV6_HEADER_LEN];
        packet[6] = NEXT_HEADER_HOP_BY_HOP;
        packet.push(59);
        packet.push(4); // claims 40 bytes, none follow
        assert_eq!(find_trace_option(&packet), None);
    }

    #[test]
    fn wrong_ioam_subtype_is_none() {
        let trace = [0u8; 4];
        let mut packet = build_ioam_packet(&trace);
        // Flip the sub-type byte inside the IOAM option body.
        packet[IPV6_HEADER_LEN + 5] = 1;
        assert_eq!(find_trace_option(&packet), None);
    }
}
