// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! ICMPv6 pseudo-header checksum (RFC 4443 section 2.3, RFC 8200 section 8.1).

use std::net::Ipv6Addr;

/// IP protocol number for ICMP6.
pub const ICMP6_NEXT_HDR: u8 = 58;

/// Compute the one's complement checksum of `payload` covered by an IPv6
/// pseudo-header built from `src`, `dst` and `next_header`.
///
/// The checksum field inside `payload` is summed as it appears, so running
/// this over a packet exactly as received yields zero when the packet is
/// intact. To fill in a checksum, zero the field first and store the result
/// big endian.
///
/// ```text
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                         Source Address                        |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                      Destination Address                      |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                   Upper-Layer Packet Length                   |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                      zero                     |  Next Header  |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub fn compute_checksum(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    next_header: u8,
    payload: &[u8],
) -> u16 {
    let mut ck = internet_checksum::Checksum::new();
    ck.add_bytes(&src.octets());
    ck.add_bytes(&dst.octets());
    ck.add_bytes(&(payload.len() as u32).to_be_bytes());
    ck.add_bytes(&[0, 0, 0, next_header]);
    ck.add_bytes(payload);
    u16::from_be_bytes(ck.checksum())
}

/// Compute and write the ICMPv6 checksum into octets 2 and 3 of `packet`.
/// Panics if `packet` is shorter than an ICMPv6 header.
#[cfg(test)]
pub(crate) fn fill_checksum(src: Ipv6Addr, dst: Ipv6Addr, packet: &mut [u8]) {
    packet[2..4].copy_from_slice(&[0, 0]);
    let sum = compute_checksum(src, dst, ICMP6_NEXT_HDR, packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());
}
