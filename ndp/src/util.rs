// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

use crate::packet::Icmp6RouterAdvertisement;
use libc::{c_int, c_void, socklen_t};
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    ffi::{CStr, CString},
    io,
    net::Ipv6Addr,
    os::fd::AsRawFd,
};

pub const ALL_NODES_MCAST: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

pub const ALL_ROUTERS_MCAST: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);

#[derive(Debug, thiserror::Error)]
pub enum ListeningSocketError {
    #[error("new socket error: {0}")]
    NewSocketError(io::Error),

    #[error("set icmp6 filter error: {0}")]
    SetIcmp6Filter(io::Error),

    #[error("join all-nodes multicast group error: {0}")]
    JoinAllNodesMulticast(io::Error),

    #[error("join all-routers multicast group error: {0}")]
    JoinAllRoutersMulticast(io::Error),

    #[error("enable hop limit reception error: {0}")]
    RecvHopLimit(io::Error),

    #[error("enable packet info reception error: {0}")]
    RecvPktInfo(io::Error),

    #[error("enable receive timestamps error: {0}")]
    Timestamp(io::Error),
}

/// Create a raw ICMPv6 socket that only receives router advertisements.
///
/// The socket joins the all-nodes and all-routers link-local groups on
/// `index`, or on the kernel's default interface when no index is given, and
/// asks the kernel to deliver the hop limit, packet info and a receive
/// timestamp alongside each datagram.
pub fn create_socket(
    index: Option<u32>,
) -> Result<Socket, ListeningSocketError> {
    use ListeningSocketError as E;

    let s = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))
        .map_err(E::NewSocketError)?;

    let filter = icmp6_filter_pass_only(Icmp6RouterAdvertisement::TYPE);
    setsockopt(&s, libc::IPPROTO_ICMPV6, ICMP6_FILTER, &filter)
        .map_err(E::SetIcmp6Filter)?;

    let index = index.unwrap_or(0);
    s.join_multicast_v6(&ALL_NODES_MCAST, index)
        .map_err(E::JoinAllNodesMulticast)?;
    s.join_multicast_v6(&ALL_ROUTERS_MCAST, index)
        .map_err(E::JoinAllRoutersMulticast)?;

    let on: c_int = 1;
    setsockopt(&s, libc::IPPROTO_IPV6, libc::IPV6_RECVHOPLIMIT, &on)
        .map_err(E::RecvHopLimit)?;
    setsockopt(&s, libc::IPPROTO_IPV6, libc::IPV6_RECVPKTINFO, &on)
        .map_err(E::RecvPktInfo)?;
    setsockopt(&s, libc::SOL_SOCKET, libc::SO_TIMESTAMP, &on)
        .map_err(E::Timestamp)?;

    Ok(s)
}

// from <netinet/icmp6.h>
const ICMP6_FILTER: c_int = 1;

/// Build a `struct icmp6_filter` that blocks every ICMPv6 type except `typ`.
/// A set bit blocks the corresponding type.
fn icmp6_filter_pass_only(typ: u8) -> [u32; 8] {
    let mut filter = [u32::MAX; 8];
    filter[usize::from(typ >> 5)] &= !(1u32 << (typ & 31));
    filter
}

fn setsockopt<T>(
    s: &Socket,
    level: c_int,
    name: c_int,
    value: &T,
) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            s.as_raw_fd(),
            level,
            name,
            value as *const T as *const c_void,
            std::mem::size_of::<T>() as socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Returns true for addresses in fe80::/10.
pub fn is_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Resolve an interface name to its index.
pub fn interface_index(name: &str) -> io::Result<u32> {
    let cname = CString::new(name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(index)
}

/// Resolve an interface index to its name.
pub fn interface_name(index: u32) -> io::Result<String> {
    let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
    let p = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
    if p.is_null() {
        return Err(io::Error::last_os_error());
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}
