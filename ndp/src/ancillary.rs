// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Decoding of the control messages the kernel delivers alongside each
//! datagram on the listening socket.
//!
//! The buffer is copied into storage aligned for `cmsghdr` and walked with
//! the libc `CMSG_FIRSTHDR`, `CMSG_NXTHDR` and `CMSG_DATA` helpers, so the
//! header layout and padding are whatever the platform defines.

use libc::c_int;
use std::mem::size_of;
use std::net::Ipv6Addr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AncillaryError {
    #[error("control message at offset {offset} has invalid length {len}")]
    BadLength { offset: usize, len: usize },

    #[error("control message level {level} type {typ} is too short: {len}")]
    ShortData { level: c_int, typ: c_int, len: usize },
}

/// The metadata extracted from one datagram's control messages. Fields are
/// absent when the kernel did not deliver the corresponding message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ancillary {
    /// Hop limit of the IPv6 header the datagram arrived in.
    pub hop_limit: Option<u8>,
    /// Destination address of the IPv6 header.
    pub destination: Option<Ipv6Addr>,
    /// Index of the interface the datagram arrived on.
    pub if_index: Option<u32>,
    /// Kernel receive timestamp.
    pub timestamp: Option<SystemTime>,
}

impl Ancillary {
    /// Decode a control buffer as filled in by `recvmsg`. Messages this
    /// daemon does not ask for are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, AncillaryError> {
        let mut result = Self::default();
        for cmsg in messages(buf)? {
            match (cmsg.level, cmsg.typ) {
                (libc::IPPROTO_IPV6, libc::IPV6_HOPLIMIT) => {
                    let v = read_int(&cmsg)?;
                    // The kernel reports an int, hop limits fit in a byte.
                    result.hop_limit = u8::try_from(v).ok();
                }
                (libc::IPPROTO_IPV6, libc::IPV6_PKTINFO) => {
                    // struct in6_pktinfo { in6_addr; unsigned int ifindex }
                    if cmsg.data.len() < 20 {
                        return Err(cmsg.short());
                    }
                    let mut addr = [0u8; 16];
                    addr.copy_from_slice(&cmsg.data[..16]);
                    result.destination = Some(Ipv6Addr::from(addr));
                    result.if_index = Some(u32::from_ne_bytes([
                        cmsg.data[16],
                        cmsg.data[17],
                        cmsg.data[18],
                        cmsg.data[19],
                    ]));
                }
                (libc::SOL_SOCKET, libc::SO_TIMESTAMP) => {
                    result.timestamp = Some(read_timeval(&cmsg)?);
                }
                _ => {}
            }
        }
        Ok(result)
    }
}

/// One control message borrowed from a control buffer.
struct ControlMessage<'a> {
    level: c_int,
    typ: c_int,
    data: &'a [u8],
}

impl ControlMessage<'_> {
    fn short(&self) -> AncillaryError {
        AncillaryError::ShortData {
            level: self.level,
            typ: self.typ,
            len: self.data.len(),
        }
    }
}

/// Split a control buffer into its messages. A header whose length is
/// smaller than a bare header or runs past the end of the buffer is an
/// error.
fn messages(buf: &[u8]) -> Result<Vec<ControlMessage<'_>>, AncillaryError> {
    let mut storage = vec![0usize; buf.len().div_ceil(size_of::<usize>())];
    let base = storage.as_mut_ptr() as usize;
    unsafe {
        std::ptr::copy_nonoverlapping(
            buf.as_ptr(),
            storage.as_mut_ptr().cast::<u8>(),
            buf.len(),
        );
    }

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_control = storage.as_mut_ptr().cast();
    msg.msg_controllen = buf.len() as _;

    let min_len = unsafe { libc::CMSG_LEN(0) } as usize;
    let mut out = Vec::new();
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
    while !cmsg.is_null() {
        let offset = cmsg as usize - base;
        let hdr = unsafe { &*cmsg };
        let len = hdr.cmsg_len as usize;
        if len < min_len || len > buf.len() - offset {
            return Err(AncillaryError::BadLength { offset, len });
        }
        let data = unsafe { libc::CMSG_DATA(cmsg) } as usize - base;
        out.push(ControlMessage {
            level: hdr.cmsg_level,
            typ: hdr.cmsg_type,
            data: &buf[data..offset + len],
        });
        cmsg = unsafe { libc::CMSG_NXTHDR(&msg, cmsg) };
    }
    Ok(out)
}

fn read_int(cmsg: &ControlMessage<'_>) -> Result<c_int, AncillaryError> {
    match cmsg.data {
        [a, b, c, d, ..] => Ok(c_int::from_ne_bytes([*a, *b, *c, *d])),
        _ => Err(cmsg.short()),
    }
}

fn read_timeval(
    cmsg: &ControlMessage<'_>,
) -> Result<SystemTime, AncillaryError> {
    if cmsg.data.len() < size_of::<libc::timeval>() {
        return Err(cmsg.short());
    }
    // The data is not guaranteed to be aligned for a timeval.
    let tv: libc::timeval = unsafe {
        std::ptr::read_unaligned(cmsg.data.as_ptr().cast::<libc::timeval>())
    };
    let since_epoch = Duration::from_secs(tv.tv_sec.max(0) as u64)
        + Duration::from_micros(tv.tv_usec.max(0) as u64);
    Ok(UNIX_EPOCH + since_epoch)
}
