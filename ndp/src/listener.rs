// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Reception and validation of router advertisements.
//!
//! Every datagram read from the listening socket goes through the checks of
//! RFC 4861 section 6.1.2 before it is handed to the router table:
//!
//! 1. the source address is link-local,
//! 2. the hop limit it arrived with is 255,
//! 3. it arrived on the configured interface, if any,
//! 4. the ICMPv6 checksum is valid,
//! 5. it parses as a router advertisement with well formed options.
//!
//! The checks are performed by [`validate`], which operates on an already
//! received [`RawDatagram`] and does not touch the socket.

use crate::ancillary::{Ancillary, AncillaryError};
use crate::checksum::{compute_checksum, ICMP6_NEXT_HDR};
use crate::log::ndp_log;
use crate::packet::{
    parse, Icmp6RouterAdvertisement, ParseError, RouterAdvertisement,
};
use crate::util::is_link_local;
use crate::MOD_LISTENER;
use libc::{c_void, socklen_t};
use slog::Logger;
use socket2::Socket;
use std::io;
use std::mem::{size_of, size_of_val};
use std::net::Ipv6Addr;
use std::os::fd::AsRawFd;
use std::time::{Duration, SystemTime};

/// Largest datagram accepted. Anything longer is truncated by the kernel and
/// rejected.
pub const RECV_BUF_LEN: usize = 2048;

/// Room for hop limit, packet info and timestamp control messages.
const CONTROL_BUF_LEN: usize = 256;

/// A zero read timeout means "block forever" to the socket layer, so waits
/// are never shorter than this.
pub const MIN_WAIT: Duration = Duration::from_millis(1);

/// One datagram as read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDatagram {
    /// The ICMPv6 message, starting at the type octet.
    pub payload: Vec<u8>,
    pub source: Ipv6Addr,
    /// Control messages delivered with the datagram.
    pub control: Vec<u8>,
    /// The datagram did not fit in the receive buffer.
    pub truncated: bool,
}

/// A router advertisement that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub source: Ipv6Addr,
    pub if_index: u32,
    pub advertisement: RouterAdvertisement,
    /// Kernel receive timestamp, when one was delivered.
    pub received_at: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Nothing arrived before the timeout elapsed.
    Timeout,
    Accepted(Accepted),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("source address {0} is not link-local")]
    NotLinkLocal(Ipv6Addr),

    #[error("malformed control data: {0}")]
    Ancillary(#[from] AncillaryError),

    #[error("no hop limit delivered")]
    MissingHopLimit,

    #[error("hop limit {0} is not 255, datagram was forwarded")]
    HopLimit(u8),

    #[error("no packet info delivered")]
    MissingPacketInfo,

    #[error("arrived on interface {got}, expected {expected}")]
    WrongInterface { expected: u32, got: u32 },

    #[error("datagram larger than {0} bytes")]
    Oversized(usize),

    #[error("bad checksum 0x{0:04x}")]
    Checksum(u16),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

impl Rejection {
    /// True for datagrams that are simply not router advertisements and are
    /// not worth reporting.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Parse(ParseError::WrongType(_)))
    }
}

/// Run the validation pipeline over a received datagram. When `interface` is
/// given only datagrams that arrived on that interface index are accepted.
pub fn validate(
    dgram: &RawDatagram,
    interface: Option<u32>,
) -> Result<Accepted, Rejection> {
    if !is_link_local(&dgram.source) {
        return Err(Rejection::NotLinkLocal(dgram.source));
    }

    let anc = Ancillary::decode(&dgram.control)?;

    let hop_limit = anc.hop_limit.ok_or(Rejection::MissingHopLimit)?;
    if hop_limit != Icmp6RouterAdvertisement::DEFAULT_HOPLIMIT {
        return Err(Rejection::HopLimit(hop_limit));
    }

    let (Some(destination), Some(if_index)) = (anc.destination, anc.if_index)
    else {
        return Err(Rejection::MissingPacketInfo);
    };
    if let Some(expected) = interface {
        if if_index != expected {
            return Err(Rejection::WrongInterface {
                expected,
                got: if_index,
            });
        }
    }

    if dgram.truncated {
        return Err(Rejection::Oversized(RECV_BUF_LEN));
    }

    let sum = compute_checksum(
        dgram.source,
        destination,
        ICMP6_NEXT_HDR,
        &dgram.payload,
    );
    if sum != 0 {
        return Err(Rejection::Checksum(sum));
    }

    let (advertisement, _) = parse(&dgram.payload)?;

    Ok(Accepted {
        source: dgram.source,
        if_index,
        advertisement,
        received_at: anc.timestamp,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error("set read timeout: {0}")]
    SetReadTimeout(io::Error),

    #[error("recvmsg: {0}")]
    Recv(io::Error),
}

/// Something that yields router advertisements, one wait at a time.
pub trait AdvertisementSource {
    /// Wait up to `timeout` for one datagram and validate it.
    fn receive_one(&self, timeout: Duration) -> Result<Received, RecvError>;
}

/// Listens for router advertisements on a raw ICMPv6 socket.
pub struct Listener {
    sock: Socket,
    interface: Option<u32>,
    log: Logger,
}

impl Listener {
    /// Listen on a socket from [`crate::util::create_socket`]. With an
    /// interface index, advertisements arriving on any other interface are
    /// rejected.
    pub fn new(sock: Socket, interface: Option<u32>, log: Logger) -> Self {
        let ifx = interface.map_or_else(|| "all".into(), |i| i.to_string());
        ndp_log!(log, info, MOD_LISTENER, "listening for router advertisements";
            "interface" => ifx
        );
        Self {
            sock,
            interface,
            log,
        }
    }

    /// Read one datagram along with its control data, waiting at most
    /// `timeout`. Returns `None` if the wait ended without a datagram.
    pub fn recv(
        &self,
        timeout: Duration,
    ) -> Result<Option<RawDatagram>, RecvError> {
        self.sock
            .set_read_timeout(Some(timeout.max(MIN_WAIT)))
            .map_err(RecvError::SetReadTimeout)?;

        let mut payload = vec![0u8; RECV_BUF_LEN];
        // cmsghdr requires size_t alignment.
        let mut control = [0usize; CONTROL_BUF_LEN / size_of::<usize>()];
        let mut addr: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };

        let mut iov = libc::iovec {
            iov_base: payload.as_mut_ptr().cast::<c_void>(),
            iov_len: payload.len(),
        };
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_name = (&mut addr as *mut libc::sockaddr_in6).cast::<c_void>();
        msg.msg_namelen = size_of::<libc::sockaddr_in6>() as socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast::<c_void>();
        msg.msg_controllen = size_of_val(&control) as _;

        let n = unsafe { libc::recvmsg(self.sock.as_raw_fd(), &mut msg, 0) };
        if n < 0 {
            let e = io::Error::last_os_error();
            return match e.kind() {
                io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(RecvError::Recv(e)),
            };
        }

        if msg.msg_flags & libc::MSG_CTRUNC != 0 {
            ndp_log!(self.log, warn, MOD_LISTENER, "control data truncated");
        }

        let len = (msg.msg_controllen as usize).min(size_of_val(&control));
        let control = unsafe {
            std::slice::from_raw_parts(control.as_ptr().cast::<u8>(), len)
        }
        .to_vec();
        payload.truncate(n as usize);

        Ok(Some(RawDatagram {
            payload,
            source: Ipv6Addr::from(addr.sin6_addr.s6_addr),
            control,
            truncated: msg.msg_flags & libc::MSG_TRUNC != 0,
        }))
    }

    fn log_rejection(&self, source: Ipv6Addr, r: &Rejection) {
        let src = format!("{source}");
        match r {
            r if r.is_silent() => {
                ndp_log!(self.log, debug, MOD_LISTENER, "ignored: {}", r;
                    "source" => src
                );
            }
            Rejection::NotLinkLocal(_) => {
                ndp_log!(self.log, info, MOD_LISTENER, "rejected: {}", r;
                    "source" => src
                );
            }
            _ => {
                ndp_log!(self.log, warn, MOD_LISTENER, "rejected: {}", r;
                    "source" => src
                );
            }
        }
    }
}

impl AdvertisementSource for Listener {
    fn receive_one(&self, timeout: Duration) -> Result<Received, RecvError> {
        let Some(dgram) = self.recv(timeout)? else {
            return Ok(Received::Timeout);
        };

        match validate(&dgram, self.interface) {
            Ok(a) => {
                ndp_log!(self.log, debug, MOD_LISTENER, "router advertisement";
                    "source" => format!("{}", a.source),
                    "if_index" => a.if_index,
                    "lifetime" => a.advertisement.lifetime().as_secs(),
                    "managed" => a.advertisement.header.managed(),
                    "other_config" => a.advertisement.header.other_config(),
                    "mtu" => a.advertisement.mtu,
                    "options" => a.advertisement.option_count,
                    "received_at" => a.received_at.map(|t| format!("{t:?}"))
                );
                Ok(Received::Accepted(a))
            }
            Err(r) => {
                self.log_rejection(dgram.source, &r);
                Ok(Received::Rejected(r))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ancillary::test::{control, encode, pktinfo};
    use crate::test::{ra_payload, ROUTER};
    use crate::util::ALL_NODES_MCAST;
    use pretty_assertions::assert_eq;

    fn dgram(source: Ipv6Addr, hop_limit: i32, if_index: u32) -> RawDatagram {
        RawDatagram {
            payload: ra_payload(source, ALL_NODES_MCAST, 1800),
            source,
            control: control(hop_limit, ALL_NODES_MCAST, if_index),
            truncated: false,
        }
    }

    #[test]
    fn accepts_valid_advertisement() {
        let a = validate(&dgram(ROUTER, 255, 2), None).expect("valid");
        assert_eq!(a.source, ROUTER);
        assert_eq!(a.if_index, 2);
        assert_eq!(a.advertisement.lifetime(), Duration::from_secs(1800));
        assert_eq!(a.received_at, None);
    }

    #[test]
    fn accepts_on_configured_interface() {
        assert!(validate(&dgram(ROUTER, 255, 2), Some(2)).is_ok());
    }

    #[test]
    fn rejects_global_source() {
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert_eq!(
            validate(&dgram(src, 255, 2), None),
            Err(Rejection::NotLinkLocal(src))
        );
    }

    #[test]
    fn rejects_forwarded() {
        assert_eq!(
            validate(&dgram(ROUTER, 64, 2), None),
            Err(Rejection::HopLimit(64))
        );
        assert_eq!(
            validate(&dgram(ROUTER, 254, 2), None),
            Err(Rejection::HopLimit(254))
        );
    }

    #[test]
    fn rejects_missing_metadata() {
        let mut d = dgram(ROUTER, 255, 2);
        d.control = encode(&[(
            libc::IPPROTO_IPV6,
            libc::IPV6_PKTINFO,
            &pktinfo(ALL_NODES_MCAST, 2)[..],
        )]);
        assert_eq!(validate(&d, None), Err(Rejection::MissingHopLimit));

        d.control = encode(&[(
            libc::IPPROTO_IPV6,
            libc::IPV6_HOPLIMIT,
            &255i32.to_ne_bytes()[..],
        )]);
        assert_eq!(validate(&d, None), Err(Rejection::MissingPacketInfo));

        d.control = Vec::new();
        assert_eq!(validate(&d, None), Err(Rejection::MissingHopLimit));
    }

    #[test]
    fn rejects_wrong_interface() {
        assert_eq!(
            validate(&dgram(ROUTER, 255, 3), Some(2)),
            Err(Rejection::WrongInterface {
                expected: 2,
                got: 3
            })
        );
    }

    #[test]
    fn rejects_truncated_datagram() {
        let mut d = dgram(ROUTER, 255, 2);
        d.truncated = true;
        assert_eq!(validate(&d, None), Err(Rejection::Oversized(RECV_BUF_LEN)));
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut d = dgram(ROUTER, 255, 2);
        d.payload[7] ^= 0x01;
        assert!(matches!(validate(&d, None), Err(Rejection::Checksum(_))));

        // Checksummed against a different destination.
        let mut d = dgram(ROUTER, 255, 2);
        d.control = control(255, Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2), 2);
        assert!(matches!(validate(&d, None), Err(Rejection::Checksum(_))));
    }

    #[test]
    fn rejects_malformed_advertisement() {
        let mut d = dgram(ROUTER, 255, 2);
        d.payload[1] = 1;
        crate::checksum::fill_checksum(ROUTER, ALL_NODES_MCAST, &mut d.payload);
        assert_eq!(
            validate(&d, None),
            Err(Rejection::Parse(ParseError::NonzeroCode(1)))
        );
    }

    #[test]
    fn wrong_type_is_silent() {
        let mut d = dgram(ROUTER, 255, 2);
        d.payload[0] = 135;
        crate::checksum::fill_checksum(ROUTER, ALL_NODES_MCAST, &mut d.payload);
        let r = validate(&d, None).expect_err("wrong type");
        assert_eq!(r, Rejection::Parse(ParseError::WrongType(135)));
        assert!(r.is_silent());
        assert!(!Rejection::HopLimit(1).is_silent());
    }

    #[test]
    fn link_local_check_comes_first() {
        // Fails every check, only the first is reported.
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let d = RawDatagram {
            payload: vec![0; 3],
            source: src,
            control: Vec::new(),
            truncated: true,
        };
        assert_eq!(validate(&d, Some(1)), Err(Rejection::NotLinkLocal(src)));
    }
}
