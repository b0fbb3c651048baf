// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Router advertisement wire format.

use num_enum::TryFromPrimitive;
use std::time::Duration;

/// ICMP6 router advertisement
///
///   0                   1                   2                   3
///   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |     Type      |     Code      |          Checksum             |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  | Cur Hop Limit |M|O|  Reserved |       Router Lifetime         |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                         Reachable Time                        |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                          Retrans Timer                        |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |   Options ...
///  +-+-+-+-+-+-+-+-+-+-+-+-+-
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmp6RouterAdvertisement {
    pub typ: u8,
    pub code: u8,
    pub checksum: u16,
    pub hop_limit: u8,
    pub flags: u8,
    /// Seconds this router may be used as a default router. Zero means it is
    /// not a default router.
    pub lifetime: u16,
    /// Milliseconds, informational.
    pub reachable_time: u32,
    /// Milliseconds, informational.
    pub retrans_timer: u32,
}

impl Icmp6RouterAdvertisement {
    pub const TYPE: u8 = 134;
    pub const CODE: u8 = 0;
    pub const DEFAULT_HOPLIMIT: u8 = 255;

    /// Size of the fixed portion of the message, options follow.
    pub const LEN: usize = 16;

    const MANAGED: u8 = 1 << 7;
    const OTHER: u8 = 1 << 6;

    /// Decode the fixed header, checking type and code.
    pub fn from_wire(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < Self::LEN {
            return Err(ParseError::Truncated(buf.len()));
        }
        if buf[0] != Self::TYPE {
            return Err(ParseError::WrongType(buf[0]));
        }
        if buf[1] != Self::CODE {
            return Err(ParseError::NonzeroCode(buf[1]));
        }
        Ok(Self {
            typ: buf[0],
            code: buf[1],
            checksum: u16::from_be_bytes([buf[2], buf[3]]),
            hop_limit: buf[4],
            flags: buf[5],
            lifetime: u16::from_be_bytes([buf[6], buf[7]]),
            reachable_time: u32::from_be_bytes([
                buf[8], buf[9], buf[10], buf[11],
            ]),
            retrans_timer: u32::from_be_bytes([
                buf[12], buf[13], buf[14], buf[15],
            ]),
        })
    }

    #[cfg(test)]
    pub(crate) fn to_wire(&self) -> Vec<u8> {
        let mut v = vec![self.typ, self.code];
        v.extend_from_slice(&self.checksum.to_be_bytes());
        v.push(self.hop_limit);
        v.push(self.flags);
        v.extend_from_slice(&self.lifetime.to_be_bytes());
        v.extend_from_slice(&self.reachable_time.to_be_bytes());
        v.extend_from_slice(&self.retrans_timer.to_be_bytes());
        v
    }

    pub fn managed(&self) -> bool {
        self.flags & Self::MANAGED != 0
    }

    pub fn other_config(&self) -> bool {
        self.flags & Self::OTHER != 0
    }
}

impl Default for Icmp6RouterAdvertisement {
    fn default() -> Self {
        Self {
            typ: Self::TYPE,
            code: Self::CODE,
            checksum: 0,
            hop_limit: Self::DEFAULT_HOPLIMIT,
            flags: 0,
            lifetime: 0, //indicates this is not a default router
            reachable_time: 0,
            retrans_timer: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("truncated: {0} bytes is shorter than a router advertisement")]
    Truncated(usize),

    #[error(
        "wrong type: expected {}, got {0}",
        Icmp6RouterAdvertisement::TYPE
    )]
    WrongType(u8),

    #[error("nonzero code: {0}")]
    NonzeroCode(u8),

    #[error("zero length option at offset {0}")]
    ZeroLengthOption(usize),

    #[error(
        "truncated option at offset {offset}: \
         declared {declared} bytes, {remaining} remaining"
    )]
    TruncatedOption {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

/// Neighbor discovery option types this daemon knows by name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum NdOptionType {
    SourceLinkLayerAddress = 1,
    TargetLinkLayerAddress = 2,
    PrefixInformation = 3,
    RedirectedHeader = 4,
    Mtu = 5,
    RouteInformation = 24,
    RecursiveDnsServer = 25,
    DnsSearchList = 31,
}

/// Neighbor discovery option
///
///   0                   1                   2                   3
///   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |     Type      |    Length     |              ...              |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  ~                              ...                              ~
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///
/// Length is in units of 8 octets and includes the type and length fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdOption<'a> {
    pub typ: u8,
    /// Option body following the type and length octets.
    pub body: &'a [u8],
}

impl NdOption<'_> {
    pub const HDR_LEN: usize = 2;
    pub const UNIT: usize = 8;

    pub fn kind(&self) -> Option<NdOptionType> {
        NdOptionType::try_from(self.typ).ok()
    }
}

/// Walks the option list of a router advertisement. Yields an error and then
/// stops at the first malformed option.
#[derive(Debug, Clone)]
pub struct NdOptions<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> NdOptions<'a> {
    /// Walk the options in `buf`, where `buf` is the whole ICMPv6 message and
    /// `offset` is where the options begin.
    pub fn new(buf: &'a [u8], offset: usize) -> Self {
        Self {
            buf,
            offset,
            failed: false,
        }
    }

    /// Offset just past the last option consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for NdOptions<'a> {
    type Item = Result<NdOption<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let remaining = self.buf.len().saturating_sub(self.offset);
        if remaining < NdOption::HDR_LEN {
            return None;
        }
        let typ = self.buf[self.offset];
        let declared = usize::from(self.buf[self.offset + 1]) * NdOption::UNIT;
        if declared == 0 {
            self.failed = true;
            return Some(Err(ParseError::ZeroLengthOption(self.offset)));
        }
        if declared > remaining {
            self.failed = true;
            return Some(Err(ParseError::TruncatedOption {
                offset: self.offset,
                declared,
                remaining,
            }));
        }
        let start = self.offset;
        self.offset += declared;
        Some(Ok(NdOption {
            typ,
            body: &self.buf[start + NdOption::HDR_LEN..self.offset],
        }))
    }
}

/// A validated router advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAdvertisement {
    pub header: Icmp6RouterAdvertisement,
    /// Advertised link MTU, if an MTU option was present.
    pub mtu: Option<u32>,
    /// Source link-layer address, if present.
    pub source_link_layer: Option<Vec<u8>>,
    /// Number of options present, including unrecognized ones.
    pub option_count: usize,
}

impl RouterAdvertisement {
    /// How long the sender may be used as a default router.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.header.lifetime.into())
    }

    pub fn is_default_router(&self) -> bool {
        self.header.lifetime != 0
    }

    pub fn reachable_time(&self) -> Duration {
        Duration::from_millis(self.header.reachable_time.into())
    }

    pub fn retrans_timer(&self) -> Duration {
        Duration::from_millis(self.header.retrans_timer.into())
    }
}

/// Parse an ICMPv6 payload as a router advertisement. On success the number
/// of bytes consumed is returned alongside the advertisement, and always
/// equals `buf.len()`.
pub fn parse(buf: &[u8]) -> Result<(RouterAdvertisement, usize), ParseError> {
    let header = Icmp6RouterAdvertisement::from_wire(buf)?;

    let mut mtu = None;
    let mut source_link_layer = None;
    let mut option_count = 0;

    let mut options = NdOptions::new(buf, Icmp6RouterAdvertisement::LEN);
    for opt in options.by_ref() {
        let opt = opt?;
        option_count += 1;
        match opt.kind() {
            // reserved(2) + mtu(4)
            Some(NdOptionType::Mtu) if opt.body.len() >= 6 => {
                mtu = Some(u32::from_be_bytes([
                    opt.body[2],
                    opt.body[3],
                    opt.body[4],
                    opt.body[5],
                ]));
            }
            Some(NdOptionType::SourceLinkLayerAddress) => {
                source_link_layer = Some(opt.body.to_vec());
            }
            _ => {}
        }
    }

    let consumed = options.offset();
    if consumed != buf.len() {
        return Err(ParseError::TrailingBytes(buf.len() - consumed));
    }

    Ok((
        RouterAdvertisement {
            header,
            mtu,
            source_link_layer,
            option_count,
        },
        consumed,
    ))
}
