// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! Installation and removal of the host's IPv6 default route.
//!
//! The router table calls into a [`Gateway`] when a router first appears and
//! when it expires. Failures are reported back so they can be logged, but
//! they never affect router table state.

use crate::log::ndp_log;
use crate::util::interface_name;
use crate::MOD_GATEWAY;
use slog::Logger;
use std::io;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

pub const DEFAULT_IP_COMMAND: &str = "/sbin/ip";

pub trait Gateway {
    fn install_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError>;

    fn remove_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError>;
}

impl<G: Gateway + ?Sized> Gateway for Box<G> {
    fn install_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError> {
        (**self).install_default_route(addr, if_index)
    }

    fn remove_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError> {
        (**self).remove_default_route(addr, if_index)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no name for interface index {0}: {1}")]
    InterfaceName(u32, io::Error),

    #[error("failed to run {cmd}: {err}")]
    Spawn { cmd: String, err: io::Error },

    #[error("{cmd} returned {status}: {stderr}")]
    Command {
        cmd: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Manages the default route with iproute2, e.g.
///
/// ```text
/// ip -6 route add ::/0 via fe80::1 dev eth0
/// ```
#[derive(Debug, Clone)]
pub struct IpRouteGateway {
    ip: PathBuf,
    log: Logger,
}

impl IpRouteGateway {
    pub fn new(ip: impl Into<PathBuf>, log: Logger) -> Self {
        Self { ip: ip.into(), log }
    }

    fn route(
        &self,
        op: &str,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError> {
        let ifname = interface_name(if_index)
            .map_err(|e| GatewayError::InterfaceName(if_index, e))?;
        let via = addr.to_string();

        let mut cmd = Command::new(&self.ip);
        cmd.args(["-6", "route", op, "::/0", "via", &via, "dev", &ifname]);
        let display = format!(
            "{} -6 route {op} ::/0 via {via} dev {ifname}",
            self.ip.display()
        );

        ndp_log!(self.log, debug, MOD_GATEWAY, "running {}", display);

        let out = cmd.output().map_err(|err| GatewayError::Spawn {
            cmd: display.clone(),
            err,
        })?;
        if !out.status.success() {
            return Err(GatewayError::Command {
                cmd: display,
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

impl Gateway for IpRouteGateway {
    fn install_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError> {
        ndp_log!(self.log, info, MOD_GATEWAY,
            "adding default route via {}", addr;
            "if_index" => if_index
        );
        self.route("add", addr, if_index)
    }

    fn remove_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError> {
        ndp_log!(self.log, info, MOD_GATEWAY,
            "removing default route via {}", addr;
            "if_index" => if_index
        );
        self.route("del", addr, if_index)
    }
}

/// Logs route changes without making them.
#[derive(Debug, Clone)]
pub struct DryRunGateway {
    log: Logger,
}

impl DryRunGateway {
    pub fn new(log: Logger) -> Self {
        Self { log }
    }
}

impl Gateway for DryRunGateway {
    fn install_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError> {
        ndp_log!(self.log, info, MOD_GATEWAY,
            "dry run: add default route via {}", addr;
            "if_index" => if_index
        );
        Ok(())
    }

    fn remove_default_route(
        &self,
        addr: Ipv6Addr,
        if_index: u32,
    ) -> Result<(), GatewayError> {
        ndp_log!(self.log, info, MOD_GATEWAY,
            "dry run: remove default route via {}", addr;
            "if_index" => if_index
        );
        Ok(())
    }
}
