// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! IPv6 router discovery.
//!
//! Listens for router advertisements, keeps a table of the routers that are
//! currently advertising themselves as default routers, and installs or
//! removes default routes as routers come and go.

pub mod ancillary;
pub mod checksum;
pub mod discovery;
pub mod gateway;
pub mod listener;
pub mod log;
pub mod packet;
pub mod table;
pub mod util;


pub use discovery::{run, step};
pub use gateway::{DryRunGateway, Gateway, GatewayError, IpRouteGateway};
pub use listener::{AdvertisementSource, Listener};
pub use table::RouterTable;

pub const COMPONENT_NDP: &str = "ndp";
pub const MOD_LISTENER: &str = "listener";
pub const MOD_TABLE: &str = "table";
pub const MOD_GATEWAY: &str = "gateway";
pub const MOD_DISCOVERY: &str = "discovery";
