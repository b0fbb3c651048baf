// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! The set of routers currently advertising themselves as default routers.
//!
//! Each router is keyed by the link-local address it advertised from and the
//! interface the advertisement arrived on. The first advertisement from a key
//! installs a default route through it, and the route is withdrawn when the
//! advertised lifetime runs out without being refreshed.

use crate::gateway::Gateway;
use crate::log::ndp_log;
use crate::MOD_TABLE;
use slog::Logger;
use std::collections::btree_map::{BTreeMap, Entry};
use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

/// How long to wait for advertisements when no routers are known.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouterKey {
    pub address: Ipv6Addr,
    pub if_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterEntry {
    /// The router is no longer valid once this instant has passed.
    pub valid_until: Instant,
    /// When the first advertisement from this router was processed.
    pub first_seen: Instant,
    /// When the most recent advertisement from this router was processed.
    pub last_seen: Instant,
    /// Lifetime carried by the most recent advertisement.
    pub lifetime: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
}

pub struct RouterTable<G> {
    routers: BTreeMap<RouterKey, RouterEntry>,
    gateway: G,
    log: Logger,
}

impl<G: Gateway> RouterTable<G> {
    pub fn new(gateway: G, log: Logger) -> Self {
        Self {
            routers: BTreeMap::new(),
            gateway,
            log,
        }
    }

    /// Record an advertisement from `address` on `if_index`, valid for
    /// `lifetime` starting at `now`. A router not already in the table has a
    /// default route installed through it.
    ///
    /// A lifetime of zero is not special: the entry becomes valid until `now`
    /// and is expired by the next sweep that runs after `now`.
    pub fn upsert(
        &mut self,
        address: Ipv6Addr,
        if_index: u32,
        lifetime: Duration,
        now: Instant,
    ) -> Upsert {
        let key = RouterKey { address, if_index };
        let valid_until = now + lifetime;

        match self.routers.entry(key) {
            Entry::Occupied(mut e) => {
                let r = e.get_mut();
                r.valid_until = valid_until;
                r.last_seen = now;
                r.lifetime = lifetime;
                ndp_log!(self.log, debug, MOD_TABLE, "router refreshed";
                    "router" => format!("{address}"),
                    "if_index" => if_index,
                    "lifetime" => lifetime.as_secs()
                );
                Upsert::Updated
            }
            Entry::Vacant(e) => {
                e.insert(RouterEntry {
                    valid_until,
                    first_seen: now,
                    last_seen: now,
                    lifetime,
                });
                ndp_log!(self.log, info, MOD_TABLE, "router added";
                    "router" => format!("{address}"),
                    "if_index" => if_index,
                    "lifetime" => lifetime.as_secs()
                );
                if let Err(e) =
                    self.gateway.install_default_route(address, if_index)
                {
                    ndp_log!(self.log, error, MOD_TABLE,
                        "install default route: {}", e;
                        "router" => format!("{address}"),
                        "if_index" => if_index
                    );
                }
                Upsert::Added
            }
        }
    }

    /// Remove every router whose validity ended before `now`, withdrawing the
    /// default route through each. Returns the number of routers removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.routers.len();
        let gateway = &self.gateway;
        let log = &self.log;

        self.routers.retain(|key, r| {
            if r.valid_until >= now {
                return true;
            }
            ndp_log!(log, info, MOD_TABLE, "router expired";
                "router" => format!("{}", key.address),
                "if_index" => key.if_index
            );
            if let Err(e) =
                gateway.remove_default_route(key.address, key.if_index)
            {
                ndp_log!(log, error, MOD_TABLE,
                    "remove default route: {}", e;
                    "router" => format!("{}", key.address),
                    "if_index" => key.if_index
                );
            }
            false
        });

        before - self.routers.len()
    }

    /// How long until the earliest router expires, or [`DEFAULT_WAIT`] when
    /// the table is empty. Routers already past due yield zero.
    pub fn next_deadline(&self, now: Instant) -> Duration {
        self.routers
            .values()
            .map(|r| r.valid_until)
            .min()
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or(DEFAULT_WAIT)
    }

    #[cfg(test)]
    pub(crate) fn get(
        &self,
        address: Ipv6Addr,
        if_index: u32,
    ) -> Option<&RouterEntry> {
        self.routers.get(&RouterKey { address, if_index })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RouterKey, &RouterEntry)> {
        self.routers.iter()
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Dump the table at debug level.
    pub fn log_routers(&self, now: Instant) {
        ndp_log!(self.log, debug, MOD_TABLE, "routers";
            "count" => self.len()
        );
        for (key, r) in self.iter() {
            let expires_in = r.valid_until.saturating_duration_since(now);
            let up_for = now.saturating_duration_since(r.first_seen);
            ndp_log!(self.log, debug, MOD_TABLE, "router";
                "router" => format!("{}", key.address),
                "if_index" => key.if_index,
                "expires_in" => expires_in.as_secs(),
                "up_for" => up_for.as_secs()
            );
        }
    }
}
