// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2026 Oxide Computer Company

//! The router discovery loop.
//!
//! Each iteration waits for at most the time until the next router expires,
//! handles at most one advertisement, and then sweeps the router table. The
//! sweep runs on every wake so a steady stream of advertisements can not hold
//! off expiry.

use crate::gateway::Gateway;
use crate::listener::{AdvertisementSource, Received, MIN_WAIT};
use crate::log::ndp_log;
use crate::table::{RouterTable, Upsert};
use crate::MOD_DISCOVERY;
use slog::Logger;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Longest pause after a failed receive before trying again.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Why a discovery step woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Timeout,
    Accepted(Upsert),
    Rejected,
    Error,
}

/// The outcome of one discovery step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub wake: Wake,
    /// Routers removed by the sweep.
    pub expired: usize,
}

/// Run one iteration of the discovery loop.
pub fn step<S, G>(source: &S, table: &mut RouterTable<G>, log: &Logger) -> Step
where
    S: AdvertisementSource,
    G: Gateway,
{
    let timeout = table.next_deadline(Instant::now());

    let wake = match source.receive_one(timeout) {
        Ok(Received::Timeout) => Wake::Timeout,
        Ok(Received::Accepted(a)) => {
            let u = table.upsert(
                a.source,
                a.if_index,
                a.advertisement.lifetime(),
                Instant::now(),
            );
            Wake::Accepted(u)
        }
        Ok(Received::Rejected(_)) => Wake::Rejected,
        Err(e) => {
            ndp_log!(log, error, MOD_DISCOVERY, "receive: {}", e);
            // Never sleep past the next expiry, never spin on a dead socket.
            sleep(ERROR_BACKOFF.min(timeout).max(MIN_WAIT));
            Wake::Error
        }
    };

    let now = Instant::now();
    let expired = table.sweep(now);
    table.log_routers(now);

    Step { wake, expired }
}

/// Run the discovery loop forever.
pub fn run<S, G>(source: &S, table: &mut RouterTable<G>, log: &Logger) -> !
where
    S: AdvertisementSource,
    G: Gateway,
{
    ndp_log!(log, info, MOD_DISCOVERY, "starting router discovery");
    loop {
        step(source, table, log);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::listener::{Accepted, RecvError, Rejection};
    use crate::packet::parse;
    use crate::table::DEFAULT_WAIT;
    use crate::test::{ra_payload, test_logger, RecordingGateway, ROUTER};
    use crate::util::ALL_NODES_MCAST;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;

    /// Hands out a fixed sequence of receive results, recording the timeout
    /// each call was given.
    #[derive(Default)]
    struct ScriptedSource {
        script: RefCell<VecDeque<Result<Received, RecvError>>>,
        timeouts: RefCell<Vec<Duration>>,
    }

    impl ScriptedSource {
        fn push(&self, r: Result<Received, RecvError>) {
            self.script.borrow_mut().push_back(r);
        }
    }

    impl AdvertisementSource for ScriptedSource {
        fn receive_one(
            &self,
            timeout: Duration,
        ) -> Result<Received, RecvError> {
            self.timeouts.borrow_mut().push(timeout);
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(Received::Timeout))
        }
    }

    fn accepted(lifetime: u16) -> Received {
        let (advertisement, _) =
            parse(&ra_payload(ROUTER, ALL_NODES_MCAST, lifetime)).unwrap();
        Received::Accepted(Accepted {
            source: ROUTER,
            if_index: 2,
            advertisement,
            received_at: None,
        })
    }

    #[test]
    fn idle_loop_waits_default() {
        let log = test_logger();
        let src = ScriptedSource::default();
        let mut table =
            RouterTable::new(RecordingGateway::default(), log.clone());

        let s = step(&src, &mut table, &log);
        assert_eq!(
            s,
            Step {
                wake: Wake::Timeout,
                expired: 0
            }
        );
        assert_eq!(src.timeouts.borrow().as_slice(), &[DEFAULT_WAIT]);
    }

    #[test]
    fn accepted_advertisement_reaches_table() {
        let log = test_logger();
        let src = ScriptedSource::default();
        src.push(Ok(accepted(1800)));
        src.push(Ok(accepted(1800)));
        let mut table =
            RouterTable::new(RecordingGateway::default(), log.clone());

        assert_eq!(
            step(&src, &mut table, &log).wake,
            Wake::Accepted(Upsert::Added)
        );
        assert_eq!(
            step(&src, &mut table, &log).wake,
            Wake::Accepted(Upsert::Updated)
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.gateway().installed(), vec![(ROUTER, 2)]);

        // The wait now tracks the router's expiry rather than the default.
        step(&src, &mut table, &log);
        let last = *src.timeouts.borrow().last().unwrap();
        assert!(last <= Duration::from_secs(1800));
        assert!(last > Duration::from_secs(1790));
    }

    #[test]
    fn zero_lifetime_withdraws_route() {
        let log = test_logger();
        let src = ScriptedSource::default();
        src.push(Ok(accepted(1800)));
        src.push(Ok(accepted(0)));
        let mut table =
            RouterTable::new(RecordingGateway::default(), log.clone());

        assert_eq!(step(&src, &mut table, &log).expired, 0);
        let s = step(&src, &mut table, &log);
        assert_eq!(s.wake, Wake::Accepted(Upsert::Updated));

        // Expired by the sweep of this step or, if the clock did not move,
        // by the next one without waiting.
        std::thread::sleep(Duration::from_millis(2));
        let t = step(&src, &mut table, &log);
        assert_eq!(s.expired + t.expired, 1);
        assert!(table.is_empty());
        assert_eq!(table.gateway().removed(), vec![(ROUTER, 2)]);
    }

    #[test]
    fn rejections_and_errors_keep_the_table() {
        let log = test_logger();
        let src = ScriptedSource::default();
        src.push(Ok(accepted(1800)));
        src.push(Ok(Received::Rejected(Rejection::HopLimit(64))));
        src.push(Err(RecvError::Recv(io::Error::from(
            io::ErrorKind::ConnectionReset,
        ))));
        let mut table =
            RouterTable::new(RecordingGateway::default(), log.clone());

        step(&src, &mut table, &log);
        let s = step(&src, &mut table, &log);
        assert_eq!(
            s,
            Step {
                wake: Wake::Rejected,
                expired: 0
            }
        );

        let s = step(&src, &mut table, &log);
        assert_eq!(
            s,
            Step {
                wake: Wake::Error,
                expired: 0
            }
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.gateway().installed(), vec![(ROUTER, 2)]);
        assert!(table.gateway().removed().is_empty());
    }

    /// A source whose socket has gone bad.
    struct FailingSource;

    impl AdvertisementSource for FailingSource {
        fn receive_one(
            &self,
            _timeout: Duration,
        ) -> Result<Received, RecvError> {
            Err(RecvError::Recv(io::Error::from_raw_os_error(libc::EBADF)))
        }
    }

    #[test]
    fn persistent_errors_are_paced() {
        let log = test_logger();
        let mut table =
            RouterTable::new(RecordingGateway::default(), log.clone());
        table.upsert(ROUTER, 2, Duration::from_millis(50), Instant::now());

        let start = Instant::now();
        let s = step(&FailingSource, &mut table, &log);
        let elapsed = start.elapsed();

        assert_eq!(s.wake, Wake::Error);
        // Waited for the router's expiry, which is sooner than the backoff.
        assert!(elapsed >= Duration::from_millis(30), "{elapsed:?}");
        assert!(elapsed < ERROR_BACKOFF, "{elapsed:?}");
    }

    #[test]
    fn errors_with_overdue_router_still_pause() {
        let log = test_logger();
        let mut table =
            RouterTable::new(RecordingGateway::default(), log.clone());
        table.upsert(ROUTER, 2, Duration::ZERO, Instant::now());

        let start = Instant::now();
        let s = step(&FailingSource, &mut table, &log);

        assert!(start.elapsed() >= MIN_WAIT);
        assert_eq!(s.expired, 1);
        assert!(table.is_empty());
    }
}
