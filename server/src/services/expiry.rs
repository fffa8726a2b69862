/*
 * Created on Sun May 18 2025
 *
 * This file is a part of Photon
 * Photon is a free and open-source in-memory key/value database with
 * Redis-style semantics written by Sayan Nandan ("the Author") with the
 * vision to provide a small, fast and predictable data layer without
 * compromising on correctness.
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    crate::{corestore::Corestore, dbnet::Terminator, util::monotonic_ms},
    tokio::time::{self, Duration},
};

/// The TTL sweeper: sleeps until the soonest deadline in the timer heap,
/// then deletes whatever is due (bounded per sweep). `PEXPIRE` rings the
/// engine's TTL bell whenever it may have installed a nearer deadline, so
/// the sleep never overshoots
pub async fn ttl_scheduler(handle: Corestore, mut terminator: Terminator) {
    loop {
        let deadline = handle.keyspace().next_deadline();
        match deadline {
            None => {
                // nothing to expire; wait for a TTL to appear
                tokio::select! {
                    _ = handle.ttl_wakeup().notified() => {}
                    _ = terminator.receive_signal() => break,
                }
            }
            Some(at) => {
                let now = monotonic_ms();
                if at >= now {
                    // a key expires only once its deadline is strictly in
                    // the past, so sleep one tick beyond it
                    tokio::select! {
                        _ = time::sleep(Duration::from_millis(at - now + 1)) => {}
                        _ = handle.ttl_wakeup().notified() => {}
                        _ = terminator.receive_signal() => break,
                    }
                    // whatever woke us, the deadline is recomputed on the
                    // next pass
                    continue;
                }
                let expired = handle.keyspace().expire_due(now, handle.pool());
                if expired > 0 {
                    log::debug!("expired {} keys", expired);
                }
                // budget exhausted? the loop sees the stale deadline and
                // sweeps again immediately
            }
        }
    }
    log::info!("TTL service has exited");
}
