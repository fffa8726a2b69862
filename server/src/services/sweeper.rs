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
    crate::{dbnet::IdleTracker, dbnet::Terminator, util::monotonic_ms},
    std::sync::Arc,
    tokio::time::{self, Duration},
};

/// The idle sweeper: sleeps until the longest-idle connection's deadline
/// and kicks everything that idled past the timeout. Activity only ever
/// pushes deadlines later, so sleeping on a stale head deadline is safe:
/// the wake-up simply re-checks and goes back to sleep
pub async fn idle_sweeper(tracker: Arc<IdleTracker>, mut terminator: Terminator) {
    loop {
        match tracker.oldest_deadline() {
            None => {
                // no connections; wait for one to register
                tokio::select! {
                    _ = tracker.wakeup.notified() => {}
                    _ = terminator.receive_signal() => break,
                }
            }
            Some(at) => {
                let now = monotonic_ms();
                if at > now {
                    tokio::select! {
                        _ = time::sleep(Duration::from_millis(at - now)) => {}
                        _ = terminator.receive_signal() => break,
                    }
                }
                let kicked = tracker.kick_due(monotonic_ms());
                if kicked > 0 {
                    log::debug!("kicked {} idle connections", kicked);
                }
            }
        }
    }
    log::info!("Idle sweeper has exited");
}
