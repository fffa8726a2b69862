/*
 * Created on Fri May 16 2025
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
    crate::{config::BGSave, corestore::Corestore, dbnet::Terminator},
    tokio::time::{self, Duration},
};

/// The bgsave_scheduler wakes up every `every` seconds and writes a
/// snapshot. If BGSAVE is disabled it waits out the terminator and leaves
pub async fn bgsave_scheduler(handle: Corestore, bgsave_cfg: BGSave, mut terminator: Terminator) {
    match bgsave_cfg {
        BGSave::Enabled(duration) => {
            // If we're here - the user doesn't trust his power supply or just values
            // his data - which is good! So we'll turn this into a `Duration`
            let duration = Duration::from_secs(duration);
            loop {
                tokio::select! {
                    // sleep until `duration` from the current time instant
                    _ = time::sleep_until(time::Instant::now() + duration) => {
                        let cloned_handle = handle.clone();
                        // we spawn this off the async workers because it does
                        // a good amount of disk I/O
                        tokio::task::spawn_blocking(move || {
                            let owned_handle = cloned_handle;
                            let _ = bgsave_blocking_section(owned_handle);
                        }).await.expect("Something caused the background service to panic");
                    }
                    // otherwise wait for a notification
                    _ = terminator.receive_signal() => {
                        // we got a notification to quit; so break out
                        break;
                    }
                }
            }
        }
        BGSave::Disabled => {
            // the user doesn't bother about his data; cool, let's not bother about it either
        }
    }
    log::info!("BGSAVE service has exited");
}

/// This wraps around the actual save and prints nice log messages
/// depending on the outcome
fn bgsave_blocking_section(handle: Corestore) -> bool {
    match handle.save_to_disk() {
        Ok(()) => {
            log::info!("BGSAVE completed successfully");
            true
        }
        Err(e) => {
            log::error!("BGSAVE failed with error: {}", e);
            false
        }
    }
}
