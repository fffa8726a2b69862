/*
 * Created on Sun Feb 02 2025
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

pub mod compiler;
pub mod error;

use std::time::Instant;

lazy_static::lazy_static! {
    /// Process-wide monotonic epoch. All timers (TTLs, idle deadlines) are
    /// expressed as milliseconds relative to this instant
    static ref MONOTONIC_EPOCH: Instant = Instant::now();
}

/// Milliseconds elapsed on the process-wide monotonic clock
pub fn monotonic_ms() -> u64 {
    MONOTONIC_EPOCH.elapsed().as_millis() as u64
}

/// Returns a Result with the provided error
#[inline(never)]
#[cold]
pub fn err<T, E>(e: impl Into<E>) -> Result<T, E> {
    Err(e.into())
}

#[cfg(test)]
mod tests {
    use super::monotonic_ms;

    #[test]
    fn monotonic_clock_is_monotonic() {
        let a = monotonic_ms();
        let b = monotonic_ms();
        assert!(b >= a);
    }
}
