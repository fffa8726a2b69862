/*
 * Created on Sat Jun 07 2025
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

//! The environment-variable configuration source. Anything set here wins
//! over the configuration file

use {super::Configset, std::net::IpAddr};

pub(super) fn apply_env_config(cs: &mut Configset) {
    cs.env_var::<IpAddr>("PHOTON_HOST", |cfg, host| cfg.host = host);
    cs.env_var::<u16>("PHOTON_PORT", |cfg, port| cfg.port = port);
    cs.env_var::<usize>("PHOTON_MAXCON", |cfg, maxcon| cfg.maxcon = maxcon);
    cs.env_var::<bool>("PHOTON_NOART", |cfg, noart| cfg.noart = noart);
    cs.env_var::<u64>("PHOTON_IDLE_TIMEOUT", |cfg, ms| cfg.idle_timeout_ms = ms);
    cs.env_var::<u64>("PHOTON_BGSAVE_EVERY", |cfg, every| {
        cfg.bgsave = super::BGSave::from_duration(every)
    });
}
