/*
 * Created on Sat Jun 14 2025
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

//! # Photon
//!
//! The `photond` crate is Photon's database server: an in-memory
//! key/value store with Redis-style semantics (strings, sorted sets,
//! per-key TTLs) speaking a compact binary protocol over TCP, with
//! optional snapshot persistence. See the individual modules for their
//! respective documentation.

use {
    crate::config::ConfigurationSet,
    env_logger::Builder,
    libphoton::{util::terminal, URL, VERSION},
    std::{env, fs, io::Write, path, process, thread, time},
    tokio::signal,
};

mod actions;
mod admin;
mod config;
mod corestore;
mod dbnet;
mod diskstore;
mod protocol;
mod queryengine;
mod resp;
mod services;
mod util;
#[cfg(test)]
mod tests;

/// A generic I/O result
pub type IoResult<T> = std::io::Result<T>;

const PATH: &str = ".photon_pid";

#[cfg(all(not(target_env = "msvc"), not(miri)))]
use jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
/// Jemallocator - this is the default memory allocator for platforms other than msvc
static GLOBAL: Jemalloc = Jemalloc;

/// The terminal art for `!noart` configurations
static TEXT: &str = "\n██████  ██   ██  ██████  ████████  ██████  ███    ██ \n██   ██ ██   ██ ██    ██    ██    ██    ██ ████   ██ \n██████  ███████ ██    ██    ██    ██    ██ ██ ██  ██ \n██      ██   ██ ██    ██    ██    ██    ██ ██  ██ ██ \n██      ██   ██  ██████     ██     ██████  ██   ████ \n";

fn main() {
    Builder::new()
        .parse_filters(&env::var("PHOTON_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    // check if any other process is using the data directory and lock it if not (else error)
    let pid_file = run_pre_startup_tasks();
    // Start the server which asynchronously waits for a CTRL+C signal
    // which will safely shut down the server
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
        .unwrap();
    let db = runtime.block_on(async {
        let cfg = check_and_get_cfg();
        dbnet::run(cfg, signal::ctrl_c()).await
    });
    // make sure all background workers terminate
    drop(runtime);
    let db = match db {
        Ok(db) => db,
        Err(e) => {
            log::error!("Startup failure: {}", e);
            process::exit(0x100);
        }
    };
    log::info!("Stopped accepting incoming connections");
    loop {
        // keep looping until we successfully write the in-memory table to disk
        match db.save_to_disk() {
            Ok(_) => {
                log::info!("Successfully saved data to disk");
                break;
            }
            Err(e) => {
                log::error!(
                    "Failed to write data with error '{}'. Attempting to retry in 10s",
                    e
                );
            }
        }
        thread::sleep(time::Duration::from_secs(10));
    }
    // close the PID file and remove it
    drop(pid_file);
    if let Err(e) = fs::remove_file(PATH) {
        log::error!("Shutdown failure: Failed to remove pid file: {}", e);
        process::exit(0x100);
    }
    terminal::write_info("Goodbye :)\n").unwrap();
}

/// This function resolves the configuration or prints an error to
/// `stderr` and terminates the server
fn check_and_get_cfg() -> ConfigurationSet {
    match config::get_config() {
        Ok(cfg) => {
            if cfg.is_artful() {
                println!("Photon v{} | {}\n{}", VERSION, URL, TEXT);
            } else {
                println!("Photon v{} | {}", VERSION, URL);
            }
            cfg
        }
        Err(e) => {
            log::error!("{}", e);
            process::exit(0x100);
        }
    }
}

/// Startup guard: a `.photon_pid` file in the working directory means
/// another photond instance owns the snapshot here, and two writers to
/// `photon.rdb` would silently clobber each other. Refuse to boot in that
/// case; otherwise claim the directory by writing our own PID. The handle
/// is held open for the life of the process and the file is removed on a
/// clean shutdown.
fn run_pre_startup_tasks() -> fs::File {
    let pid_path = path::Path::new(PATH);
    if pid_path.exists() {
        let owner = fs::read_to_string(pid_path).unwrap_or_else(|_| "<unreadable>".to_owned());
        log::error!(
            "Startup failure: the working directory is already in use by photond instance (pid {})",
            owner.trim()
        );
        process::exit(0x100);
    }
    let mut pid_file = match fs::File::create(pid_path) {
        Ok(file) => file,
        Err(e) => {
            log::error!("Startup failure: could not create the pid file: {}", e);
            process::exit(0x100);
        }
    };
    if let Err(e) = pid_file.write_all(process::id().to_string().as_bytes()) {
        log::error!("Startup failure: could not write the pid file: {}", e);
        process::exit(0x100);
    }
    pid_file
}
