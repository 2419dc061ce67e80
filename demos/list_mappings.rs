//! Lists the port mappings of the gateway.
//!
//! Pass `--local` to only show the mappings that point at this machine.

extern crate nat_upnp;

use std::env;

use nat_upnp::{Client, MappingFilter};
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

fn main() {
    let _ = SimpleLogger::init(LevelFilter::Info, LogConfig::default());

    let mut filter = MappingFilter::all();
    if env::args().any(|arg| arg == "--local") {
        filter = filter.local();
    }

    let client = match Client::new() {
        Ok(client) => client,
        Err(ref err) => return println!("Could not bind the discovery socket: {}", err),
    };
    match client.port_mappings(&filter) {
        Err(ref err) => println!("{}", err),
        Ok(mappings) => {
            for mapping in mappings {
                println!(
                    "{}:{} -> {}:{} {} enabled={} ttl={} {}",
                    mapping.public.host,
                    mapping.public.port,
                    mapping.private.host,
                    mapping.private.port,
                    mapping.protocol,
                    mapping.enabled,
                    mapping.ttl,
                    mapping.description.as_deref().unwrap_or("")
                );
            }
        }
    }
    client.close();
}
