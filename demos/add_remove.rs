//! Maps an external port to this machine, then removes the mapping again.
//!
//! cargo run --example add_remove -- 4321

extern crate nat_upnp;

use std::env;

use nat_upnp::{Client, PortMappingOptions, PortMappingProtocol};
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

fn main() {
    let port: u16 = match env::args().nth(1).map(|arg| arg.parse()) {
        Some(Ok(port)) => port,
        _ => {
            println!("Expected a port number (cargo run --example add_remove -- <port>)");
            return;
        }
    };

    let _ = SimpleLogger::init(LevelFilter::Debug, LogConfig::default());

    let client = match Client::new() {
        Ok(client) => client,
        Err(ref err) => return println!("Could not bind the discovery socket: {}", err),
    };

    let options = PortMappingOptions::new(port, port)
        .protocol(PortMappingProtocol::TCP)
        .description("nat-upnp add_remove example")
        .ttl(120u32);
    match client.add_port_mapping(&options) {
        Err(ref err) => return println!("Failed to add port mapping: {}", err),
        Ok(_) => println!("Port {} is mapped", port),
    }

    match client.remove_port_mapping(&options) {
        Err(ref err) => println!("Failed to remove port mapping: {}", err),
        Ok(_) => println!("Port {} was removed", port),
    }
    client.close();
}
