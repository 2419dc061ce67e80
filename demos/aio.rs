//! Async API example.
//!
//! It demonstrates how to:
//! * get external IP
//! * add port mappings
//! * list port mappings
//! * remove port mappings
//!
//! cargo run --features aio --example aio -- 4321

extern crate nat_upnp;

use std::env;

use nat_upnp::aio::Client;
use nat_upnp::{MappingFilter, PortMappingOptions, PortMappingProtocol};
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

#[tokio::main]
async fn main() {
    let port: u16 = match env::args().nth(1).map(|arg| arg.parse()) {
        Some(Ok(port)) => port,
        _ => {
            println!("Local port is missing!");
            println!("Example: cargo run --features aio --example aio -- 4321");
            return;
        }
    };

    let _ = SimpleLogger::init(LevelFilter::Debug, LogConfig::default());

    let client = match Client::new().await {
        Ok(client) => client,
        Err(err) => return println!("Failed to bind the discovery socket: {}", err),
    };

    match client.external_ip().await {
        Ok(ip) => println!("Our public IP: {}", ip),
        Err(err) => return println!("Failed to get external IP: {}", err),
    }

    let options = PortMappingOptions::new(port, port)
        .protocol(PortMappingProtocol::TCP)
        .description("nat-upnp aio example")
        .ttl(120u32);
    if let Err(err) = client.add_port_mapping(&options).await {
        return println!("Failed to add port mapping: {}", err);
    }
    println!("New port mapping was successfully added.");

    match client
        .port_mappings(&MappingFilter::all().local().description("aio example"))
        .await
    {
        Ok(mappings) => println!("{} mapping(s) point at this machine", mappings.len()),
        Err(err) => println!("Failed to list port mappings: {}", err),
    }

    match client.remove_port_mapping(&options).await {
        Ok(_) => println!("Port was removed."),
        Err(err) => println!("Failed to remove port mapping: {}", err),
    }
    client.close();
}
