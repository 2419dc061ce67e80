extern crate nat_upnp;

use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

fn main() {
    let _ = SimpleLogger::init(LevelFilter::Debug, LogConfig::default());

    let client = match nat_upnp::Client::new() {
        Ok(client) => client,
        Err(ref err) => return println!("Could not bind the discovery socket: {}", err),
    };
    match client.external_ip() {
        Err(nat_upnp::Error::DiscoveryTimeout) => println!("No gateway answered"),
        Err(ref err) => println!("{}", err),
        Ok(ip) => println!("External ip address: {}", ip),
    }
    client.close();
}
