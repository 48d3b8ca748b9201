use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::Error;

/// Resolve a host name or IP literal to a socket address, preferring IPv4.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Dns(format!("{}", e)))?
        .collect();

    let mut v4 = vec![];
    let mut v6 = vec![];
    for addr in addrs {
        if addr.is_ipv4() {
            v4.push(addr);
        } else {
            v6.push(addr);
        }
    }

    v4.into_iter()
        .chain(v6)
        .next()
        .ok_or_else(|| Error::Dns(format!("no address found for '{}'", host)))
}
