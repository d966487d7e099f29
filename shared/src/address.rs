//! Server address text handling and local address discovery

use crate::error::ProtocolError;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Parses `A.B.C.D:PORT` with decimal octets in 0..=255 and a port in 0..=65535
///
/// Any other shape, including host names and IPv6 literals, is rejected so no
/// connection attempt is made with it.
pub fn parse_server_address(text: &str) -> Result<SocketAddrV4, ProtocolError> {
    let invalid = || ProtocolError::Address(text.to_string());

    let (ip, port) = text.split_once(':').ok_or_else(invalid)?;
    let port: u16 = parse_decimal(port).ok_or_else(invalid)?;

    let octets: Vec<u8> = ip
        .split('.')
        .map(parse_decimal)
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(invalid)?;
    let [a, b, c, d]: [u8; 4] = octets.try_into().map_err(|_| invalid())?;

    Ok(SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port))
}

pub fn is_valid_address(text: &str) -> bool {
    parse_server_address(text).is_ok()
}

/// Digits only, so signs and whitespace never sneak through `str::parse`
fn parse_decimal<T: std::str::FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Finds the IPv4 address this machine uses for outbound traffic
///
/// Connecting a UDP socket sends nothing but makes the OS pick a route and a
/// source address. Falls back to loopback when no route exists.
pub fn local_ip() -> Ipv4Addr {
    let probe = || -> std::io::Result<Ipv4Addr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        match socket.local_addr()?.ip() {
            std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
            _ => Ok(Ipv4Addr::LOCALHOST),
        }
    };

    probe().unwrap_or(Ipv4Addr::LOCALHOST)
}
