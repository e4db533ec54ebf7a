use std::net::Ipv4Addr;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use super::message::ControlMessage;

/// Upper bound for a control datagram; a FILEMAP of a few thousand files fits.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Binds a socket that receives the ring-wide announcement traffic.
pub async fn bind_multicast(group: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
    Ok(socket)
}

/// Binds the unicast control socket a node (or the registry) listens on.
pub async fn bind_control(port: u16) -> Result<UdpSocket> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    Ok(socket)
}

/// Broadcasts one announcement to the whole ring.
pub async fn send_multicast(group: Ipv4Addr, port: u16, msg: &ControlMessage) -> Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.send_to(msg.encode().as_bytes(), (group, port)).await?;
    Ok(())
}

/// Sends one control datagram to a single peer.
pub async fn send_unicast(host: &str, port: u16, msg: &ControlMessage) -> Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.send_to(msg.encode().as_bytes(), (host, port)).await?;
    Ok(())
}

/// Delivers a pointer correction over a short-lived TCP connection.
///
/// Corrections repair ring topology, so unlike the datagram traffic they get
/// the connection-oriented channel: delivery failure surfaces as an error at
/// the sender instead of silence.
pub async fn send_correction(host: &str, port: u16, msg: &ControlMessage) -> Result<()> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream.write_all(msg.encode().as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;
    Ok(())
}
