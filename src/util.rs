use std::net::UdpSocket;

const FALLBACK_SOURCE: &str = "127.0.0.1";

/// Resolve the local address this host reports metrics under.
///
/// Connecting a UDP socket performs no I/O; it only asks the OS which
/// local address would route towards the given peer. Falls back to the
/// loopback address when the host has no route at all.
pub fn local_source_address() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:53")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| String::from(FALLBACK_SOURCE))
}
