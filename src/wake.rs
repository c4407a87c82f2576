//! Wake-on-LAN delegation
//!
//! "Power on" never goes through a device connection — a powered-off
//! machine has none. The webhook hands the stored MAC address straight to a
//! [`WolSender`]; there is no reply to wait for.

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::{Error, Result};

/// Standard discard port used for magic packets
const WOL_PORT: u16 = 9;

/// Sends a wake-up signal to a machine identified by MAC address
#[async_trait]
pub trait WolSender: Send + Sync {
    /// Send the wake signal; best-effort, no acknowledgement exists
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable MAC or a socket failure.
    async fn wake(&self, mac: &str) -> Result<()>;
}

/// Broadcasts a standard magic packet over UDP
#[derive(Debug, Clone)]
pub struct UdpWolSender {
    port: u16,
}

impl Default for UdpWolSender {
    fn default() -> Self {
        Self { port: WOL_PORT }
    }
}

impl UdpWolSender {
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl WolSender for UdpWolSender {
    async fn wake(&self, mac: &str) -> Result<()> {
        let packet = magic_packet(mac)?;

        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.set_broadcast(true)?;
        socket
            .send_to(&packet, ("255.255.255.255", self.port))
            .await?;

        tracing::info!(mac, port = self.port, "sent wake-on-lan packet");
        Ok(())
    }
}

/// Build a magic packet: six 0xFF bytes followed by the MAC repeated 16 times
///
/// Accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
///
/// # Errors
///
/// Returns [`Error::Wake`] if `mac` is not six hex octets.
pub fn magic_packet(mac: &str) -> Result<[u8; 102]> {
    let octets: Vec<u8> = mac
        .split(|c| c == ':' || c == '-')
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Wake(format!("invalid MAC address: {mac}")))?;

    let mac_bytes: [u8; 6] = octets
        .try_into()
        .map_err(|_| Error::Wake(format!("invalid MAC address: {mac}")))?;

    let mut packet = [0xFF_u8; 102];
    for repeat in packet[6..].chunks_exact_mut(6) {
        repeat.copy_from_slice(&mac_bytes);
    }
    Ok(packet)
}
