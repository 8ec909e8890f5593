//! Minimal OSC 1.0 sender: one message per marker, one argument per message.

use anyhow::{Context, Result};
use ssvep_core::{Marker, MarkerTransport, SinkError};
use ssvep_session::TransportConfig;
use std::net::{SocketAddr, UdpSocket};

fn push_padded(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Integer codes travel as `,i` (big-endian int32), phase/cue pairs as `,s`.
pub fn encode_message(address: &str, marker: &Marker) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    push_padded(&mut buf, address);
    match marker {
        Marker::Code(code) => {
            push_padded(&mut buf, ",i");
            buf.extend_from_slice(&code.to_be_bytes());
        }
        Marker::PhaseCue { .. } => {
            push_padded(&mut buf, ",s");
            push_padded(&mut buf, &marker.to_string());
        }
    }
    buf
}

pub struct OscTransport {
    socket: UdpSocket,
    destination: SocketAddr,
    address: String,
}

impl OscTransport {
    pub fn bind(config: &TransportConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind)
            .with_context(|| format!("binding marker socket on {}", config.bind))?;
        log::info!(
            "markers: OSC {} from {} to {}",
            config.address,
            socket.local_addr().unwrap_or(config.bind),
            config.destination
        );
        Ok(Self {
            socket,
            destination: config.destination,
            address: config.address.clone(),
        })
    }
}

impl MarkerTransport for OscTransport {
    fn send_marker(&mut self, marker: &Marker) -> Result<(), SinkError> {
        let packet = encode_message(&self.address, marker);
        self.socket.send_to(&packet, self.destination)?;
        Ok(())
    }
}
