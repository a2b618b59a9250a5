//! RTP Media Session
//!
//! RFC 3550 packet handling and the per-call media loops. The session owns
//! the UDP socket inside the configured port window, decodes inbound payloads
//! to 48kHz bridge frames, and paces outbound frames at one packet per 20ms,
//! substituting silence when the TX queue starves so NAT mappings stay alive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::audio::{Frame, FrameQueue, Reframer, Resampler, SampleRate};

use super::codec::{AudioCodec, CodecKind};
use super::SipError;

/// Capacity of the AI->caller queue: 500 x 20ms = 10s of bursty AI audio
pub const TX_QUEUE_FRAMES: usize = 500;

/// Capacity of the caller->platform queue: 100 x 20ms = 2s of backlog
pub const RX_QUEUE_FRAMES: usize = 100;

/// RTP fixed header, RFC 3550 §5.1:
///
/// ```text
/// byte 0   V V | P | X | CC CC CC CC    version, padding, extension, CSRCs
/// byte 1   M | PT PT PT PT PT PT PT     marker, payload type
/// byte 2-3 sequence number              big endian
/// byte 4-7 timestamp                    big endian
/// byte 8-11 SSRC                        big endian
/// ```
///
/// We only ever emit the plain 12-byte form (no padding, no extension, no
/// CSRC list); on receive, CSRC entries are counted so the payload offset is
/// right, then skipped.
#[derive(Debug, Clone)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

const RTP_VERSION: u8 = 2;
const RTP_HEADER_LEN: usize = 12;
const CSRC_ENTRY_LEN: usize = 4;

impl RtpHeader {
    pub fn new(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            marker: false,
            payload_type,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Serialize to the plain 12-byte wire form
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(RTP_HEADER_LEN);
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(u8::from(self.marker) << 7 | self.payload_type);
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        buf
    }

    /// Parse a header, returning it together with the payload offset
    /// (12 bytes plus any CSRC entries)
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), SipError> {
        if data.len() < RTP_HEADER_LEN {
            return Err(SipError::Rtp("RTP packet too short".to_string()));
        }
        if data[0] >> 6 != RTP_VERSION {
            return Err(SipError::Rtp(format!("invalid RTP version: {}", data[0] >> 6)));
        }

        let csrc_count = (data[0] & 0x0F) as usize;
        let payload_offset = RTP_HEADER_LEN + csrc_count * CSRC_ENTRY_LEN;
        if data.len() < payload_offset {
            return Err(SipError::Rtp("RTP header truncated".to_string()));
        }

        let header = Self {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes(data[4..8].try_into().expect("4 bytes")),
            ssrc: u32::from_be_bytes(data[8..12].try_into().expect("4 bytes")),
        };
        Ok((header, payload_offset))
    }
}

/// RTP packet with header and payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = self.header.to_bytes();
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SipError> {
        let (header, header_len) = RtpHeader::from_bytes(data)?;
        let payload = Bytes::copy_from_slice(&data[header_len..]);

        Ok(Self { header, payload })
    }
}

/// Media endpoints handed to the call supervisor after an accepted INVITE.
///
/// Both sides carry 20ms frames at the 48kHz bridge rate regardless of the
/// negotiated codec; both queues drop their oldest frame on overflow.
#[derive(Debug)]
pub struct MediaChannels {
    /// Caller -> platform queue
    pub rx: Arc<FrameQueue>,
    /// Platform -> caller queue; cleared on interruption
    pub tx: Arc<FrameQueue>,
}

/// RTP session for one call
pub struct RtpSession {
    socket: Arc<UdpSocket>,
    codec_kind: CodecKind,
    ssrc: u32,
    remote_addr: SocketAddr,
    tx_queue: Arc<FrameQueue>,
    cancel: CancellationToken,
}

impl RtpSession {
    /// Bind a socket inside the configured port window.
    /// RTP uses even ports; the odd neighbor is left for RTCP.
    pub async fn bind(port_start: u16, port_end: u16) -> Result<UdpSocket, SipError> {
        let mut port = port_start + (port_start % 2);
        while port < port_end {
            match UdpSocket::bind(("0.0.0.0", port)).await {
                Ok(socket) => return Ok(socket),
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    port += 2;
                }
                Err(e) => {
                    return Err(SipError::Rtp(format!("failed to bind RTP socket: {}", e)));
                }
            }
        }
        Err(SipError::Rtp(format!(
            "no free RTP port in window {}-{}",
            port_start, port_end
        )))
    }

    /// Create a session on an already-bound socket
    pub fn new(
        socket: UdpSocket,
        codec_kind: CodecKind,
        remote_addr: SocketAddr,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket: Arc::new(socket),
            codec_kind,
            ssrc: rand::random::<u32>(),
            remote_addr,
            tx_queue: Arc::new(FrameQueue::new("sip-tx", TX_QUEUE_FRAMES)),
            cancel,
        }
    }

    pub fn local_port(&self) -> u16 {
        self.socket.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    pub fn codec(&self) -> CodecKind {
        self.codec_kind
    }

    /// Start the receive and paced-send loops, returning the bridge channels
    pub fn start(&self) -> Result<MediaChannels, SipError> {
        let rx_queue = Arc::new(FrameQueue::new("sip-rx", RX_QUEUE_FRAMES));

        self.spawn_rx_loop(rx_queue.clone())?;
        self.spawn_tx_loop()?;

        Ok(MediaChannels {
            rx: rx_queue,
            tx: self.tx_queue.clone(),
        })
    }

    fn spawn_rx_loop(&self, rx_queue: Arc<FrameQueue>) -> Result<(), SipError> {
        let socket = self.socket.clone();
        let cancel = self.cancel.clone();
        let mut codec = AudioCodec::new(self.codec_kind)?;
        let codec_rate = self.codec_kind.sample_rate();
        let mut to_bridge = Resampler::new(codec_rate, SampleRate::Hz48000);
        let mut reframer = Reframer::new(SampleRate::Hz48000);

        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let (len, _addr) = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::error!("RTP receive error: {}", e);
                            break;
                        }
                    },
                };

                let packet = match RtpPacket::from_bytes(&buf[..len]) {
                    Ok(p) => p,
                    Err(_) => continue, // non-RTP noise on the media port
                };

                let pcm = match codec.decode(&packet.payload) {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        tracing::debug!("RTP payload decode failed: {}", e);
                        continue;
                    }
                };

                let bridged = to_bridge.process(&pcm).to_vec();
                for frame in reframer.push(&bridged) {
                    // Overflow drops the oldest buffered frame (logged by the
                    // queue); the media loop never blocks on a slow consumer.
                    rx_queue.push(frame);
                }
            }
            tracing::debug!("RTP receive loop ended");
        });

        Ok(())
    }

    fn spawn_tx_loop(&self) -> Result<(), SipError> {
        let socket = self.socket.clone();
        let cancel = self.cancel.clone();
        let tx_queue = self.tx_queue.clone();
        let remote = self.remote_addr;
        let ssrc = self.ssrc;
        let payload_type = self.codec_kind.payload_type();
        let ts_step = self.codec_kind.timestamp_step();
        let mut codec = AudioCodec::new(self.codec_kind)?;
        let codec_rate = self.codec_kind.sample_rate();
        let mut from_bridge = Resampler::new(SampleRate::Hz48000, codec_rate);

        tokio::spawn(async move {
            let mut sequence: u16 = rand::random();
            let mut timestamp: u32 = rand::random();
            let silence = Frame::silence(SampleRate::Hz48000);

            let mut ticker = tokio::time::interval(Duration::from_millis(20));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // The media port must see a packet every 20ms; starving TX
                // gets silence.
                let frame = tx_queue.pop().unwrap_or_else(|| silence.clone());

                let native = from_bridge.process(&frame.samples);
                let payload = match codec.encode(native) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("RTP encode failed: {}", e);
                        continue;
                    }
                };

                let header = RtpHeader::new(payload_type, sequence, timestamp, ssrc);
                sequence = sequence.wrapping_add(1);
                timestamp = timestamp.wrapping_add(ts_step);

                let packet = RtpPacket::new(header, payload);
                if let Err(e) = socket.send_to(&packet.to_bytes(), remote).await {
                    tracing::error!("RTP send error: {}", e);
                    break;
                }
            }
            tracing::debug!("RTP send loop ended");
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = RtpHeader::new(8, 4242, 160_000, 0xdeadbeef);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 12);

        let (parsed, payload_offset) = RtpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(payload_offset, 12);
        assert!(!parsed.marker);
        assert_eq!(parsed.payload_type, 8);
        assert_eq!(parsed.sequence, 4242);
        assert_eq!(parsed.timestamp, 160_000);
        assert_eq!(parsed.ssrc, 0xdeadbeef);
    }

    #[test]
    fn test_header_rejects_short_and_bad_version() {
        assert!(RtpHeader::from_bytes(&[0u8; 4]).is_err());

        let mut bytes = RtpHeader::new(0, 1, 2, 3).to_bytes();
        bytes[0] = 0x40; // version 1
        assert!(RtpHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_header_csrc_entries_shift_payload_offset() {
        let mut bytes = RtpHeader::new(0, 1, 2, 3).to_bytes();
        bytes[0] |= 0x02; // claims two CSRC entries

        // Without the CSRC words present the header is truncated
        assert!(RtpHeader::from_bytes(&bytes).is_err());

        bytes.extend_from_slice(&[0u8; 8]);
        let (_, payload_offset) = RtpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(payload_offset, 20);
    }

    #[test]
    fn test_packet_roundtrip() {
        let header = RtpHeader::new(0, 7, 1000, 42);
        let packet = RtpPacket::new(header, Bytes::from_static(&[1, 2, 3, 4]));
        let bytes = packet.to_bytes();

        let parsed = RtpPacket::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.header.sequence, 7);
        assert_eq!(&parsed.payload[..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_bind_inside_window() {
        let socket = RtpSession::bind(40_000, 40_100).await.unwrap();
        let port = socket.local_addr().unwrap().port();
        assert!((40_000..40_100).contains(&port));
        assert_eq!(port % 2, 0);
    }

    #[tokio::test]
    async fn test_rx_queue_drops_oldest_when_full() {
        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let session = RtpSession::new(
            socket,
            CodecKind::Pcmu,
            remote.local_addr().unwrap(),
            cancel.clone(),
        );
        let media = session.start().unwrap();

        // Fill past capacity without draining: the queue stays bounded and
        // sheds the oldest frames, not the newest arrivals.
        for i in 0..(RX_QUEUE_FRAMES + 3) {
            let mut frame = Frame::silence(SampleRate::Hz48000);
            frame.samples[0] = i as i16;
            media.rx.push(frame);
        }

        assert_eq!(media.rx.len(), RX_QUEUE_FRAMES);
        assert_eq!(media.rx.pop().unwrap().samples[0], 3);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_rx_decodes_packets_to_bridge_frames() {
        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local_addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let session = RtpSession::new(
            socket,
            CodecKind::Pcmu,
            remote.local_addr().unwrap(),
            cancel.clone(),
        );
        let media = session.start().unwrap();

        // One 20ms PCMU packet (160 samples at 8kHz) becomes one 960-sample
        // frame at the 48kHz bridge rate
        let mut codec = AudioCodec::new(CodecKind::Pcmu).unwrap();
        let payload = codec.encode(&vec![1000i16; 160]).unwrap();
        let packet = RtpPacket::new(RtpHeader::new(0, 1, 0, 42), payload);
        remote.send_to(&packet.to_bytes(), local_addr).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_millis(500), media.rx.recv())
            .await
            .expect("no RX frame within 500ms");
        assert_eq!(frame.rate, SampleRate::Hz48000);
        assert_eq!(frame.len(), 960);
        assert!(frame.samples.iter().any(|&s| s > 500));

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_tx_substitutes_silence_and_keeps_sequence_contiguous() {
        // A receiver socket plays the remote peer.
        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote_addr = remote.local_addr().unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let session = RtpSession::new(socket, CodecKind::Pcmu, remote_addr, cancel.clone());
        let channels = session.start().unwrap();

        // No TX frames pushed: the loop must still emit (silence) packets.
        let mut buf = [0u8; 2048];
        let mut sequences = Vec::new();
        for _ in 0..3 {
            let (len, _) = tokio::time::timeout(Duration::from_millis(500), remote.recv_from(&mut buf))
                .await
                .expect("no RTP packet within 500ms")
                .unwrap();
            let packet = RtpPacket::from_bytes(&buf[..len]).unwrap();
            assert_eq!(packet.payload.len(), 160); // 20ms at 8kHz, 1 byte/sample
            sequences.push(packet.header.sequence);
        }

        assert_eq!(sequences[1], sequences[0].wrapping_add(1));
        assert_eq!(sequences[2], sequences[1].wrapping_add(1));

        cancel.cancel();
        drop(channels);
    }
}
