//! SDP Offer Parsing and Answer Building
//!
//! Minimal SDP handling for the inbound-call path: extract the remote media
//! endpoint and offered payload types, and answer with our single negotiated
//! codec at the advertised public address.

use std::net::{IpAddr, SocketAddr};

use super::codec::CodecKind;
use super::SipError;

/// The media parameters extracted from an SDP offer
#[derive(Debug, Clone)]
pub struct SdpOffer {
    /// Remote RTP endpoint from c= and m=audio
    pub remote_rtp: SocketAddr,
    /// Payload type numbers in the m=audio line, offer order
    pub payload_types: Vec<u8>,
    /// Whether an rtpmap maps some payload to opus/48000
    pub offers_opus: bool,
}

/// Parse the fields we need from an SDP body
pub fn parse_offer(body: &str) -> Result<SdpOffer, SipError> {
    let mut connection_ip: Option<IpAddr> = None;
    let mut audio_port: Option<u16> = None;
    let mut payload_types: Vec<u8> = Vec::new();
    let mut offers_opus = false;

    for line in body.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("c=") {
            // c=IN IP4 203.0.113.50
            let mut parts = rest.split_whitespace();
            let (_net, addr_type, addr) = (parts.next(), parts.next(), parts.next());
            if let (Some(addr_type), Some(addr)) = (addr_type, addr) {
                if addr_type == "IP4" || addr_type == "IP6" {
                    connection_ip = addr.parse().ok();
                }
            }
        } else if let Some(rest) = line.strip_prefix("m=audio ") {
            // m=audio 4000 RTP/AVP 111 8 0
            let mut parts = rest.split_whitespace();
            audio_port = parts.next().and_then(|p| p.parse().ok());
            let _profile = parts.next();
            payload_types = parts.filter_map(|p| p.parse().ok()).collect();
        } else if let Some(rest) = line.strip_prefix("a=rtpmap:") {
            // a=rtpmap:111 opus/48000/2
            if let Some((_pt, codec)) = rest.split_once(' ') {
                if codec.to_ascii_lowercase().starts_with("opus/48000") {
                    offers_opus = true;
                }
            }
        }
    }

    let ip = connection_ip
        .ok_or_else(|| SipError::Sdp("offer has no c= connection line".to_string()))?;
    let port = audio_port.ok_or_else(|| SipError::Sdp("offer has no m=audio line".to_string()))?;
    if port == 0 {
        return Err(SipError::Sdp("offer disables audio (port 0)".to_string()));
    }

    Ok(SdpOffer {
        remote_rtp: SocketAddr::new(ip, port),
        payload_types,
        offers_opus,
    })
}

/// Build the SDP answer for a negotiated codec.
///
/// `advertised_ip` is the public address when configured, so the c=/o= lines
/// survive NAT.
pub fn build_answer(advertised_ip: &str, rtp_port: u16, codec: CodecKind) -> String {
    let session_id = rand::random::<u32>();

    format!(
        "v=0\r\n\
         o=- {} 1 IN IP4 {}\r\n\
         s=VoiceGate\r\n\
         c=IN IP4 {}\r\n\
         t=0 0\r\n\
         m=audio {} RTP/AVP {}\r\n\
         a=rtpmap:{}\r\n\
         a=ptime:20\r\n\
         a=sendrecv\r\n",
        session_id,
        advertised_ip,
        advertised_ip,
        rtp_port,
        codec.payload_type(),
        codec.rtpmap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER_OPUS: &str = "v=0\r\n\
        o=caller 1234 1 IN IP4 203.0.113.50\r\n\
        s=call\r\n\
        c=IN IP4 203.0.113.50\r\n\
        t=0 0\r\n\
        m=audio 4002 RTP/AVP 111 8 0\r\n\
        a=rtpmap:111 opus/48000/2\r\n\
        a=rtpmap:8 PCMA/8000\r\n\
        a=rtpmap:0 PCMU/8000\r\n";

    #[test]
    fn test_parse_offer_with_opus() {
        let offer = parse_offer(OFFER_OPUS).unwrap();
        assert_eq!(offer.remote_rtp.to_string(), "203.0.113.50:4002");
        assert_eq!(offer.payload_types, vec![111, 8, 0]);
        assert!(offer.offers_opus);
    }

    #[test]
    fn test_parse_offer_g711_only() {
        let body = OFFER_OPUS
            .replace("m=audio 4002 RTP/AVP 111 8 0", "m=audio 4002 RTP/AVP 8 0")
            .replace("a=rtpmap:111 opus/48000/2\r\n", "");
        let offer = parse_offer(&body).unwrap();
        assert!(!offer.offers_opus);
        assert_eq!(offer.payload_types, vec![8, 0]);
    }

    #[test]
    fn test_parse_offer_missing_media_is_error() {
        assert!(parse_offer("v=0\r\nc=IN IP4 10.0.0.1\r\n").is_err());
        assert!(parse_offer("v=0\r\nm=audio 4000 RTP/AVP 0\r\n").is_err());
    }

    #[test]
    fn test_parse_offer_rejects_disabled_audio() {
        let body = OFFER_OPUS.replace("m=audio 4002", "m=audio 0");
        assert!(parse_offer(&body).is_err());
    }

    #[test]
    fn test_answer_contains_public_ip_and_codec() {
        let answer = build_answer("203.0.113.7", 4000, CodecKind::Opus);
        assert!(answer.contains("c=IN IP4 203.0.113.7"));
        assert!(answer.contains("o=- "));
        assert!(answer.contains("m=audio 4000 RTP/AVP 111"));
        assert!(answer.contains("a=rtpmap:111 opus/48000/2"));
        assert!(answer.contains("a=ptime:20"));

        let answer = build_answer("203.0.113.7", 4002, CodecKind::Pcma);
        assert!(answer.contains("m=audio 4002 RTP/AVP 8"));
        assert!(answer.contains("a=rtpmap:8 PCMA/8000"));
    }
}
