//! SIP Trunk Configuration

use serde::{Deserialize, Serialize};

/// SIP trunk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SipConfig {
    /// SIP registrar / trunk hostname (e.g. "sipconnect.sipgate.de")
    pub server: String,

    /// SIP port (default 5060)
    pub port: u16,

    /// SIP username for authentication
    pub username: String,

    /// SIP password for authentication
    pub password: String,

    /// Public IP inserted into Contact and SDP c=/o= lines (NAT)
    pub public_ip: Option<String>,

    /// STUN servers probed in order
    pub stun_servers: Vec<String>,

    /// Local SIP listen port
    pub local_port: u16,

    /// RTP port window start (firewall-restricted)
    pub rtp_port_start: u16,

    /// RTP port window end
    pub rtp_port_end: u16,

    /// Registration refresh interval in seconds
    pub register_expires: u32,

    /// User agent string
    pub user_agent: String,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 5060,
            username: String::new(),
            password: String::new(),
            public_ip: None,
            stun_servers: vec![
                "stun.sipgate.de:3478".to_string(),
                "stun.l.google.com:19302".to_string(),
            ],
            local_port: 5060,
            rtp_port_start: 4000,
            rtp_port_end: 4100,
            register_expires: 300,
            user_agent: "VoiceGate/0.1 (Rust)".to_string(),
        }
    }
}

impl SipConfig {
    /// Create config from environment variables
    pub fn from_env() -> Option<Self> {
        let server = std::env::var("SIP_SERVER").ok()?;
        let username = std::env::var("SIP_USER").ok()?;
        let password = std::env::var("SIP_PASSWORD").ok()?;

        let defaults = Self::default();

        let stun_servers = std::env::var("SIP_STUN_SERVERS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.stun_servers);

        Some(Self {
            server,
            port: std::env::var("SIP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5060),
            username,
            password,
            public_ip: std::env::var("SIP_PUBLIC_IP").ok().filter(|s| !s.is_empty()),
            stun_servers,
            local_port: std::env::var("SIP_LOCAL_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5060),
            rtp_port_start: std::env::var("SIP_RTP_PORT_START")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(4000),
            rtp_port_end: std::env::var("SIP_RTP_PORT_END")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(4100),
            register_expires: std::env::var("SIP_REGISTER_EXPIRES")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300),
            user_agent: defaults.user_agent,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.is_empty() {
            return Err("SIP server is required".to_string());
        }
        if self.username.is_empty() {
            return Err("SIP username is required".to_string());
        }
        if self.password.is_empty() {
            return Err("SIP password is required".to_string());
        }
        if self.rtp_port_start >= self.rtp_port_end {
            return Err("RTP port range is invalid".to_string());
        }
        Ok(())
    }

    /// The SIP URI of the registrar
    pub fn registrar_uri(&self) -> String {
        format!("sip:{}:{}", self.server, self.port)
    }

    /// Our identity URI
    pub fn identity_uri(&self) -> String {
        format!("sip:{}@{}", self.username, self.server)
    }

    /// Contact URI advertising the public (or local) address
    pub fn contact_uri(&self, local_ip: &str) -> String {
        let host = self.public_ip.as_deref().unwrap_or(local_ip);
        format!("sip:{}@{}:{}", self.username, host, self.local_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_fields() {
        let config = SipConfig::default();
        assert!(config.validate().is_err());

        let config = SipConfig {
            server: "sip.example.de".into(),
            username: "user".into(),
            password: "pass".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_port_range() {
        let config = SipConfig {
            server: "sip.example.de".into(),
            username: "user".into(),
            password: "pass".into(),
            rtp_port_start: 5000,
            rtp_port_end: 4000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_contact_prefers_public_ip() {
        let config = SipConfig {
            server: "sip.example.de".into(),
            username: "4711".into(),
            password: "pass".into(),
            public_ip: Some("203.0.113.7".into()),
            ..Default::default()
        };
        assert_eq!(
            config.contact_uri("192.168.1.10"),
            "sip:4711@203.0.113.7:5060"
        );

        let config = SipConfig {
            public_ip: None,
            ..config
        };
        assert_eq!(
            config.contact_uri("192.168.1.10"),
            "sip:4711@192.168.1.10:5060"
        );
    }
}
