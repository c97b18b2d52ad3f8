use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use platchan_frame::{FrameError, FrameKind, FrameReader, FrameWriter};
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Protocol name spoken on the link.
pub const PROTOCOL_NAME: &str = "platchan";
/// Local protocol version, `<major>.<minor>`.
pub const PROTOCOL_VERSION: &str = "1.0";

const MAX_PROTOCOL_LEN: usize = 32;
const MAX_VERSION_LEN: usize = 16;
const MAX_CODEC_LEN: usize = 32;
const MAX_LINK_ID_LEN: usize = 128;

/// Client handshake request, sent as a control frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: String,
    /// Name of the method codec the client will speak on its channels.
    pub codec: String,
}

/// Server handshake response, sent as a control frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub protocol: String,
    pub version: String,
    /// Server-assigned link identifier.
    pub link_id: String,
}

/// Result of a successful handshake, seen from either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResult {
    pub link_id: String,
    pub protocol_version: String,
    /// Codec announced by the client.
    pub codec: String,
}

#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Timeout for each blocking handshake operation.
    pub timeout: Duration,
    pub protocol_name: String,
    pub protocol_version: String,
    /// Codec names the server accepts from clients.
    pub codecs: Vec<String>,
    /// Maximum handshake frame payload size in bytes.
    pub max_handshake_payload: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            codecs: vec!["json".to_string(), "binary".to_string()],
            max_handshake_payload: 16 * 1024,
        }
    }
}

impl HandshakeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codecs = codecs.into_iter().map(Into::into).collect();
        self
    }
}

/// Client side: announce protocol, version and codec, then validate the answer.
pub fn handshake_client<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    codec: &str,
    config: &HandshakeConfig,
) -> Result<HandshakeResult> {
    validate_protocol_name(&config.protocol_name)?;
    validate_version(&config.protocol_version)?;
    validate_codec(codec)?;

    let req = HandshakeRequest {
        protocol: config.protocol_name.clone(),
        version: config.protocol_version.clone(),
        codec: codec.to_string(),
    };
    send_control_json(writer, &req)?;

    let payload = recv_control_payload(reader, config)?;
    let resp: HandshakeResponse = serde_json::from_slice(&payload)?;

    validate_protocol_name(&resp.protocol)?;
    validate_version(&resp.version)?;
    validate_link_id(&resp.link_id)?;

    if resp.protocol != config.protocol_name {
        return Err(LinkError::HandshakeFailed(format!(
            "unknown protocol '{}' (expected '{}')",
            resp.protocol, config.protocol_name
        )));
    }
    if !is_version_compatible(&config.protocol_version, &resp.version)? {
        return Err(LinkError::HandshakeFailed(format!(
            "incompatible version '{}' (local '{}')",
            resp.version, config.protocol_version
        )));
    }

    Ok(HandshakeResult {
        link_id: resp.link_id,
        protocol_version: resp.version,
        codec: req.codec,
    })
}

/// Server side: validate the client's request and answer with `link_id`.
pub fn handshake_server<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    link_id: &str,
    config: &HandshakeConfig,
) -> Result<HandshakeResult> {
    validate_protocol_name(&config.protocol_name)?;
    validate_version(&config.protocol_version)?;
    validate_link_id(link_id)?;

    let payload = recv_control_payload(reader, config)?;
    let req: HandshakeRequest = serde_json::from_slice(&payload)?;

    validate_protocol_name(&req.protocol)?;
    validate_version(&req.version)?;
    validate_codec(&req.codec)?;

    if req.protocol != config.protocol_name {
        return Err(LinkError::HandshakeFailed(format!(
            "unknown protocol '{}' (expected '{}')",
            req.protocol, config.protocol_name
        )));
    }
    if !is_version_compatible(&req.version, &config.protocol_version)? {
        return Err(LinkError::HandshakeFailed(format!(
            "incompatible version '{}' (server '{}')",
            req.version, config.protocol_version
        )));
    }
    if !config.codecs.iter().any(|codec| *codec == req.codec) {
        return Err(LinkError::HandshakeFailed(format!(
            "unsupported codec '{}'",
            req.codec
        )));
    }

    let resp = HandshakeResponse {
        protocol: config.protocol_name.clone(),
        version: config.protocol_version.clone(),
        link_id: link_id.to_string(),
    };
    send_control_json(writer, &resp)?;

    Ok(HandshakeResult {
        link_id: link_id.to_string(),
        protocol_version: config.protocol_version.clone(),
        codec: req.codec,
    })
}

fn send_control_json<T: Serialize, W: Write>(writer: &mut FrameWriter<W>, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    writer.write_control(&payload)?;
    Ok(())
}

fn recv_control_payload<R: Read>(
    reader: &mut FrameReader<R>,
    config: &HandshakeConfig,
) -> Result<Vec<u8>> {
    let deadline = Instant::now() + config.timeout;
    loop {
        if Instant::now() >= deadline {
            return Err(LinkError::Timeout(config.timeout));
        }

        match reader.read_frame() {
            Ok(frame) => {
                if frame.kind != FrameKind::Control {
                    return Err(LinkError::HandshakeFailed(format!(
                        "expected control frame, got {:?}",
                        frame.kind
                    )));
                }
                if frame.payload.len() > config.max_handshake_payload {
                    return Err(LinkError::HandshakeFailed(format!(
                        "handshake payload too large: {} (max {})",
                        frame.payload.len(),
                        config.max_handshake_payload
                    )));
                }
                return Ok(frame.payload.to_vec());
            }
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                return Err(LinkError::Disconnected(
                    "connection closed during handshake".to_string(),
                ));
            }
            Err(err) => return Err(LinkError::Frame(err)),
        }
    }
}

fn validate_protocol_name(protocol: &str) -> Result<()> {
    if protocol.is_empty() || protocol.len() > MAX_PROTOCOL_LEN {
        return Err(LinkError::HandshakeFailed(format!(
            "invalid protocol name length: {}",
            protocol.len()
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(LinkError::HandshakeFailed(format!(
            "invalid protocol version length: {}",
            version.len()
        )));
    }
    parse_version(version).map(|_| ())
}

fn validate_codec(codec: &str) -> Result<()> {
    if codec.is_empty() || codec.len() > MAX_CODEC_LEN {
        return Err(LinkError::HandshakeFailed(format!(
            "invalid codec name length: {}",
            codec.len()
        )));
    }
    Ok(())
}

fn validate_link_id(link_id: &str) -> Result<()> {
    if link_id.is_empty() || link_id.len() > MAX_LINK_ID_LEN {
        return Err(LinkError::HandshakeFailed(format!(
            "invalid link_id length: {}",
            link_id.len()
        )));
    }
    Ok(())
}

fn is_version_compatible(client_version: &str, server_version: &str) -> Result<bool> {
    let (client_major, client_minor) = parse_version(client_version)?;
    let (server_major, server_minor) = parse_version(server_version)?;
    Ok(client_major == server_major && client_minor >= server_minor)
}

fn parse_version(version: &str) -> Result<(u16, u16)> {
    let invalid = |what: &str| LinkError::HandshakeFailed(format!("invalid version '{version}': {what}"));

    let mut parts = version.split('.');
    let major = parts.next().ok_or_else(|| invalid("missing major"))?;
    let minor = parts.next().ok_or_else(|| invalid("missing minor"))?;
    if parts.next().is_some() {
        return Err(invalid("expected '<major>.<minor>'"));
    }

    let major = major.parse::<u16>().map_err(|_| invalid("non-numeric major"))?;
    let minor = minor.parse::<u16>().map_err(|_| invalid("non-numeric minor"))?;
    Ok((major, minor))
}
