//! Peer wire protocol.
//!
//! Newline-delimited UTF-8 text over one persistent TCP connection per
//! peer:
//!
//! ```text
//! <address>                                  -- handshake
//! STORE:<key>:<base64(shard)>
//! FETCH:<key>:<requestId>
//! RESP:<base64(shard-or-empty)>:<requestId>
//! ```
//!
//! Anything that is not one of the three commands is a handshake.

use base64::prelude::*;
use bytes::Bytes;

use crate::error::{Error, Result};

const STORE_PREFIX: &str = "STORE:";
const FETCH_PREFIX: &str = "FETCH:";
const RESP_PREFIX: &str = "RESP:";

/// One line of the peer protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Sender announces its own address
    Handshake(String),
    /// Store `shard` as the receiver's shard for `key`
    Store { key: String, shard: Bytes },
    /// Ask for the receiver's shard for `key`
    Fetch { key: String, request_id: String },
    /// Answer to a `Fetch`; `None` when the receiver holds nothing
    Response {
        shard: Option<Bytes>,
        request_id: String,
    },
}

impl PeerMessage {
    /// Render as a wire line, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            PeerMessage::Handshake(address) => address.clone(),
            PeerMessage::Store { key, shard } => {
                format!("{}{}:{}", STORE_PREFIX, key, BASE64_STANDARD.encode(shard))
            }
            PeerMessage::Fetch { key, request_id } => {
                format!("{}{}:{}", FETCH_PREFIX, key, request_id)
            }
            PeerMessage::Response { shard, request_id } => {
                let encoded = shard
                    .as_ref()
                    .map(|s| BASE64_STANDARD.encode(s))
                    .unwrap_or_default();
                format!("{}{}:{}", RESP_PREFIX, encoded, request_id)
            }
        }
    }

    /// Parse one line (trailing `\r`/`\n` already stripped or not).
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(rest) = line.strip_prefix(STORE_PREFIX) {
            let (key, encoded) = split_fields(rest, "STORE")?;
            return Ok(PeerMessage::Store {
                key: non_empty_key(key)?,
                shard: decode_shard(encoded)?,
            });
        }
        if let Some(rest) = line.strip_prefix(FETCH_PREFIX) {
            let (key, request_id) = split_fields(rest, "FETCH")?;
            return Ok(PeerMessage::Fetch {
                key: non_empty_key(key)?,
                request_id: request_id.to_string(),
            });
        }
        if let Some(rest) = line.strip_prefix(RESP_PREFIX) {
            let (encoded, request_id) = split_fields(rest, "RESP")?;
            let shard = if encoded.is_empty() {
                None
            } else {
                Some(decode_shard(encoded)?)
            };
            return Ok(PeerMessage::Response {
                shard,
                request_id: request_id.to_string(),
            });
        }

        Ok(PeerMessage::Handshake(line.trim().to_string()))
    }
}

fn split_fields<'a>(rest: &'a str, command: &str) -> Result<(&'a str, &'a str)> {
    rest.split_once(':')
        .ok_or_else(|| Error::Protocol(format!("{} line is missing a field", command)))
}

fn non_empty_key(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(Error::Protocol("empty key".to_string()));
    }
    Ok(key.to_string())
}

fn decode_shard(encoded: &str) -> Result<Bytes> {
    BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map(Bytes::from)
        .map_err(|e| Error::Protocol(format!("Invalid base64 shard: {}", e)))
}
