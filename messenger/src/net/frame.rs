//! Tagged application frames and their zlib wrapper.
//!
//! Every message exchanged over a peer connection is one frame: a zlib
//! stream whose decompressed payload starts with an ASCII tag and
//! continues with the tag-specific body (canonical JSON for blocks,
//! transactions, and chains). Payloads with an unknown tag are carried
//! opaquely and rebroadcast verbatim.

use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use chain::{Block, Transaction};

pub const TAG_NEW_BLOCK: &[u8] = b"NEW_BLOCK";
pub const TAG_NEW_TRANSACTION: &[u8] = b"NEW_TRANSACTION";
pub const TAG_REQUEST_CHAIN: &[u8] = b"REQUEST_CHAIN";
pub const TAG_BLOCKCHAIN: &[u8] = b"BLOCKCHAIN";
pub const TAG_NEW_MESSAGE: &[u8] = b"NEW_MESSAGE";

/// Errors raised while turning bytes back into frames.
#[derive(Debug)]
pub enum DecodeError {
    /// The zlib stream was truncated or corrupt.
    Compression(std::io::Error),
    /// The tag body was not the expected JSON.
    Json(serde_json::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Compression(e) => write!(f, "bad compressed frame: {e}"),
            DecodeError::Json(e) => write!(f, "bad frame body: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// One decoded application message.
#[derive(Clone, Debug)]
pub enum Frame {
    /// Gossip of a freshly mined block.
    NewBlock(Block),
    /// Gossip of a new pending transaction.
    NewTransaction(Transaction),
    /// Ask the peer to broadcast its chain.
    RequestChain,
    /// Full-chain reply to `RequestChain`.
    Blockchain(Vec<Block>),
    /// Reserved placeholder tag; handled as a no-op.
    NewMessage,
    /// Unknown tag; the raw payload is rebroadcast verbatim.
    Other(Vec<u8>),
}

impl Frame {
    /// Serializes the frame into its uncompressed payload (tag + body).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::NewBlock(block) => tagged(TAG_NEW_BLOCK, json_bytes(block)),
            Frame::NewTransaction(tx) => tagged(TAG_NEW_TRANSACTION, json_bytes(tx)),
            Frame::RequestChain => TAG_REQUEST_CHAIN.to_vec(),
            Frame::Blockchain(blocks) => tagged(TAG_BLOCKCHAIN, json_bytes(blocks)),
            Frame::NewMessage => TAG_NEW_MESSAGE.to_vec(),
            Frame::Other(payload) => payload.clone(),
        }
    }

    /// Parses an uncompressed payload by its leading tag.
    ///
    /// Tag dispatch mirrors the wire contract: known tags get their JSON
    /// body decoded, everything else is opaque. Only a malformed body of
    /// a known tag is an error.
    pub fn decode(payload: &[u8]) -> Result<Frame, DecodeError> {
        if let Some(body) = payload.strip_prefix(TAG_NEW_BLOCK) {
            return Ok(Frame::NewBlock(
                serde_json::from_slice(body).map_err(DecodeError::Json)?,
            ));
        }
        if let Some(body) = payload.strip_prefix(TAG_NEW_TRANSACTION) {
            return Ok(Frame::NewTransaction(
                serde_json::from_slice(body).map_err(DecodeError::Json)?,
            ));
        }
        if payload.starts_with(TAG_REQUEST_CHAIN) {
            return Ok(Frame::RequestChain);
        }
        if let Some(body) = payload.strip_prefix(TAG_BLOCKCHAIN) {
            return Ok(Frame::Blockchain(
                serde_json::from_slice(body).map_err(DecodeError::Json)?,
            ));
        }
        if payload.starts_with(TAG_NEW_MESSAGE) {
            return Ok(Frame::NewMessage);
        }
        Ok(Frame::Other(payload.to_vec()))
    }
}

fn tagged(tag: &[u8], body: Vec<u8>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(tag.len() + body.len());
    payload.extend_from_slice(tag);
    payload.extend_from_slice(&body);
    payload
}

fn json_bytes<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("wire types serialize to JSON")
}

/// Compresses a payload into one complete zlib stream.
pub fn deflate(payload: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .and_then(|_| encoder.finish())
        .expect("writing to an in-memory zlib encoder cannot fail")
}

/// Decompresses one complete zlib stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut payload = Vec::new();
    decoder
        .read_to_end(&mut payload)
        .map_err(DecodeError::Compression)?;
    Ok(payload)
}
