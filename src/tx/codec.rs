//! Canonical recursive length-prefix encoding of transaction records
//!
//! Two primitive shapes exist: byte strings and lists of items. Every logical
//! value has exactly one accepted encoding; the decoder rejects padded length
//! prefixes, short strings written in long form, single bytes wrapped in a
//! string header and integers with a leading zero byte.
//!
//! Field order is fixed: nonce, gas price, gas limit, recipient, value,
//! payload and, for signed records, `v`, `r`, `s`.

use super::record::{Signature, TransactionRecord};
use crate::error::{AirgapError, AirgapResult};

use ethers::types::{Address, U256};
use sha3::{Digest, Keccak256};

/// Number of fields in an unsigned record
pub const UNSIGNED_FIELDS: usize = 6;
/// Number of fields in a signed record
pub const SIGNED_FIELDS: usize = 9;

const SHORT_STRING: u8 = 0x80;
const LONG_STRING: u8 = 0xb7;
const SHORT_LIST: u8 = 0xc0;
const LONG_LIST: u8 = 0xf7;
const SHORT_LIMIT: usize = 55;

/// Lists may nest this deep; a transaction is a single flat list
const MAX_LIST_DEPTH: usize = 2;

/// A decoded item: either a byte string or a list of items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    /// Encode this item
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            RlpItem::Bytes(bytes) => {
                if bytes.len() == 1 && bytes[0] < SHORT_STRING {
                    out.push(bytes[0]);
                } else {
                    write_header(out, SHORT_STRING, LONG_STRING, bytes.len());
                    out.extend_from_slice(bytes);
                }
            }
            RlpItem::List(items) => {
                let mut payload = Vec::new();
                for item in items {
                    item.encode_into(&mut payload);
                }
                write_header(out, SHORT_LIST, LONG_LIST, payload.len());
                out.extend_from_slice(&payload);
            }
        }
    }

    /// Decode exactly one item spanning the whole input
    pub fn decode(input: &[u8]) -> AirgapResult<Self> {
        let (item, rest) = decode_item(input, 0)?;
        if !rest.is_empty() {
            return Err(malformed(format!("{} trailing bytes after item", rest.len())));
        }
        Ok(item)
    }

    fn into_bytes(self, field: &str) -> AirgapResult<Vec<u8>> {
        match self {
            RlpItem::Bytes(bytes) => Ok(bytes),
            RlpItem::List(_) => Err(malformed(format!("{} must be a byte string", field))),
        }
    }
}

fn write_header(out: &mut Vec<u8>, short: u8, long: u8, len: usize) {
    if len <= SHORT_LIMIT {
        out.push(short + len as u8);
    } else {
        let len_bytes = minimal_be(&(len as u64).to_be_bytes()).to_vec();
        out.push(long + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
}

fn malformed(message: impl Into<String>) -> AirgapError {
    AirgapError::MalformedEncoding(message.into())
}

/// Read a long-form length and check it is canonical
fn read_long_length(input: &[u8], len_of_len: usize) -> AirgapResult<usize> {
    if input.len() < len_of_len {
        return Err(malformed("length prefix runs past end of input"));
    }
    let len_bytes = &input[..len_of_len];
    if len_bytes[0] == 0 {
        return Err(malformed("length prefix has a leading zero byte"));
    }
    if len_of_len > std::mem::size_of::<usize>() {
        return Err(malformed("length prefix too large"));
    }
    let len = len_bytes
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    if len <= SHORT_LIMIT {
        return Err(malformed("long-form length used for a short payload"));
    }
    Ok(len)
}

fn take(input: &[u8], len: usize) -> AirgapResult<(&[u8], &[u8])> {
    if input.len() < len {
        return Err(malformed(format!(
            "declared length {} exceeds the {} remaining bytes",
            len,
            input.len()
        )));
    }
    Ok(input.split_at(len))
}

fn decode_item(input: &[u8], depth: usize) -> AirgapResult<(RlpItem, &[u8])> {
    let (&prefix, rest) = input
        .split_first()
        .ok_or_else(|| malformed("unexpected end of input"))?;

    if prefix >= SHORT_LIST && depth >= MAX_LIST_DEPTH {
        return Err(malformed(format!("lists nested deeper than {}", MAX_LIST_DEPTH)));
    }

    match prefix {
        0x00..=0x7f => Ok((RlpItem::Bytes(vec![prefix]), rest)),
        0x80..=0xb7 => {
            let len = (prefix - SHORT_STRING) as usize;
            let (data, rest) = take(rest, len)?;
            if len == 1 && data[0] < SHORT_STRING {
                return Err(malformed("single byte below 0x80 wrapped in a string header"));
            }
            Ok((RlpItem::Bytes(data.to_vec()), rest))
        }
        0xb8..=0xbf => {
            let len_of_len = (prefix - LONG_STRING) as usize;
            let len = read_long_length(rest, len_of_len)?;
            let (data, rest) = take(&rest[len_of_len..], len)?;
            Ok((RlpItem::Bytes(data.to_vec()), rest))
        }
        0xc0..=0xf7 => {
            let len = (prefix - SHORT_LIST) as usize;
            let (payload, rest) = take(rest, len)?;
            Ok((RlpItem::List(decode_list_payload(payload, depth + 1)?), rest))
        }
        0xf8..=0xff => {
            let len_of_len = (prefix - LONG_LIST) as usize;
            let len = read_long_length(rest, len_of_len)?;
            let (payload, rest) = take(&rest[len_of_len..], len)?;
            Ok((RlpItem::List(decode_list_payload(payload, depth + 1)?), rest))
        }
    }
}

fn decode_list_payload(mut payload: &[u8], depth: usize) -> AirgapResult<Vec<RlpItem>> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, rest) = decode_item(payload, depth)?;
        items.push(item);
        payload = rest;
    }
    Ok(items)
}

/// Strip leading zero bytes
fn minimal_be(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn u64_item(value: u64) -> RlpItem {
    RlpItem::Bytes(minimal_be(&value.to_be_bytes()).to_vec())
}

fn u256_item(value: U256) -> RlpItem {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    RlpItem::Bytes(minimal_be(&buf).to_vec())
}

fn scalar_item(scalar: &[u8; 32]) -> RlpItem {
    RlpItem::Bytes(minimal_be(scalar).to_vec())
}

fn check_integer(bytes: &[u8], max_len: usize, field: &str) -> AirgapResult<()> {
    if bytes.len() > max_len {
        return Err(malformed(format!(
            "{} is {} bytes, limit is {}",
            field,
            bytes.len(),
            max_len
        )));
    }
    if bytes.first() == Some(&0) {
        return Err(malformed(format!("{} has a leading zero byte", field)));
    }
    Ok(())
}

fn decode_u64(item: RlpItem, field: &str) -> AirgapResult<u64> {
    let bytes = item.into_bytes(field)?;
    check_integer(&bytes, 8, field)?;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn decode_u256(item: RlpItem, field: &str) -> AirgapResult<U256> {
    let bytes = item.into_bytes(field)?;
    check_integer(&bytes, 32, field)?;
    Ok(U256::from_big_endian(&bytes))
}

fn decode_scalar(item: RlpItem, field: &str) -> AirgapResult<[u8; 32]> {
    let bytes = item.into_bytes(field)?;
    check_integer(&bytes, 32, field)?;
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

fn decode_recipient(item: RlpItem) -> AirgapResult<Option<Address>> {
    let bytes = item.into_bytes("recipient")?;
    match bytes.len() {
        0 => Ok(None),
        20 => Ok(Some(Address::from_slice(&bytes))),
        n => Err(malformed(format!("recipient must be 0 or 20 bytes, got {}", n))),
    }
}

/// Encode a record, optionally including its signature triple.
///
/// With `include_signature = false` the output is the exact byte sequence
/// whose Keccak-256 digest gets signed.
pub fn encode(record: &TransactionRecord, include_signature: bool) -> Vec<u8> {
    let mut items = vec![
        u64_item(record.nonce),
        u256_item(record.gas_price),
        u64_item(record.gas_limit),
        RlpItem::Bytes(
            record
                .recipient
                .map(|a| a.as_bytes().to_vec())
                .unwrap_or_default(),
        ),
        u256_item(record.value),
        RlpItem::Bytes(record.payload.clone()),
    ];

    if include_signature {
        if let Some(sig) = &record.signature {
            items.push(u64_item(sig.v()));
            items.push(scalar_item(&sig.r));
            items.push(scalar_item(&sig.s));
        }
    }

    RlpItem::List(items).encode()
}

/// Decode a record from its canonical encoding
pub fn decode(bytes: &[u8]) -> AirgapResult<TransactionRecord> {
    let items = match RlpItem::decode(bytes)? {
        RlpItem::List(items) => items,
        RlpItem::Bytes(_) => return Err(malformed("transaction must be a list")),
    };

    match items.len() {
        n if n < UNSIGNED_FIELDS => {
            return Err(AirgapError::IncompleteTransaction(format!(
                "expected at least {} fields, found {}",
                UNSIGNED_FIELDS, n
            )))
        }
        UNSIGNED_FIELDS | SIGNED_FIELDS => {}
        n => {
            return Err(malformed(format!(
                "expected {} or {} fields, found {}",
                UNSIGNED_FIELDS, SIGNED_FIELDS, n
            )))
        }
    }

    let signed = items.len() == SIGNED_FIELDS;
    let mut fields = items.into_iter();
    let mut next = || fields.next().ok_or_else(|| malformed("missing field"));

    let nonce = decode_u64(next()?, "nonce")?;
    let gas_price = decode_u256(next()?, "gas price")?;
    let gas_limit = decode_u64(next()?, "gas limit")?;
    let recipient = decode_recipient(next()?)?;
    let value = decode_u256(next()?, "value")?;
    let payload = next()?.into_bytes("payload")?;

    let signature = if signed {
        let v = decode_u64(next()?, "v")?;
        let r = decode_scalar(next()?, "r")?;
        let s = decode_scalar(next()?, "s")?;
        Some(Signature::from_v(v, r, s)?)
    } else {
        None
    };

    Ok(TransactionRecord {
        nonce,
        gas_price,
        gas_limit,
        recipient,
        value,
        payload,
        signature,
    })
}

/// Keccak-256 digest of the unsigned encoding
pub fn signing_digest(record: &TransactionRecord) -> [u8; 32] {
    keccak256(&encode(record, false))
}

/// Keccak-256 of arbitrary bytes
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    Keccak256::digest(bytes).into()
}
