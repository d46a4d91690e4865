//! Hardware signing device: command framing and response decoding
//!
//! Two commands are used. `GetAddress` returns the address derived from a
//! path so the operator can check the sender without exposing the key, and
//! `SignTransaction` returns a signature over the unsigned encoding. Device
//! generations differ in how the signature comes back, see [`ResponseFormat`].

use super::path::DerivationPath;
use super::transport::{DeviceTransport, STATUS_WORD_LEN};
use super::{SigningBackend, SigningRequest};
use crate::error::{AirgapError, AirgapResult, DeviceError, DeviceResult};
use crate::tx::codec::keccak256;
use crate::tx::record::normalize_recovery_id;
use crate::tx::Signature;

use async_trait::async_trait;
use ethers::types::Address;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub const CLA: u8 = 0xe0;
pub const INS_GET_ADDRESS: u8 = 0x02;
pub const INS_SIGN: u8 = 0x04;
pub const INS_VERIFY_PIN: u8 = 0x22;

const P1_FIRST_CHUNK: u8 = 0x00;
const P1_MORE_CHUNKS: u8 = 0x80;
const P1_NO_CONFIRM: u8 = 0x00;
const P1_CONFIRM: u8 = 0x01;

/// Data bytes that fit in a single command
pub const MAX_CHUNK: usize = 255;

const SW_OK: u16 = 0x9000;
const SW_SECURITY_NOT_SATISFIED: u16 = 0x6982;
const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;

/// Signature layout returned by a device generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// `[v, r(32), s(32)]`
    Fixed,
    /// DER signature whose first byte carries the parity of R; the recovery
    /// id is found by trying both candidates against the device address
    Structured,
}

impl std::str::FromStr for ResponseFormat {
    type Err = AirgapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(ResponseFormat::Fixed),
            "structured" => Ok(ResponseFormat::Structured),
            other => Err(AirgapError::Validation(format!(
                "unknown device response format '{}'",
                other
            ))),
        }
    }
}

/// Timing and display options for device commands
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Budget for the whole sign command, including operator confirmation
    pub sign_timeout: Duration,
    /// Budget for every other command
    pub command_timeout: Duration,
    /// Ask the device to display the address for confirmation
    pub confirm_address: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            sign_timeout: Duration::from_secs(60),
            command_timeout: Duration::from_secs(10),
            confirm_address: false,
        }
    }
}

/// Build a single APDU; `data` must fit the one-byte `Lc`
pub fn build_apdu(ins: u8, p1: u8, p2: u8, data: &[u8]) -> AirgapResult<Vec<u8>> {
    let lc = u8::try_from(data.len()).map_err(|_| {
        AirgapError::Validation(format!(
            "device command data is {} bytes, limit is {}",
            data.len(),
            MAX_CHUNK
        ))
    })?;
    let mut apdu = Vec::with_capacity(5 + data.len());
    apdu.extend_from_slice(&[CLA, ins, p1, p2, lc]);
    apdu.extend_from_slice(data);
    Ok(apdu)
}

pub fn get_address_apdu(path: &DerivationPath, confirm: bool) -> AirgapResult<Vec<u8>> {
    let p1 = if confirm { P1_CONFIRM } else { P1_NO_CONFIRM };
    build_apdu(INS_GET_ADDRESS, p1, 0x00, &path.encode())
}

pub fn verify_pin_apdu(pin: &str) -> AirgapResult<Vec<u8>> {
    build_apdu(INS_VERIFY_PIN, 0x00, 0x00, pin.as_bytes())
}

/// Sign commands: the first carries the path and the start of the encoding,
/// the rest carry the remainder in chunks of at most [`MAX_CHUNK`] bytes
pub fn sign_apdus(path: &DerivationPath, encoding: &[u8]) -> AirgapResult<Vec<Vec<u8>>> {
    let mut data = path.encode();
    data.extend_from_slice(encoding);

    data.chunks(MAX_CHUNK)
        .enumerate()
        .map(|(i, chunk)| {
            let p1 = if i == 0 { P1_FIRST_CHUNK } else { P1_MORE_CHUNKS };
            build_apdu(INS_SIGN, p1, 0x00, chunk)
        })
        .collect()
}

/// Split a reply into data and status word, mapping failure statuses
pub fn split_status(reply: &[u8]) -> DeviceResult<&[u8]> {
    if reply.len() < STATUS_WORD_LEN {
        return Err(DeviceError::MalformedResponse(
            "reply shorter than a status word".to_string(),
        ));
    }
    let (data, sw) = reply.split_at(reply.len() - STATUS_WORD_LEN);
    let sw = u16::from_be_bytes([sw[0], sw[1]]);

    match sw {
        SW_OK => Ok(data),
        SW_SECURITY_NOT_SATISFIED => Err(DeviceError::AuthenticationFailed),
        sw if sw & 0xfff0 == 0x63c0 => Err(DeviceError::AuthenticationFailed),
        SW_CONDITIONS_NOT_SATISFIED => Err(DeviceError::Rejected),
        sw => Err(DeviceError::Status(sw)),
    }
}

/// Reduce a big-endian scalar to exactly 32 bytes.
///
/// A 33-byte value with a leading zero pad loses the pad; shorter values are
/// left-padded.
pub fn normalize_scalar(bytes: &[u8]) -> DeviceResult<[u8; 32]> {
    let bytes = match bytes.len() {
        33 if bytes[0] == 0 => &bytes[1..],
        n if n > 32 => {
            return Err(DeviceError::MalformedResponse(format!(
                "scalar of {} bytes",
                n
            )))
        }
        _ => bytes,
    };
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

/// Address from a `GetAddress` reply:
/// `[pk_len, pubkey, addr_len, ascii hex address, ...]`
pub fn parse_address_response(data: &[u8]) -> DeviceResult<Address> {
    let malformed = |m: &str| DeviceError::MalformedResponse(format!("address reply: {}", m));

    let pk_len = *data.first().ok_or_else(|| malformed("empty"))? as usize;
    let pubkey = data.get(1..1 + pk_len).ok_or_else(|| malformed("truncated key"))?;
    let addr_len = *data.get(1 + pk_len).ok_or_else(|| malformed("missing address"))? as usize;
    let ascii = data
        .get(2 + pk_len..2 + pk_len + addr_len)
        .ok_or_else(|| malformed("truncated address"))?;

    let text = std::str::from_utf8(ascii).map_err(|_| malformed("address is not ascii"))?;
    let text = text.strip_prefix("0x").unwrap_or(text);
    let raw = hex::decode(text).map_err(|_| malformed("address is not hex"))?;
    if raw.len() != 20 {
        return Err(malformed("address is not 20 bytes"));
    }
    let address = Address::from_slice(&raw);

    // uncompressed secp256k1 key: the address is the tail of its hash
    if pk_len == 65 && pubkey[0] == 0x04 {
        let derived = Address::from_slice(&keccak256(&pubkey[1..])[12..]);
        if derived != address {
            return Err(malformed("address does not match public key"));
        }
    }

    Ok(address)
}

/// A scalar carries a zero pad only when its top bit is set
fn is_padded(field: &[u8]) -> bool {
    field.len() > 1 && field[0] == 0 && field[1] & 0x80 != 0
}

/// `[v, r(32), s(32)]`, where `r` and `s` may each carry one zero pad byte
pub fn parse_fixed_response(data: &[u8]) -> DeviceResult<(u64, [u8; 32], [u8; 32])> {
    let malformed = |m: String| DeviceError::MalformedResponse(format!("fixed signature: {}", m));

    let (&v, scalars) = data
        .split_first()
        .ok_or_else(|| malformed("empty reply".to_string()))?;
    let r_len = match scalars.len() {
        64 => 32,
        65 if is_padded(scalars) => 33,
        65 if is_padded(&scalars[32..]) => 32,
        66 if is_padded(scalars) && is_padded(&scalars[33..]) => 33,
        n => {
            return Err(malformed(format!(
                "{} bytes of r and s, expected 64 plus optional zero pads",
                n
            )))
        }
    };

    let (r, s) = scalars.split_at(r_len);
    Ok((v as u64, normalize_scalar(r)?, normalize_scalar(s)?))
}

/// DER `30|parity, len, 02, r_len, r, 02, s_len, s`; returns the parity bit
pub fn parse_structured_response(data: &[u8]) -> DeviceResult<(u8, [u8; 32], [u8; 32])> {
    let malformed = |m: &str| DeviceError::MalformedResponse(format!("structured signature: {}", m));

    if data.len() < 8 {
        return Err(malformed("too short"));
    }
    if data[0] & 0xfe != 0x30 {
        return Err(malformed("not a sequence"));
    }
    let parity = data[0] & 0x01;
    if data[1] as usize != data.len() - 2 {
        return Err(malformed("sequence length does not match reply"));
    }

    if data[2] != 0x02 {
        return Err(malformed("missing r marker"));
    }
    let r_len = data[3] as usize;
    let r = data.get(4..4 + r_len).ok_or_else(|| malformed("truncated r"))?;

    if data.get(4 + r_len) != Some(&0x02) {
        return Err(malformed("missing s marker"));
    }
    let s_len = *data.get(5 + r_len).ok_or_else(|| malformed("missing s length"))? as usize;
    let s = data
        .get(6 + r_len..6 + r_len + s_len)
        .ok_or_else(|| malformed("truncated s"))?;
    if 6 + r_len + s_len != data.len() {
        return Err(malformed("trailing bytes after s"));
    }

    Ok((parity, normalize_scalar(r)?, normalize_scalar(s)?))
}

/// Pick the first candidate recovery id whose recovered address is `expected`
fn select_recovery_id(
    candidates: &[u8],
    r: [u8; 32],
    s: [u8; 32],
    digest: [u8; 32],
    expected: Address,
) -> AirgapResult<Signature> {
    for &id in candidates {
        let signature = Signature::new(id, r, s)?;
        match signature.recover(digest) {
            Ok(address) if address == expected => return Ok(signature),
            _ => continue,
        }
    }
    Err(DeviceError::MalformedResponse(format!(
        "signature does not recover to device address {:?}",
        expected
    ))
    .into())
}

/// Signing backend holding a key inside an external device
pub struct HardwareDevice {
    transport: Mutex<Box<dyn DeviceTransport>>,
    path: DerivationPath,
    format: ResponseFormat,
    pin: Option<Zeroizing<String>>,
    options: DeviceOptions,
}

impl HardwareDevice {
    pub fn new(
        transport: Box<dyn DeviceTransport>,
        path: DerivationPath,
        format: ResponseFormat,
        options: DeviceOptions,
    ) -> Self {
        Self {
            transport: Mutex::new(transport),
            path,
            format,
            pin: None,
            options,
        }
    }

    /// PIN sent before signing on devices that need it
    pub fn with_pin(mut self, pin: Zeroizing<String>) -> Self {
        self.pin = Some(pin);
        self
    }

    pub fn path(&self) -> &DerivationPath {
        &self.path
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Run `apdus` in order under one time budget, returning the last reply's data
    async fn command(
        &self,
        apdus: &[Vec<u8>],
        operation: &str,
        budget: Duration,
    ) -> DeviceResult<Vec<u8>> {
        let mut transport = self.transport.lock().await;

        let exchange = async {
            let mut last = Vec::new();
            for apdu in apdus {
                let reply = transport.exchange(apdu).await?;
                last = split_status(&reply)?.to_vec();
            }
            Ok::<_, DeviceError>(last)
        };

        tokio::time::timeout(budget, exchange)
            .await
            .map_err(|_| DeviceError::Timeout {
                operation: operation.to_string(),
                secs: budget.as_secs(),
            })?
    }

    /// Address of the key at this device's path
    pub async fn get_address(&self) -> AirgapResult<Address> {
        let apdu = get_address_apdu(&self.path, self.options.confirm_address)?;
        let budget = if self.options.confirm_address {
            self.options.sign_timeout
        } else {
            self.options.command_timeout
        };

        let data = self.command(&[apdu], "get address", budget).await?;
        let address = parse_address_response(&data)?;
        info!("Device address for {}: {:?}", self.path, address);
        Ok(address)
    }

    async fn verify_pin(&self, pin: &str) -> AirgapResult<()> {
        let apdus = Zeroizing::new(vec![verify_pin_apdu(pin)?]);
        self.command(&apdus, "verify pin", self.options.command_timeout)
            .await?;
        debug!("Device PIN accepted");
        Ok(())
    }

    async fn sign_transaction(&self, request: &SigningRequest<'_>) -> AirgapResult<Signature> {
        let expected = self.get_address().await?;

        let apdus = sign_apdus(&self.path, request.encoding)?;
        info!(
            "Confirm the transaction on the device ({} command(s), {}s budget)",
            apdus.len(),
            self.options.sign_timeout.as_secs()
        );
        let data = self
            .command(&apdus, "sign transaction", self.options.sign_timeout)
            .await?;

        match self.format {
            ResponseFormat::Fixed => {
                let (v, r, s) = parse_fixed_response(&data)?;
                let id = normalize_recovery_id(v).ok_or_else(|| {
                    DeviceError::MalformedResponse(format!("unexpected v value {}", v))
                })?;
                select_recovery_id(&[id], r, s, request.digest, expected)
            }
            ResponseFormat::Structured => {
                let (parity, r, s) = parse_structured_response(&data)?;
                select_recovery_id(&[parity, parity ^ 1], r, s, request.digest, expected)
            }
        }
    }
}

#[async_trait]
impl SigningBackend for HardwareDevice {
    async fn sign(&self, request: &SigningRequest<'_>) -> AirgapResult<Signature> {
        if let Some(pin) = &self.pin {
            self.verify_pin(pin).await?;
        }
        self.sign_transaction(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceResult;
    use ethers::signers::{LocalWallet, Signer};
    use ethers::types::H256;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    /// Replays canned replies and records every APDU it receives
    struct ScriptedTransport {
        replies: VecDeque<Vec<u8>>,
        sent: Arc<StdMutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl DeviceTransport for ScriptedTransport {
        async fn exchange(&mut self, apdu: &[u8]) -> DeviceResult<Vec<u8>> {
            self.sent.lock().unwrap().push(apdu.to_vec());
            self.replies
                .pop_front()
                .ok_or_else(|| DeviceError::Unavailable("script exhausted".into()))
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl DeviceTransport for StalledTransport {
        async fn exchange(&mut self, _apdu: &[u8]) -> DeviceResult<Vec<u8>> {
            std::future::pending::<DeviceResult<Vec<u8>>>().await
        }
    }

    fn ok(mut data: Vec<u8>) -> Vec<u8> {
        data.extend_from_slice(&[0x90, 0x00]);
        data
    }

    fn wallet() -> LocalWallet {
        KEY.parse().unwrap()
    }

    fn address_reply(wallet: &LocalWallet) -> Vec<u8> {
        let pubkey = wallet.signer().verifying_key().to_encoded_point(false);
        let pubkey = pubkey.as_bytes();
        let ascii = hex::encode(wallet.address().as_bytes());

        let mut data = vec![pubkey.len() as u8];
        data.extend_from_slice(pubkey);
        data.push(ascii.len() as u8);
        data.extend_from_slice(ascii.as_bytes());
        ok(data)
    }

    fn der_int(scalar: &[u8; 32]) -> Vec<u8> {
        if scalar[0] & 0x80 != 0 {
            let mut out = vec![0];
            out.extend_from_slice(scalar);
            out
        } else {
            let start = scalar.iter().position(|b| *b != 0).unwrap_or(31);
            scalar[start..].to_vec()
        }
    }

    fn structured_reply(parity: u8, r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
        let r = der_int(r);
        let s = der_int(s);
        let mut data = vec![0x30 | parity, (4 + r.len() + s.len()) as u8, 0x02, r.len() as u8];
        data.extend_from_slice(&r);
        data.push(0x02);
        data.push(s.len() as u8);
        data.extend_from_slice(&s);
        ok(data)
    }

    fn scalars(sig: &ethers::types::Signature) -> ([u8; 32], [u8; 32]) {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        sig.r.to_big_endian(&mut r);
        sig.s.to_big_endian(&mut s);
        (r, s)
    }

    fn device(
        replies: Vec<Vec<u8>>,
        format: ResponseFormat,
    ) -> (HardwareDevice, Arc<StdMutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = ScriptedTransport {
            replies: replies.into(),
            sent: sent.clone(),
        };
        let device = HardwareDevice::new(
            Box::new(transport),
            "44'/60'/0'/0".parse().unwrap(),
            format,
            DeviceOptions::default(),
        );
        (device, sent)
    }

    fn request_parts() -> (Vec<u8>, [u8; 32]) {
        let encoding = hex::decode(
            "e9098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080",
        )
        .unwrap();
        let digest = keccak256(&encoding);
        (encoding, digest)
    }

    #[test]
    fn test_sign_apdu_layout() {
        let path: DerivationPath = "44'/60'/0'/0".parse().unwrap();
        let apdus = sign_apdus(&path, &[0xc1, 0x80]).unwrap();
        assert_eq!(apdus.len(), 1);
        let apdu = &apdus[0];
        assert_eq!(&apdu[..4], &[0xe0, 0x04, 0x00, 0x00]);
        assert_eq!(apdu[4] as usize, 17 + 2);
        assert_eq!(apdu[5], 4);
        assert_eq!(&apdu[6..10], &[0x80, 0, 0, 44]);
        assert_eq!(&apdu[apdu.len() - 2..], &[0xc1, 0x80]);
    }

    #[test]
    fn test_sign_apdu_chunking() {
        let path: DerivationPath = "44'/60'/0'/0".parse().unwrap();
        let encoding = vec![0x42; 600];
        let apdus = sign_apdus(&path, &encoding).unwrap();

        assert_eq!(apdus.len(), 3);
        assert_eq!(apdus[0][2], P1_FIRST_CHUNK);
        assert_eq!(apdus[1][2], P1_MORE_CHUNKS);
        assert_eq!(apdus[2][2], P1_MORE_CHUNKS);
        let total: usize = apdus.iter().map(|a| a[4] as usize).sum();
        assert_eq!(total, 17 + 600);
        assert!(apdus.iter().all(|a| a.len() - 5 == a[4] as usize));
    }

    #[test]
    fn test_normalize_scalar() {
        let mut padded = vec![0u8];
        padded.extend_from_slice(&[0xff; 32]);
        assert_eq!(normalize_scalar(&padded).unwrap(), [0xff; 32]);

        let short = normalize_scalar(&[0x01, 0x02]).unwrap();
        assert_eq!(short[30..], [0x01, 0x02]);
        assert_eq!(short[..30], [0u8; 30]);

        assert!(normalize_scalar(&[0x01; 33]).is_err());
    }

    #[test]
    fn test_status_words() {
        assert_eq!(split_status(&[0xaa, 0x90, 0x00]).unwrap(), &[0xaa]);
        assert!(matches!(
            split_status(&[0x69, 0x82]),
            Err(DeviceError::AuthenticationFailed)
        ));
        assert!(matches!(
            split_status(&[0x63, 0xc2]),
            Err(DeviceError::AuthenticationFailed)
        ));
        assert!(matches!(split_status(&[0x69, 0x85]), Err(DeviceError::Rejected)));
        assert!(matches!(
            split_status(&[0x6a, 0x80]),
            Err(DeviceError::Status(0x6a80))
        ));
        assert!(split_status(&[0x90]).is_err());
    }

    #[tokio::test]
    async fn test_get_address() {
        let wallet = wallet();
        let (device, sent) = device(vec![address_reply(&wallet)], ResponseFormat::Fixed);

        assert_eq!(device.get_address().await.unwrap(), wallet.address());
        let sent = sent.lock().unwrap();
        assert_eq!(&sent[0][..4], &[0xe0, 0x02, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_fixed_response_signature() {
        let wallet = wallet();
        let (encoding, digest) = request_parts();
        let sig = wallet.sign_hash(H256::from(digest)).unwrap();
        let (r, s) = scalars(&sig);

        let mut fixed = vec![sig.v as u8];
        fixed.extend_from_slice(&r);
        fixed.extend_from_slice(&s);

        let (device, _) = device(
            vec![address_reply(&wallet), ok(fixed)],
            ResponseFormat::Fixed,
        );
        let request = SigningRequest {
            digest,
            encoding: &encoding,
        };
        let signature = device.sign(&request).await.unwrap();

        assert_eq!(signature.r, r);
        assert_eq!(signature.s, s);
        assert_eq!(signature.recover(digest).unwrap(), wallet.address());
    }

    #[tokio::test]
    async fn test_structured_response_finds_recovery_id() {
        let wallet = wallet();
        let (encoding, digest) = request_parts();
        let sig = wallet.sign_hash(H256::from(digest)).unwrap();
        let (r, s) = scalars(&sig);
        let true_id = (sig.v - 27) as u8;

        // a wrong parity hint must still resolve to the device address
        for parity in [true_id, true_id ^ 1] {
            let (device, _) = device(
                vec![address_reply(&wallet), structured_reply(parity, &r, &s)],
                ResponseFormat::Structured,
            );
            let request = SigningRequest {
                digest,
                encoding: &encoding,
            };
            let signature = device.sign(&request).await.unwrap();
            assert_eq!(signature.recovery_id, true_id);
            assert_eq!(signature.recover(digest).unwrap(), wallet.address());
        }
    }

    #[test]
    fn test_structured_strips_zero_pad() {
        let mut r = [0x11; 32];
        r[0] = 0x80;
        let s = [0x22; 32];
        let reply = structured_reply(1, &r, &s);
        // r is DER-padded to 33 bytes
        assert_eq!(reply[3], 33);

        let (parity, pr, ps) = parse_structured_response(&reply[..reply.len() - 2]).unwrap();
        assert_eq!(parity, 1);
        assert_eq!(pr, r);
        assert_eq!(ps, s);
    }

    #[tokio::test]
    async fn test_signature_from_other_key_is_rejected() {
        let wallet = wallet();
        let other = LocalWallet::new(&mut rand::thread_rng());
        let (encoding, digest) = request_parts();
        let sig = other.sign_hash(H256::from(digest)).unwrap();
        let (r, s) = scalars(&sig);

        let (device, _) = device(
            vec![address_reply(&wallet), structured_reply(0, &r, &s)],
            ResponseFormat::Structured,
        );
        let request = SigningRequest {
            digest,
            encoding: &encoding,
        };
        assert!(matches!(
            device.sign(&request).await,
            Err(AirgapError::Device(DeviceError::MalformedResponse(_)))
        ));
    }

    #[tokio::test]
    async fn test_wrong_pin() {
        let (device, sent) = device(vec![vec![0x63, 0xc2]], ResponseFormat::Structured);
        let device = device.with_pin(Zeroizing::new("1234".to_string()));
        let (encoding, digest) = request_parts();
        let request = SigningRequest {
            digest,
            encoding: &encoding,
        };

        assert!(matches!(
            device.sign(&request).await,
            Err(AirgapError::Device(DeviceError::AuthenticationFailed))
        ));
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][..2], &[0xe0, INS_VERIFY_PIN]);
    }

    #[tokio::test]
    async fn test_rejected_on_device() {
        let wallet = wallet();
        let (device, _) = device(
            vec![address_reply(&wallet), vec![0x69, 0x85]],
            ResponseFormat::Fixed,
        );
        let (encoding, digest) = request_parts();
        let request = SigningRequest {
            digest,
            encoding: &encoding,
        };
        assert!(matches!(
            device.sign(&request).await,
            Err(AirgapError::Device(DeviceError::Rejected))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_timeout() {
        let device = HardwareDevice::new(
            Box::new(StalledTransport),
            "44'/60'/0'/0".parse().unwrap(),
            ResponseFormat::Fixed,
            DeviceOptions::default(),
        );
        let (encoding, _) = request_parts();
        let apdus = sign_apdus(device.path(), &encoding).unwrap();

        let err = device
            .command(&apdus, "sign transaction", device.options.sign_timeout)
            .await
            .unwrap_err();
        match err {
            DeviceError::Timeout { secs, .. } => assert_eq!(secs, 60),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fixed_response_zero_pads() {
        let mut r = [0x11; 32];
        r[0] = 0x91;
        let s = [0xa2; 32];

        let mut plain = vec![28u8];
        plain.extend_from_slice(&r);
        plain.extend_from_slice(&s);
        assert_eq!(parse_fixed_response(&plain).unwrap(), (28, r, s));

        let mut r_padded = vec![28u8, 0x00];
        r_padded.extend_from_slice(&r);
        r_padded.extend_from_slice(&s);
        assert_eq!(parse_fixed_response(&r_padded).unwrap(), (28, r, s));

        let mut s_padded = vec![27u8];
        s_padded.extend_from_slice(&r);
        s_padded.push(0x00);
        s_padded.extend_from_slice(&s);
        assert_eq!(parse_fixed_response(&s_padded).unwrap(), (27, r, s));

        let mut both = vec![27u8, 0x00];
        both.extend_from_slice(&r);
        both.push(0x00);
        both.extend_from_slice(&s);
        assert_eq!(parse_fixed_response(&both).unwrap(), (27, r, s));

        // an extra byte that is not a pad
        let mut junk = plain.clone();
        junk.push(0x01);
        assert!(matches!(
            parse_fixed_response(&junk),
            Err(DeviceError::MalformedResponse(_))
        ));
        assert!(parse_fixed_response(&plain[..64]).is_err());
    }

    #[test]
    fn test_structured_length_checks() {
        let r = [0x11; 32];
        let s = [0x22; 32];
        let reply = structured_reply(0, &r, &s);
        let data = &reply[..reply.len() - 2];
        assert!(parse_structured_response(data).is_ok());

        let mut trailing = data.to_vec();
        trailing.push(0x00);
        assert!(matches!(
            parse_structured_response(&trailing),
            Err(DeviceError::MalformedResponse(_))
        ));

        // sequence length that also covers the extra byte
        trailing[1] += 1;
        assert!(matches!(
            parse_structured_response(&trailing),
            Err(DeviceError::MalformedResponse(_))
        ));

        let mut short_seq = data.to_vec();
        short_seq[1] -= 1;
        assert!(matches!(
            parse_structured_response(&short_seq),
            Err(DeviceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_oversized_command_data_rejected() {
        assert_eq!(build_apdu(INS_SIGN, 0, 0, &[0xaa; 255]).unwrap()[4], 0xff);
        assert!(matches!(
            build_apdu(INS_SIGN, 0, 0, &[0xaa; 256]),
            Err(AirgapError::Validation(_))
        ));
        assert!(verify_pin_apdu(&"1".repeat(300)).is_err());
        assert_eq!(&verify_pin_apdu("1234").unwrap()[..5], &[0xe0, 0x22, 0x00, 0x00, 4]);
    }

    #[test]
    fn test_response_format_from_str() {
        assert_eq!("fixed".parse::<ResponseFormat>().unwrap(), ResponseFormat::Fixed);
        assert_eq!(
            "Structured".parse::<ResponseFormat>().unwrap(),
            ResponseFormat::Structured
        );
        assert!("v3".parse::<ResponseFormat>().is_err());
    }
}
