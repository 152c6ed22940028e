//! secp256k1 signing and EIP-191 personal-message recovery
//!
//! Signatures travel as 65-byte `r ‖ s ‖ v` hex strings, the same layout
//! wallet libraries produce for `personal_sign`.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::address::EvmAddress;
use crate::error::ChainError;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Hash of `"\x19Ethereum Signed Message:\n" ‖ len(message) ‖ message`
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Parse a 65-byte hex signature. `v` may be 0/1 or 27/28.
fn parse_signature(signature_hex: &str) -> Result<(Signature, RecoveryId), ChainError> {
    let trimmed = signature_hex.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| ChainError::InvalidSignature(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(ChainError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let v = match bytes[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        other => {
            return Err(ChainError::InvalidSignature(format!(
                "unsupported recovery byte {}",
                other
            )));
        }
    };

    let mut signature = Signature::from_slice(&bytes[..64])
        .map_err(|e| ChainError::InvalidSignature(e.to_string()))?;
    let mut recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| ChainError::InvalidSignature(format!("bad recovery id {}", v)))?;

    // k256 only verifies low-S signatures; flip parity alongside s
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    Ok((signature, recovery_id))
}

/// Recover the address that produced `signature_hex` over `prehash`
pub fn recover_address(prehash: &[u8; 32], signature_hex: &str) -> Result<EvmAddress, ChainError> {
    let (signature, recovery_id) = parse_signature(signature_hex)?;
    let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id)
        .map_err(|e| ChainError::Recovery(e.to_string()))?;
    Ok(EvmAddress::from_verifying_key(&key))
}

/// A secp256k1 account key held in memory
#[derive(Clone)]
pub struct EthSigner {
    key: SigningKey,
    address: EvmAddress,
}

impl EthSigner {
    /// Load from a hex private key (with or without 0x)
    pub fn from_hex(private_key: &str) -> Result<Self, ChainError> {
        let trimmed = private_key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|_| ChainError::InvalidKey)?;
        if bytes.len() != 32 {
            return Err(ChainError::InvalidKey);
        }
        let key = SigningKey::from_slice(&bytes).map_err(|_| ChainError::InvalidKey)?;
        Ok(Self::from_key(key))
    }

    /// Fresh key from the OS RNG
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    fn from_key(key: SigningKey) -> Self {
        let address = EvmAddress::from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> EvmAddress {
        self.address
    }

    /// Hex private key with 0x prefix. Only the key generator prints this.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.key.to_bytes()))
    }

    /// Sign a 32-byte digest, returning the 64-byte `r ‖ s` and the parity bit
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<([u8; 64], u8), ChainError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let mut rs = [0u8; 64];
        rs.copy_from_slice(&signature.to_bytes());
        Ok((rs, recovery_id.to_byte()))
    }

    /// `personal_sign` over a text message, as 0x-prefixed 65-byte hex
    pub fn sign_message(&self, message: &str) -> Result<String, ChainError> {
        let (rs, parity) = self.sign_prehash(&personal_message_hash(message.as_bytes()))?;
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&rs);
        out.push(parity + 27);
        Ok(format!("0x{}", hex::encode(out)))
    }
}

impl std::fmt::Debug for EthSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_address_from_known_key() {
        let signer = EthSigner::from_hex(HARDHAT_KEY).unwrap();
        assert_eq!(signer.address().to_checksum(), HARDHAT_ADDR);
    }

    #[test]
    fn test_private_key_roundtrip() {
        let signer = EthSigner::from_hex(HARDHAT_KEY).unwrap();
        assert_eq!(signer.private_key_hex(), HARDHAT_KEY);
    }

    #[test]
    fn test_invalid_key() {
        assert!(EthSigner::from_hex("0x1234").is_err());
        assert!(EthSigner::from_hex("not hex").is_err());
        assert!(EthSigner::from_hex(&format!("0x{}", "00".repeat(32))).is_err());
    }

    #[test]
    fn test_sign_and_recover() {
        let signer = EthSigner::from_hex(HARDHAT_KEY).unwrap();
        let sig = signer.sign_message("hello").unwrap();
        assert!(sig.starts_with("0x"));
        assert_eq!(sig.len(), 2 + 130);

        let recovered = recover_address(&personal_message_hash(b"hello"), &sig).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_recover_accepts_raw_parity_and_no_prefix() {
        let signer = EthSigner::random();
        let prehash = personal_message_hash(b"tablehop");
        let (rs, parity) = signer.sign_prehash(&prehash).unwrap();
        let mut bytes = rs.to_vec();
        bytes.push(parity);
        let recovered = recover_address(&prehash, &hex::encode(bytes)).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_recover_other_message_gives_other_address() {
        let signer = EthSigner::random();
        let sig = signer.sign_message("order pizza").unwrap();
        let recovered = recover_address(&personal_message_hash(b"order sushi"), &sig);
        // Recovery may succeed with an unrelated key or fail outright
        if let Ok(addr) = recovered {
            assert_ne!(addr, signer.address());
        }
    }

    #[test]
    fn test_malformed_signatures() {
        let prehash = personal_message_hash(b"x");
        assert!(matches!(
            recover_address(&prehash, "0x1234"),
            Err(ChainError::InvalidSignature(_))
        ));
        assert!(matches!(
            recover_address(&prehash, "zz"),
            Err(ChainError::InvalidSignature(_))
        ));
        let bad_v = format!("0x{}{}", "11".repeat(64), "05");
        assert!(matches!(
            recover_address(&prehash, &bad_v),
            Err(ChainError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_personal_hash_differs_from_plain_keccak() {
        assert_ne!(personal_message_hash(b"abc"), keccak256(b"abc"));
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = EthSigner::from_hex(HARDHAT_KEY).unwrap();
        let debug = format!("{:?}", signer);
        assert!(debug.contains("EthSigner"));
        assert!(!debug.contains("ac0974"));
    }
}
