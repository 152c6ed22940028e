//! EIP-155 legacy transactions

use crate::address::EvmAddress;
use crate::error::ChainError;
use crate::rlp;
use crate::signer::{EthSigner, keccak256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: EvmAddress,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp::encode_u64(self.nonce),
            rlp::encode_u128(self.gas_price),
            rlp::encode_u64(self.gas_limit),
            rlp::encode_bytes(self.to.as_bytes()),
            rlp::encode_u128(self.value),
            rlp::encode_bytes(&self.data),
        ]
    }

    /// keccak256 of `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.base_fields();
        fields.push(rlp::encode_u64(self.chain_id));
        fields.push(rlp::encode_u64(0));
        fields.push(rlp::encode_u64(0));
        keccak256(&rlp::encode_list(&fields))
    }

    /// Raw signed transaction bytes for `eth_sendRawTransaction`
    pub fn sign(&self, signer: &EthSigner) -> Result<Vec<u8>, ChainError> {
        let (rs, parity) = signer.sign_prehash(&self.signing_hash())?;
        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|x| x.checked_add(35 + parity as u64))
            .ok_or_else(|| ChainError::Signing("chain id too large".into()))?;

        let mut fields = self.base_fields();
        fields.push(rlp::encode_u64(v));
        fields.push(rlp::encode_uint_be(&rs[..32]));
        fields.push(rlp::encode_uint_be(&rs[32..]));
        Ok(rlp::encode_list(&fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: "0x3535353535353535353535353535353535353535".parse().unwrap(),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            chain_id: 1,
        }
    }

    #[test]
    fn test_eip155_signing_hash() {
        assert_eq!(
            hex::encode(eip155_example().signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signed_transaction() {
        let signer = EthSigner::from_hex(&"46".repeat(32)).unwrap();
        let raw = eip155_example().sign(&signer).unwrap();
        assert_eq!(
            hex::encode(raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }
}
