//! Authorization digests for meta-transactions.
//!
//! A signer authorizes a call off-chain by signing a digest bound to the encoded call, the
//! contract's per-signer nonce and (for [`HashScheme::SaltedTriple`]) the contract address.
//! Digests are signed with the EIP-191 personal-message prefix, which is what the contracts
//! recover against.

use crate::{
    abi,
    error::HashError,
};

use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        Signature,
        U256,
        keccak256,
    },
    signers::{
        SignerSync,
        local::PrivateKeySigner,
    },
};
use alloy_json_abi::JsonAbi;
use serde::{
    Deserialize,
    Serialize,
};

/// Construction used to derive the authorization digest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum HashScheme {
    /// `keccak256(keccak256(call ++ 32 zero bytes) ++ nonce)`
    #[default]
    DoubleHash,
    /// `keccak256(keccak256(call) ++ contract ++ nonce)`
    SaltedTriple,
}

impl std::fmt::Display for HashScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DoubleHash => write!(f, "double-hash"),
            Self::SaltedTriple => write!(f, "salted-triple"),
        }
    }
}

/// Encodes `method(args)` against `abi` and derives its authorization digest.
pub fn digest_for_call<S: AsRef<str>>(
    abi: &JsonAbi,
    method: &str,
    args: &[S],
    contract: Address,
    nonce: U256,
    scheme: HashScheme,
) -> Result<B256, HashError> {
    let encoded = abi::encode_call(abi, method, args)?;
    Ok(digest_for_encoded(&encoded, contract, nonce, scheme))
}

/// Derives the authorization digest of an already encoded call.
pub fn digest_for_encoded(
    encoded_call: &[u8],
    contract: Address,
    nonce: U256,
    scheme: HashScheme,
) -> B256 {
    let nonce = nonce.to_be_bytes::<32>();
    match scheme {
        HashScheme::DoubleHash => {
            let mut padded = Vec::with_capacity(encoded_call.len() + 32);
            padded.extend_from_slice(encoded_call);
            padded.extend_from_slice(&[0u8; 32]);

            let mut outer = [0u8; 64];
            outer[..32].copy_from_slice(keccak256(&padded).as_slice());
            outer[32..].copy_from_slice(&nonce);
            keccak256(outer)
        }
        HashScheme::SaltedTriple => {
            let mut packed = [0u8; 84];
            packed[..32].copy_from_slice(keccak256(encoded_call).as_slice());
            packed[32..52].copy_from_slice(contract.as_slice());
            packed[52..].copy_from_slice(&nonce);
            keccak256(packed)
        }
    }
}

/// Signs a digest as an EIP-191 personal message, returning 65 bytes `r ++ s ++ v` with
/// `v` in {27, 28}.
pub fn sign_digest(signer: &PrivateKeySigner, digest: B256) -> Result<Bytes, HashError> {
    let signature = signer.sign_message_sync(digest.as_slice())?;
    Ok(Bytes::copy_from_slice(&normalize_recovery_byte(
        signature.as_bytes(),
    )))
}

/// Shifts a 0/1 recovery byte to 27/28. Other values are left alone.
pub fn normalize_recovery_byte(mut signature: [u8; 65]) -> [u8; 65] {
    if signature[64] < 27 {
        signature[64] += 27;
    }
    signature
}

/// Recovers the address that signed `digest` as an EIP-191 personal message.
pub fn recover_signer(digest: B256, signature: &[u8]) -> Result<Address, HashError> {
    if signature.len() != 65 {
        return Err(HashError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            signature.len()
        )));
    }
    let signature = Signature::from_raw(signature)
        .map_err(|err| HashError::InvalidSignature(err.to_string()))?;
    signature
        .recover_address_from_msg(digest.as_slice())
        .map_err(|err| HashError::InvalidSignature(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{
        address,
        b256,
        bytes,
    };

    fn resolver_abi() -> JsonAbi {
        JsonAbi::parse([
            "function set(string key, string value, uint256 tokenId)",
            "function setFor(string key, string value, uint256 tokenId, bytes signature)",
        ])
        .unwrap()
    }

    fn args() -> Vec<String> {
        vec!["crypto.ETH.address".to_string(), "0xabc".to_string(), "1".to_string()]
    }

    const CONTRACT: Address = address!("0x00000000000000000000000000000000000000c0");

    #[test]
    fn double_hash_matches_manual_construction() {
        let abi = resolver_abi();
        let nonce = U256::from(3);
        let digest =
            digest_for_call(&abi, "set", &args(), CONTRACT, nonce, HashScheme::DoubleHash).unwrap();

        let encoded = abi::encode_call(&abi, "set", &args()).unwrap();
        let inner = keccak256([&encoded[..], &[0u8; 32][..]].concat());
        let expected = keccak256([inner.as_slice(), &nonce.to_be_bytes::<32>()[..]].concat());
        assert_eq!(digest, expected);
    }

    const BURN_CONTRACT: Address = address!("0x0000000000000000000000000000000000000abc");

    fn burn_digest(scheme: HashScheme) -> B256 {
        let abi = JsonAbi::parse(["function burn(uint256 tokenId)"]).unwrap();
        digest_for_call(&abi, "burn", &["42"], BURN_CONTRACT, U256::from(3), scheme).unwrap()
    }

    #[test]
    fn burn_call_encoding() {
        let abi = JsonAbi::parse(["function burn(uint256 tokenId)"]).unwrap();
        assert_eq!(
            abi::encode_call(&abi, "burn", &["42"]).unwrap(),
            bytes!("42966c68000000000000000000000000000000000000000000000000000000000000002a")
        );
    }

    #[test]
    fn burn_double_hash_golden_vector() {
        assert_eq!(
            burn_digest(HashScheme::DoubleHash),
            b256!("0x61726a208c7905c87b40df2ab23b02dae4e5379dd2b42b000e7a106c27e5bbfd")
        );
    }

    #[test]
    fn burn_salted_triple_golden_vector() {
        assert_eq!(
            burn_digest(HashScheme::SaltedTriple),
            b256!("0x9a831142e749ce5624a13bfe2321887746eaf7d2bbeabf6794f2f8275c1cd9b6")
        );
    }

    #[test]
    fn salted_triple_matches_manual_construction() {
        let abi = resolver_abi();
        let nonce = U256::from(3);
        let digest =
            digest_for_call(&abi, "set", &args(), CONTRACT, nonce, HashScheme::SaltedTriple)
                .unwrap();

        let encoded = abi::encode_call(&abi, "set", &args()).unwrap();
        let expected = keccak256(
            [
                keccak256(&encoded).as_slice(),
                CONTRACT.as_slice(),
                &nonce.to_be_bytes::<32>()[..],
            ]
            .concat(),
        );
        assert_eq!(digest, expected);
    }

    #[test]
    fn digest_changes_with_nonce() {
        let abi = resolver_abi();
        for scheme in [HashScheme::DoubleHash, HashScheme::SaltedTriple] {
            let first =
                digest_for_call(&abi, "set", &args(), CONTRACT, U256::from(0), scheme).unwrap();
            let second =
                digest_for_call(&abi, "set", &args(), CONTRACT, U256::from(1), scheme).unwrap();
            assert_ne!(first, second);
        }
    }

    #[test]
    fn only_salted_triple_binds_the_contract() {
        let abi = resolver_abi();
        let other = address!("0x00000000000000000000000000000000000000c1");
        let nonce = U256::from(9);

        let a = digest_for_call(&abi, "set", &args(), CONTRACT, nonce, HashScheme::DoubleHash)
            .unwrap();
        let b =
            digest_for_call(&abi, "set", &args(), other, nonce, HashScheme::DoubleHash).unwrap();
        assert_eq!(a, b);

        let a = digest_for_call(&abi, "set", &args(), CONTRACT, nonce, HashScheme::SaltedTriple)
            .unwrap();
        let b =
            digest_for_call(&abi, "set", &args(), other, nonce, HashScheme::SaltedTriple).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_method_is_bad_abi_entry() {
        let abi = resolver_abi();
        let err = digest_for_call(
            &abi,
            "reset",
            &args(),
            CONTRACT,
            U256::ZERO,
            HashScheme::DoubleHash,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HashError::Abi(crate::error::AbiError::BadAbiEntry { .. })
        ));
    }

    #[test]
    fn signature_recovers_to_signer() {
        let signer = PrivateKeySigner::random();
        let digest = keccak256(b"authorize");

        let signature = sign_digest(&signer, digest).unwrap();
        assert_eq!(signature.len(), 65);
        assert!(signature[64] == 27 || signature[64] == 28);
        assert_eq!(recover_signer(digest, &signature).unwrap(), signer.address());
    }

    #[test]
    fn zero_based_recovery_byte_still_recovers() {
        let signer = PrivateKeySigner::random();
        let digest = keccak256(b"authorize");
        let mut signature = sign_digest(&signer, digest).unwrap().to_vec();
        signature[64] -= 27;

        let normalized = normalize_recovery_byte(signature.clone().try_into().unwrap());
        assert!(normalized[64] == 27 || normalized[64] == 28);
        assert_eq!(recover_signer(digest, &normalized).unwrap(), signer.address());
    }

    #[test]
    fn short_signature_is_rejected() {
        let err = recover_signer(B256::ZERO, &[0u8; 64]).unwrap_err();
        assert!(matches!(err, HashError::InvalidSignature(_)));
    }

    #[test]
    fn scheme_parses_from_kebab_case() {
        use clap::ValueEnum;
        assert_eq!(
            HashScheme::from_str("salted-triple", false).unwrap(),
            HashScheme::SaltedTriple
        );
        assert_eq!(HashScheme::default().to_string(), "double-hash");
    }
}
