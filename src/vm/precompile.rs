//! This module contains the inline implementations of the Berlin-era
//! precompiled contracts.
//!
//! The call opcodes dispatch the whole `0x01..=0x09` address range here: the
//! output replaces the caller's inner return data, is copied into the
//! reserved return window, and 1 is pushed as success. A precompile that
//! rejects its input (a malformed pairing, a bad BLAKE2 length) surfaces
//! [`Error::PrecompileFailed`] naming the address, just as a node would
//! refuse the call.

use bn::{AffineG1, AffineG2, Fq, Fq2, Fr, Group, Gt, G1, G2};
use k256::{
    ecdsa::{RecoveryId, Signature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use num_bigint::BigUint;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::{
    constant::PRECOMPILE_MAX_ADDRESS,
    error::execution::{Error, Result},
    utility,
    vm::value::{Address, Word},
};

/// Checks whether `address` is on the Berlin precompiled contract list.
#[must_use]
pub fn is_precompile(address: Address) -> bool {
    let bytes = address.as_bytes();
    let low = bytes[19];
    bytes[..19].iter().all(|byte| *byte == 0) && low >= 0x01 && low <= PRECOMPILE_MAX_ADDRESS
}

/// Runs the precompiled contract at `address` on `input`, producing its
/// output bytes.
///
/// # Errors
///
/// If the precompile rejects its input, or `address` is not a precompile at
/// all.
pub fn run(address: Address, input: &[u8]) -> Result<Vec<u8>> {
    let failed = |message: &str| Error::PrecompileFailed {
        address,
        message: message.into(),
    };

    if !is_precompile(address) {
        return Err(failed("not a precompiled contract address"));
    }
    match address.as_bytes()[19] {
        0x01 => Ok(ecrecover(input)),
        0x02 => Ok(sha256(input)),
        0x03 => Ok(ripemd160(input)),
        0x04 => Ok(input.to_vec()),
        0x05 => Ok(modexp(input)),
        0x06 => bn_add(input).map_err(|message| failed(message)),
        0x07 => bn_mul(input).map_err(|message| failed(message)),
        0x08 => bn_pairing(input).map_err(|message| failed(message)),
        0x09 => blake2f(input).map_err(|message| failed(message)),
        _ => unreachable!("the address range was checked above"),
    }
}

/// Copies `input` into a buffer of exactly `len` bytes, zero-padded on the
/// right, as the fixed-layout precompiles read their arguments.
fn right_pad(input: &[u8], len: usize) -> Vec<u8> {
    let mut padded = input.to_vec();
    padded.resize(len.max(input.len()), 0);
    padded.truncate(len);
    padded
}

/// The ECDSA public-key recovery precompile at `0x01`.
///
/// The input is `hash (32) || v (32) || r (32) || s (32)`; the output is the
/// recovered signer address left-padded to a word. Any malformed signature
/// produces an *empty* output rather than a failure, so contracts can probe
/// signatures without reverting.
fn ecrecover(input: &[u8]) -> Vec<u8> {
    let input = right_pad(input, 128);

    // The recovery id is a full word that must read 27 or 28.
    if input[32..63].iter().any(|byte| *byte != 0) {
        return vec![];
    }
    let v = input[63];
    if v != 27 && v != 28 {
        return vec![];
    }
    let mut recovery_byte = v - 27;

    let Ok(mut signature) = Signature::from_slice(&input[64..128]) else {
        return vec![];
    };
    // The precompile accepts high-s signatures; flip into the normalized
    // half-plane the recovery routine expects.
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_byte ^= 1;
    }
    let Some(recovery_id) = RecoveryId::from_byte(recovery_byte) else {
        return vec![];
    };

    let Ok(key) = VerifyingKey::recover_from_prehash(&input[0..32], &signature, recovery_id)
    else {
        return vec![];
    };

    // The address is the low 20 bytes of the keccak of the uncompressed
    // public key (without its SEC1 tag byte).
    let encoded = key.to_encoded_point(false);
    let digest = utility::keccak256(&encoded.as_bytes()[1..]);

    let mut output = vec![0u8; 32];
    output[12..].copy_from_slice(&digest[12..]);
    output
}

/// The SHA-256 precompile at `0x02`.
fn sha256(input: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().to_vec()
}

/// The RIPEMD-160 precompile at `0x03`; the 20-byte digest is left-padded to
/// a word.
fn ripemd160(input: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(input);
    let digest = hasher.finalize();

    let mut output = vec![0u8; 32];
    output[12..].copy_from_slice(&digest);
    output
}

/// The modular exponentiation precompile at `0x05` (EIP-198).
///
/// The input is three 32-byte lengths followed by the base, exponent and
/// modulus at those lengths; all reads past the end of the input see zeroes.
/// The output is `base ^ exponent mod modulus`, left-padded to the modulus
/// length, with a zero modulus producing all zeroes.
fn modexp(input: &[u8]) -> Vec<u8> {
    let header = right_pad(input, 96);
    let base_len = Word::from_be_slice(&header[0..32]).low_u64() as usize;
    let exp_len = Word::from_be_slice(&header[32..64]).low_u64() as usize;
    let mod_len = Word::from_be_slice(&header[64..96]).low_u64() as usize;

    if mod_len == 0 {
        return vec![];
    }

    let body = if input.len() > 96 { &input[96..] } else { &[] };
    let body = right_pad(body, base_len + exp_len + mod_len);
    let base = BigUint::from_bytes_be(&body[..base_len]);
    let exponent = BigUint::from_bytes_be(&body[base_len..base_len + exp_len]);
    let modulus = BigUint::from_bytes_be(&body[base_len + exp_len..]);

    let mut output = vec![0u8; mod_len];
    if modulus.bits() == 0 {
        return output;
    }

    let result = base.modpow(&exponent, &modulus).to_bytes_be();
    output[mod_len - result.len()..].copy_from_slice(&result);
    output
}

/// Reads a bn254 base-field element from 32 big-endian bytes.
fn read_fq(bytes: &[u8]) -> std::result::Result<Fq, &'static str> {
    Fq::from_slice(bytes).map_err(|_| "field element out of range")
}

/// Reads a bn254 G1 point from two coordinate words, with the all-zero
/// encoding denoting the point at infinity.
fn read_g1(x_bytes: &[u8], y_bytes: &[u8]) -> std::result::Result<G1, &'static str> {
    let x = read_fq(x_bytes)?;
    let y = read_fq(y_bytes)?;
    if x == Fq::zero() && y == Fq::zero() {
        Ok(G1::zero())
    } else {
        AffineG1::new(x, y)
            .map(Into::into)
            .map_err(|_| "point not on curve")
    }
}

/// Writes a G1 point as two coordinate words, with infinity as all zeroes.
fn write_g1(point: G1) -> std::result::Result<Vec<u8>, &'static str> {
    let mut output = vec![0u8; 64];
    if let Some(affine) = AffineG1::from_jacobian(point) {
        affine
            .x()
            .to_big_endian(&mut output[0..32])
            .map_err(|_| "coordinate serialization failed")?;
        affine
            .y()
            .to_big_endian(&mut output[32..64])
            .map_err(|_| "coordinate serialization failed")?;
    }
    Ok(output)
}

/// The bn254 point-addition precompile at `0x06` (EIP-196).
fn bn_add(input: &[u8]) -> std::result::Result<Vec<u8>, &'static str> {
    let input = right_pad(input, 128);
    let p1 = read_g1(&input[0..32], &input[32..64])?;
    let p2 = read_g1(&input[64..96], &input[96..128])?;
    write_g1(p1 + p2)
}

/// The bn254 scalar-multiplication precompile at `0x07` (EIP-196).
fn bn_mul(input: &[u8]) -> std::result::Result<Vec<u8>, &'static str> {
    let input = right_pad(input, 96);
    let point = read_g1(&input[0..32], &input[32..64])?;
    let scalar = Fr::from_slice(&input[64..96]).map_err(|_| "scalar out of range")?;
    write_g1(point * scalar)
}

/// The bn254 pairing-check precompile at `0x08` (EIP-197).
///
/// The input is a sequence of `(G1, G2)` pairs, 192 bytes each; G2
/// coordinates are encoded imaginary-part first. The output is a boolean
/// word: whether the product of the pairings is the identity.
fn bn_pairing(input: &[u8]) -> std::result::Result<Vec<u8>, &'static str> {
    if input.len() % 192 != 0 {
        return Err("pairing input must be a multiple of 192 bytes");
    }

    let mut pairs = Vec::with_capacity(input.len() / 192);
    for chunk in input.chunks(192) {
        let a = read_g1(&chunk[0..32], &chunk[32..64])?;

        let x_c1 = read_fq(&chunk[64..96])?;
        let x_c0 = read_fq(&chunk[96..128])?;
        let y_c1 = read_fq(&chunk[128..160])?;
        let y_c0 = read_fq(&chunk[160..192])?;
        let x = Fq2::new(x_c0, x_c1);
        let y = Fq2::new(y_c0, y_c1);
        let b = if x.is_zero() && y.is_zero() {
            G2::zero()
        } else {
            AffineG2::new(x, y)
                .map(Into::into)
                .map_err(|_| "point not on curve")?
        };

        pairs.push((a, b));
    }

    let satisfied = pairs.is_empty() || bn::pairing_batch(&pairs) == Gt::one();
    let mut output = vec![0u8; 32];
    output[31] = u8::from(satisfied);
    Ok(output)
}

/// The BLAKE2b compression-function precompile at `0x09` (EIP-152).
///
/// The input is exactly 213 bytes: a big-endian round count, the 64-byte
/// state, the 128-byte message block, two little-endian offset counters and
/// a final-block flag. The output is the updated 64-byte state.
///
/// The published BLAKE2 hashing crates only expose whole-message digests,
/// not the raw variable-round `F` function this precompile is defined over,
/// so the compression is implemented here directly from RFC 7693.
fn blake2f(input: &[u8]) -> std::result::Result<Vec<u8>, &'static str> {
    if input.len() != 213 {
        return Err("input must be exactly 213 bytes");
    }
    let flag = input[212];
    if flag > 1 {
        return Err("final-block flag must be 0 or 1");
    }

    let rounds = u32::from_be_bytes(input[0..4].try_into().expect("the length was checked"));

    let mut h = [0u64; 8];
    for (i, word) in h.iter_mut().enumerate() {
        let offset = 4 + i * 8;
        *word = u64::from_le_bytes(
            input[offset..offset + 8].try_into().expect("the length was checked"),
        );
    }
    let mut m = [0u64; 16];
    for (i, word) in m.iter_mut().enumerate() {
        let offset = 68 + i * 8;
        *word = u64::from_le_bytes(
            input[offset..offset + 8].try_into().expect("the length was checked"),
        );
    }
    let t = [
        u64::from_le_bytes(input[196..204].try_into().expect("the length was checked")),
        u64::from_le_bytes(input[204..212].try_into().expect("the length was checked")),
    ];

    blake2b_compress(&mut h, &m, t, flag == 1, rounds);

    let mut output = vec![0u8; 64];
    for (i, word) in h.iter().enumerate() {
        output[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
    }
    Ok(output)
}

/// The BLAKE2b initialization vector.
const BLAKE2B_IV: [u64; 8] = [
    0x6a09_e667_f3bc_c908,
    0xbb67_ae85_84ca_a73b,
    0x3c6e_f372_fe94_f82b,
    0xa54f_f53a_5f1d_36f1,
    0x510e_527f_ade6_82d1,
    0x9b05_688c_2b3e_6c1f,
    0x1f83_d9ab_fb41_bd6b,
    0x5be0_cd19_137e_2179,
];

/// The BLAKE2 message-word schedule; rounds beyond ten repeat it.
const BLAKE2B_SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

/// The `F` compression function of RFC 7693, with the round count taken as
/// a parameter as EIP-152 requires.
fn blake2b_compress(h: &mut [u64; 8], m: &[u64; 16], t: [u64; 2], last: bool, rounds: u32) {
    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&BLAKE2B_IV);
    v[12] ^= t[0];
    v[13] ^= t[1];
    if last {
        v[14] = !v[14];
    }

    for round in 0..rounds as usize {
        let s = &BLAKE2B_SIGMA[round % 10];
        blake2b_g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        blake2b_g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        blake2b_g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        blake2b_g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        blake2b_g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        blake2b_g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        blake2b_g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        blake2b_g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

/// The BLAKE2b quarter-round mixing function.
fn blake2b_g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

#[cfg(test)]
mod test {
    use super::{is_precompile, run};
    use crate::vm::value::{Address, Word};

    fn precompile_address(low: u8) -> Address {
        Address::from_word(Word::from(low))
    }

    fn run_hex(low: u8, input_hex: &str) -> anyhow::Result<Vec<u8>> {
        Ok(run(precompile_address(low), &hex::decode(input_hex)?)?)
    }

    #[test]
    fn recognises_the_berlin_address_range() {
        assert!(!is_precompile(Address::ZERO));
        for low in 1u8..=9 {
            assert!(is_precompile(precompile_address(low)));
        }
        assert!(!is_precompile(precompile_address(10)));
        assert!(!is_precompile(
            Address::from_hex_str("0x0000000000000000000000010000000000000004").unwrap()
        ));
    }

    #[test]
    fn every_berlin_address_dispatches() {
        // Empty input is accepted by everything except the strict-layout
        // BLAKE2 compression.
        for low in 1u8..=8 {
            assert!(run(precompile_address(low), &[]).is_ok());
        }
        assert!(run(precompile_address(9), &[]).is_err());
    }

    #[test]
    fn ecrecover_recovers_the_known_signer() -> anyhow::Result<()> {
        let input = concat!(
            "456e9aea5e197a1f1af7a3e85a3212fa4049a3ba34c2289b4c860fc0b0c64ef3",
            "000000000000000000000000000000000000000000000000000000000000001c",
            "9242685bf161793cc25603c231bc2f568eb630ea16aa137d2664ac8038825608",
            "4f8ae3bd7535248d0bd448298cc2e2071e56992d0774dc340c368ae950852ada",
        );
        let output = run_hex(1, input)?;
        assert_eq!(
            hex::encode(output),
            "0000000000000000000000007156526fbd7a3c72969b54f64e42c10fbb768c8a"
        );
        Ok(())
    }

    #[test]
    fn ecrecover_soft_fails_on_malformed_signatures() -> anyhow::Result<()> {
        // A recovery word that is neither 27 nor 28 yields empty output, not
        // an error.
        let input = concat!(
            "456e9aea5e197a1f1af7a3e85a3212fa4049a3ba34c2289b4c860fc0b0c64ef3",
            "0000000000000000000000000000000000000000000000000000000000000003",
            "9242685bf161793cc25603c231bc2f568eb630ea16aa137d2664ac8038825608",
            "4f8ae3bd7535248d0bd448298cc2e2071e56992d0774dc340c368ae950852ada",
        );
        assert!(run_hex(1, input)?.is_empty());

        // So does an all-zero signature.
        assert!(run(precompile_address(1), &[0u8; 128])?.is_empty());
        Ok(())
    }

    #[test]
    fn sha256_matches_the_known_vector() -> anyhow::Result<()> {
        let output = run(precompile_address(2), b"")?;
        assert_eq!(
            hex::encode(output),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        Ok(())
    }

    #[test]
    fn ripemd160_matches_the_known_vector() -> anyhow::Result<()> {
        let output = run(precompile_address(3), b"")?;
        assert_eq!(
            hex::encode(output),
            "0000000000000000000000009c1185a5c5e9fc54612808977ee8f548b2258d31"
        );
        Ok(())
    }

    #[test]
    fn identity_copies_its_input() -> anyhow::Result<()> {
        let output = run(precompile_address(4), b"data")?;
        assert_eq!(output, b"data");
        Ok(())
    }

    #[test]
    fn modexp_computes_small_cases() -> anyhow::Result<()> {
        // 3 ^ 2 mod 5 == 4, with one-byte operands.
        let input = concat!(
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000001",
            "030205",
        );
        assert_eq!(run_hex(5, input)?, vec![0x04]);

        // A zero modulus produces a zero-filled output of the modulus
        // length.
        let input = concat!(
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000001",
            "030200",
        );
        assert_eq!(run_hex(5, input)?, vec![0x00]);
        Ok(())
    }

    #[test]
    fn bn_add_with_the_identity_is_the_identity_map() -> anyhow::Result<()> {
        // The generator plus the point at infinity is the generator.
        let input = concat!(
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "0000000000000000000000000000000000000000000000000000000000000000",
            "0000000000000000000000000000000000000000000000000000000000000000",
        );
        let output = run_hex(6, input)?;
        assert_eq!(
            hex::encode(output),
            concat!(
                "0000000000000000000000000000000000000000000000000000000000000001",
                "0000000000000000000000000000000000000000000000000000000000000002",
            )
        );
        Ok(())
    }

    #[test]
    fn bn_add_rejects_points_off_the_curve() {
        let mut input = vec![0u8; 128];
        input[31] = 0x01;
        input[63] = 0x01; // (1, 1) is not on the curve
        assert!(run(precompile_address(6), &input).is_err());
    }

    #[test]
    fn bn_mul_by_zero_and_one_behaves_like_a_group() -> anyhow::Result<()> {
        // G * 1 == G.
        let input = concat!(
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "0000000000000000000000000000000000000000000000000000000000000001",
        );
        let output = run_hex(7, input)?;
        assert_eq!(
            hex::encode(output),
            concat!(
                "0000000000000000000000000000000000000000000000000000000000000001",
                "0000000000000000000000000000000000000000000000000000000000000002",
            )
        );

        // G * 0 is the point at infinity, encoded as zeroes.
        let input = concat!(
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "0000000000000000000000000000000000000000000000000000000000000000",
        );
        assert_eq!(run_hex(7, input)?, vec![0u8; 64]);
        Ok(())
    }

    #[test]
    fn bn_pairing_accepts_trivially_satisfied_products() -> anyhow::Result<()> {
        // An empty product is the identity.
        assert_eq!(run(precompile_address(8), &[])?[31], 0x01);

        // Pairing the generator with the G2 point at infinity is also the
        // identity.
        let mut input = vec![0u8; 192];
        input[31] = 0x01;
        input[63] = 0x02;
        assert_eq!(run(precompile_address(8), &input)?[31], 0x01);
        Ok(())
    }

    #[test]
    fn bn_pairing_rejects_ragged_input() {
        assert!(run(precompile_address(8), &[0u8; 191]).is_err());
    }

    #[test]
    fn blake2f_matches_the_reference_vector() -> anyhow::Result<()> {
        // The "abc" single-block vector: twelve rounds over the standard
        // digest parameters must produce the BLAKE2b-512 digest of "abc".
        let input = concat!(
            "0000000c",
            "48c9bdf267e6096a3ba7ca8485ae67bb2bf894fe72f36e3cf1361d5f3af54fa5",
            "d182e6ad7f520e511f6c3e2b8c68059b6bbd41fbabd9831f79217e1319cde05b",
            "6162630000000000000000000000000000000000000000000000000000000000",
            "0000000000000000000000000000000000000000000000000000000000000000",
            "0000000000000000000000000000000000000000000000000000000000000000",
            "0000000000000000000000000000000000000000000000000000000000000000",
            "0300000000000000",
            "0000000000000000",
            "01",
        );
        let output = run_hex(9, input)?;
        assert_eq!(
            hex::encode(output),
            concat!(
                "ba80a53f981c4d0d6a2797b69f12f6e94c212f14685ac4b74b12bb6fdbffa2d1",
                "7d87c5392aab792dc252d5de4533cc9518d38aa8dbf1925ab92386edd4009923",
            )
        );
        Ok(())
    }

    #[test]
    fn blake2f_rejects_malformed_framing() {
        // Wrong length.
        assert!(run(precompile_address(9), &[0u8; 212]).is_err());
        // Final-block flag out of range.
        let mut input = vec![0u8; 213];
        input[212] = 2;
        assert!(run(precompile_address(9), &input).is_err());
    }
}
