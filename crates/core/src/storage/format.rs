use super::encryption::{KdfParams, NONCE_LEN, SALT_LEN};
use crate::errors::CoreError;

/// Magic bytes of a credential vault envelope.
pub const MAGIC: &[u8; 4] = b"PHCV";

pub const CURRENT_VERSION: u16 = 1;

/// magic(4) + version(2) + kdf params(12) + salt(16) + nonce(12) + ciphertext length(8)
pub const HEADER_LEN: usize = 54;

/// Parsed vault envelope header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u16,
    pub kdf_params: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
}

/// Serialise an envelope.
///
/// ```text
/// [PHCV][version u16][memory u32][time u32][parallelism u32]
/// [salt 16B][nonce 12B][ciphertext_len u64][ciphertext]
/// ```
/// Integers are little-endian.
pub fn encode(envelope: &Envelope, ciphertext: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&envelope.version.to_le_bytes());
    buf.extend_from_slice(&envelope.kdf_params.memory_cost.to_le_bytes());
    buf.extend_from_slice(&envelope.kdf_params.time_cost.to_le_bytes());
    buf.extend_from_slice(&envelope.kdf_params.parallelism.to_le_bytes());
    buf.extend_from_slice(&envelope.salt);
    buf.extend_from_slice(&envelope.nonce);
    buf.extend_from_slice(&(ciphertext.len() as u64).to_le_bytes());
    buf.extend_from_slice(ciphertext);
    buf
}

/// Parse an envelope, returning the header and the ciphertext it frames.
///
/// KDF parameters are bounded so a crafted file cannot demand unbounded
/// memory or time during key derivation.
pub fn decode(data: &[u8]) -> Result<(Envelope, &[u8]), CoreError> {
    if data.len() < HEADER_LEN {
        return Err(CoreError::InvalidFileFormat("vault too small".into()));
    }
    let mut reader = Reader { data, offset: 0 };

    if reader.take::<4>()? != *MAGIC {
        return Err(CoreError::InvalidFileFormat("not a credential vault".into()));
    }
    let version = u16::from_le_bytes(reader.take()?);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let kdf_params = KdfParams {
        memory_cost: u32::from_le_bytes(reader.take()?),
        time_cost: u32::from_le_bytes(reader.take()?),
        parallelism: u32::from_le_bytes(reader.take()?),
    };
    check_range("memory_cost", kdf_params.memory_cost, 8, 1_048_576)?;
    check_range("time_cost", kdf_params.time_cost, 1, 20)?;
    check_range("parallelism", kdf_params.parallelism, 1, 16)?;

    let salt = reader.take::<SALT_LEN>()?;
    let nonce = reader.take::<NONCE_LEN>()?;
    let len = u64::from_le_bytes(reader.take()?);
    let len = usize::try_from(len)
        .map_err(|_| CoreError::InvalidFileFormat("ciphertext length overflow".into()))?;

    let rest = &data[reader.offset..];
    if rest.len() < len {
        return Err(CoreError::InvalidFileFormat(format!(
            "vault truncated: expected {len} ciphertext bytes, found {}",
            rest.len()
        )));
    }

    Ok((
        Envelope {
            version,
            kdf_params,
            salt,
            nonce,
        },
        &rest[..len],
    ))
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<(), CoreError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidFileFormat(format!(
            "KDF {name} out of range: {value} (expected {min}..={max})"
        )))
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], CoreError> {
        let bytes = self
            .data
            .get(self.offset..self.offset + N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or_else(|| CoreError::InvalidFileFormat("vault header truncated".into()))?;
        self.offset += N;
        Ok(bytes)
    }
}
