use rand::{rngs::OsRng, RngCore};

use super::CryptoError;

pub const DEFAULT_CODE_LENGTH: usize = 6;

const DIGITS: &[u8] = b"0123456789";

/// Generate a numeric one-time code of `length` digits from the OS CSPRNG.
///
/// # Errors
/// Returns `Random` if the random source fails.
pub fn generate_one_time_code(length: usize) -> Result<String, CryptoError> {
    generate_one_time_code_with_rng(&mut OsRng, length)
}

pub(crate) fn generate_one_time_code_with_rng<R: RngCore + ?Sized>(
    rng: &mut R,
    length: usize,
) -> Result<String, CryptoError> {
    let mut raw = vec![0u8; length];
    rng.try_fill_bytes(&mut raw)
        .map_err(|_| CryptoError::Random)?;

    let mut code = String::with_capacity(length);
    for byte in raw {
        let idx = usize::from(byte) % DIGITS.len();
        if let Some(&digit) = DIGITS.get(idx) {
            code.push(char::from(digit));
        }
    }
    Ok(code)
}
