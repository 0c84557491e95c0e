//! Random payload generation.

use rand::Rng;

/// First printable ASCII character (space).
const PRINTABLE_FIRST: u8 = b' ';

/// Last printable ASCII character (tilde).
const PRINTABLE_LAST: u8 = b'~';

/// Generates `size` characters drawn uniformly from printable ASCII.
///
/// Called once per run; the same payload is reused for every record since
/// only the presence of a row matters.
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R, size: usize) -> String {
    (0..size)
        .map(|_| char::from(rng.gen_range(PRINTABLE_FIRST..=PRINTABLE_LAST)))
        .collect()
}
