//! Random base36 tokens for request ids and peer-id suffixes.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of generated request ids. 16 base36 chars is ~82 bits, far past
/// the birthday bound for any realistic number of in-flight requests.
pub const REQUEST_ID_LEN: usize = 16;

/// Random lowercase base36 string of the given length.
pub fn base36(len: usize) -> String {
	let mut rng = rand::thread_rng();
	(0..len)
		.map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
		.collect()
}

/// Fresh correlation id for one outgoing request.
pub fn request_id() -> String {
	base36(REQUEST_ID_LEN)
}
