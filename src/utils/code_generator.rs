use super::validation::TOKEN_LEN;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// 第 n 个 5 位字母数字串，n 不同结果不同 (`n < 62^5`)
/// Used to mint user names and codes in bulk.
pub fn token_for_index(mut n: u64) -> String {
    let base = ALPHABET.len() as u64;
    let mut out = [b'A'; TOKEN_LEN];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(n % base) as usize];
        n /= base;
    }
    out.iter().map(|&b| b as char).collect()
}
