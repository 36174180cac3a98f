use rand::distr::Alphanumeric;
use rand::Rng;

/// Random password of `length` characters from `A-Z`, `a-z` and `0-9`
pub fn random_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
