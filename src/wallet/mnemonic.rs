//! BIP-39 mnemonic handling

use crate::{Error, Result};
use bip39::{Language, Mnemonic};
use zeroize::Zeroizing;

/// Word counts accepted by the wallet
pub const WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// Split user input into lowercase words. Spaces, commas and newlines
/// all separate words; repeated separators collapse.
pub fn parse_mnemonic(input: &str) -> Zeroizing<Vec<String>> {
    Zeroizing::new(
        input
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect(),
    )
}

/// Validate words against the English wordlist and checksum.
pub fn validate(words: &[String]) -> Result<Mnemonic> {
    if !WORD_COUNTS.contains(&words.len()) {
        return Err(Error::InvalidMnemonic(format!(
            "expected 12, 15, 18, 21 or 24 words, got {}",
            words.len()
        )));
    }
    let phrase = Zeroizing::new(words.join(" "));
    Mnemonic::parse_in_normalized(Language::English, &phrase).map_err(|e| {
        let reason = match e {
            bip39::Error::UnknownWord(index) => format!("unknown word at position {}", index + 1),
            bip39::Error::InvalidChecksum => "checksum mismatch".to_string(),
            bip39::Error::BadWordCount(n) => format!("bad word count {}", n),
            other => other.to_string(),
        };
        Error::InvalidMnemonic(reason)
    })
}

pub fn is_valid(words: &[String]) -> bool {
    validate(words).is_ok()
}

/// Generate a fresh mnemonic from the OS CSPRNG.
pub fn generate_mnemonic(word_count: usize) -> Result<Zeroizing<Vec<String>>> {
    if !WORD_COUNTS.contains(&word_count) {
        return Err(Error::InvalidArgument(format!(
            "unsupported word count {}",
            word_count
        )));
    }
    let mnemonic = Mnemonic::generate_in(Language::English, word_count)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(
        mnemonic.words().map(str::to_string).collect(),
    ))
}

/// BIP-39 seed (empty passphrase)
pub(crate) fn to_seed(words: &[String]) -> Result<Zeroizing<[u8; 64]>> {
    let mnemonic = validate(words)?;
    Ok(Zeroizing::new(mnemonic.to_seed("")))
}
