//! Pairing codes and the generator that hands them out.
//!
//! A pairing code is the 6-digit number a display shows on screen and a
//! controller types in.  Codes are unique among *currently registered*
//! displays only; once a display goes away its code may be drawn again.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Smallest code the generator will issue.
pub const CODE_MIN: u32 = 100_000;

/// Largest code the generator will issue.
pub const CODE_MAX: u32 = 999_999;

/// Number of digits in the textual form of a code.
pub const CODE_LEN: usize = 6;

/// Errors produced when parsing a pairing code supplied by a client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("pairing code must be exactly 6 digits, got {len} characters")]
    WrongLength { len: usize },
    #[error("pairing code must contain only ASCII digits")]
    NonDigit,
}

/// A 6-digit pairing code.
///
/// Parsing accepts any six ASCII digits, including leading zeros, so a
/// controller typing `"000000"` gets a clean "no such display" answer rather
/// than a parse failure.  The generator only ever issues codes in
/// [`CODE_MIN`]`..=`[`CODE_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairingCode(u32);

impl PairingCode {
    /// Returns the numeric value of the code.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl FromStr for PairingCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CODE_LEN {
            return Err(CodeError::WrongLength { len: s.chars().count() });
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodeError::NonDigit);
        }
        s.parse::<u32>()
            .map(PairingCode)
            .map_err(|_| CodeError::NonDigit)
    }
}

/// Draws pairing codes uniformly from [`CODE_MIN`]`..=`[`CODE_MAX`].
///
/// Generic over the random source so tests can use a seeded [`StdRng`].
#[derive(Debug)]
pub struct CodeGenerator<R = StdRng> {
    rng: R,
}

impl CodeGenerator<StdRng> {
    /// Creates a generator seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Creates a deterministic generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for CodeGenerator<StdRng> {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

impl<R: Rng> CodeGenerator<R> {
    /// Wraps an arbitrary random source.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Draws codes until one is not reported as in use.
    ///
    /// There is no retry limit: with all 900 000 codes taken this never
    /// returns.  Realistic registration counts are orders of magnitude below
    /// that.
    pub fn generate(&mut self, mut in_use: impl FnMut(PairingCode) -> bool) -> PairingCode {
        loop {
            let candidate = PairingCode(self.rng.random_range(CODE_MIN..=CODE_MAX));
            if !in_use(candidate) {
                return candidate;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_six_digits() {
        let code: PairingCode = "482913".parse().unwrap();
        assert_eq!(code.value(), 482_913);
        assert_eq!(code.to_string(), "482913");
    }

    #[test]
    fn test_parse_keeps_leading_zeros_in_display() {
        let code: PairingCode = "000000".parse().unwrap();
        assert_eq!(code.value(), 0);
        assert_eq!(code.to_string(), "000000");
    }

    #[test]
    fn test_parse_rejects_short_code() {
        assert_eq!(
            "12345".parse::<PairingCode>(),
            Err(CodeError::WrongLength { len: 5 })
        );
    }

    #[test]
    fn test_parse_rejects_long_code() {
        assert_eq!(
            "1234567".parse::<PairingCode>(),
            Err(CodeError::WrongLength { len: 7 })
        );
    }

    #[test]
    fn test_parse_rejects_non_digits() {
        assert_eq!("12a456".parse::<PairingCode>(), Err(CodeError::NonDigit));
        assert_eq!("+12345".parse::<PairingCode>(), Err(CodeError::NonDigit));
        assert_eq!(" 12345".parse::<PairingCode>(), Err(CodeError::NonDigit));
    }

    #[test]
    fn test_parse_rejects_multibyte_input_of_six_bytes() {
        // "ééé" is six bytes but three characters.
        assert!("ééé".parse::<PairingCode>().is_err());
    }

    #[test]
    fn test_generated_codes_stay_in_range() {
        let mut generator = CodeGenerator::seeded(7);
        for _ in 0..10_000 {
            let code = generator.generate(|_| false);
            assert!((CODE_MIN..=CODE_MAX).contains(&code.value()));
            assert_eq!(code.to_string().len(), CODE_LEN);
        }
    }

    #[test]
    fn test_generate_redraws_while_candidate_in_use() {
        // Arrange: report the first three candidates as taken.
        let mut generator = CodeGenerator::seeded(42);
        let mut draws = 0;

        // Act
        let code = generator.generate(|_| {
            draws += 1;
            draws <= 3
        });

        // Assert
        assert_eq!(draws, 4);
        assert!((CODE_MIN..=CODE_MAX).contains(&code.value()));
    }

    #[test]
    fn test_seeded_generators_are_deterministic() {
        let mut a = CodeGenerator::seeded(99);
        let mut b = CodeGenerator::seeded(99);
        for _ in 0..16 {
            assert_eq!(a.generate(|_| false), b.generate(|_| false));
        }
    }
}
