use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

/// Positional character class used in masks and policy constraints.
///
/// Classification is ASCII-based: anything that is not an ASCII letter
/// or digit (including all non-ASCII characters) falls into `Symbol`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
	Lower,
	Upper,
	Digit,
	Symbol,
}

impl CharClass {
	/// Classifies a single character.
	pub fn of_char(c: char) -> Self {
		if c.is_ascii_lowercase() {
			Self::Lower
		} else if c.is_ascii_uppercase() {
			Self::Upper
		} else if c.is_ascii_digit() {
			Self::Digit
		} else {
			Self::Symbol
		}
	}

	/// Single-letter mask symbol (`L`, `U`, `D`, `S`).
	pub fn letter(self) -> char {
		match self {
			Self::Lower => 'L',
			Self::Upper => 'U',
			Self::Digit => 'D',
			Self::Symbol => 'S',
		}
	}

	/// Fallback alphabet for this class, in ascending (lexicographic) order.
	///
	/// Used when synthesizing a character of a class that was never observed
	/// in the analyzed corpus. The symbol alphabet is printable ASCII
	/// punctuation.
	pub fn alphabet(self) -> &'static [char] {
		const LOWER: [char; 26] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z'];
		const UPPER: [char; 26] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z'];
		const DIGIT: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
		const SYMBOL: [char; 32] = ['!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', ':', ';', '<', '=', '>', '?', '@', '[', '\\', ']', '^', '_', '`', '{', '|', '}', '~'];
		match self {
			Self::Lower => &LOWER,
			Self::Upper => &UPPER,
			Self::Digit => &DIGIT,
			Self::Symbol => &SYMBOL,
		}
	}
}

/// Builds the positional mask of a string.
///
/// Each character maps to its class letter, e.g. `"Pass01!"` → `"ULLLDDS"`.
pub fn mask_of(s: &str) -> String {
	s.chars().map(|c| CharClass::of_char(c).letter()).collect()
}

/// Builds the canonical character-class combination of a string.
///
/// The result is the subset of `"LUDS"` whose classes appear anywhere in
/// the string, always in `L`, `U`, `D`, `S` order (positional information
/// is deliberately discarded).
pub fn charset_combo(s: &str) -> String {
	let mut present = [false; 4];
	for c in s.chars() {
		present[CharClass::of_char(c) as usize] = true;
	}
	[CharClass::Lower, CharClass::Upper, CharClass::Digit, CharClass::Symbol]
		.into_iter()
		.filter(|class| present[*class as usize])
		.map(CharClass::letter)
		.collect()
}

/// Parses a mask into one class per position.
///
/// Accepts two notations:
/// - `?l?u?d?s` placeholders (one class per `?x` pair)
/// - plain class letters, e.g. `LLLLDDDD` (case-insensitive)
///
/// # Errors
/// Returns `InvalidConfiguration` for unknown placeholders, trailing `?`,
/// or unknown class letters. An empty mask parses to an empty vector.
pub fn parse_mask(mask: &str) -> Result<Vec<CharClass>, GenerateError> {
	let mut classes = Vec::new();
	let mut chars = mask.chars();

	while let Some(c) = chars.next() {
		let class = match c {
			'?' => match chars.next() {
				Some('l') => CharClass::Lower,
				Some('u') => CharClass::Upper,
				Some('d') => CharClass::Digit,
				Some('s') => CharClass::Symbol,
				Some(other) => {
					return Err(GenerateError::InvalidConfiguration(format!(
						"unknown mask placeholder '?{other}' in '{mask}'"
					)));
				}
				None => {
					return Err(GenerateError::InvalidConfiguration(format!(
						"dangling '?' at end of mask '{mask}'"
					)));
				}
			},
			'L' | 'l' => CharClass::Lower,
			'U' | 'u' => CharClass::Upper,
			'D' | 'd' => CharClass::Digit,
			'S' | 's' => CharClass::Symbol,
			other => {
				return Err(GenerateError::InvalidConfiguration(format!(
					"unknown mask symbol '{other}' in '{mask}'"
				)));
			}
		};
		classes.push(class);
	}

	Ok(classes)
}
