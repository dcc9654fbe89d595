use serde::{Deserialize, Serialize};

/// Structural kind of a password segment.
///
/// `Year` is a specialization of `Digits`: a 4-digit run whose value lies
/// in `[1900, 2099]`. `Mixed` covers interleaved letter/digit spans with
/// no clean run boundary.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
	Word,
	Digits,
	Symbols,
	Year,
	Mixed,
}

/// A typed, contiguous span of a password string.
///
/// ## Invariants
/// - Concatenating a password's tokens in order reconstructs the original
///   string exactly.
/// - Tokens never overlap; every character belongs to exactly one token.
/// - `start` is a character offset (not a byte offset).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
	pub kind: TokenKind,
	pub text: String,
	pub start: usize,
}

impl Token {
	/// Length of the token in characters.
	pub fn len(&self) -> usize {
		self.text.chars().count()
	}

	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}
}

/// Coarse run class used during the first segmentation pass.
#[derive(Clone, Copy, PartialEq, Eq)]
enum RunClass {
	Letter,
	Digit,
	Other,
}

impl RunClass {
	fn of_char(c: char) -> Self {
		if c.is_ascii_alphabetic() {
			Self::Letter
		} else if c.is_ascii_digit() {
			Self::Digit
		} else {
			Self::Other
		}
	}
}

/// A maximal run of same-class characters (intermediate representation).
struct Run {
	class: RunClass,
	text: String,
	start: usize,
}

/// Splits a password into an ordered, non-overlapping, fully covering
/// sequence of typed tokens.
///
/// Rules, applied greedily left to right on maximal runs:
/// 1. ASCII letter run → `Word`
/// 2. 4-digit run with value in `[1900, 2099]` → `Year` (beats `Digits`)
/// 3. any other digit run → `Digits`
/// 4. non-alphanumeric run → `Symbols`
/// 5. three or more consecutive single-character runs alternating between
///    letters and digits collapse into one `Mixed` token (e.g. `"a1b"`);
///    a plain two-run boundary like `"abc123"` stays `Word` + `Digits`.
///
/// # Notes
/// - The empty string yields an empty sequence, not an error.
/// - Decisions are local to the current run; no global optimization.
/// - O(length) over characters.
pub fn tokenize(password: &str) -> Vec<Token> {
	let runs = split_runs(password);
	let mut tokens = Vec::with_capacity(runs.len());

	let mut i = 0;
	while i < runs.len() {
		// Try to open a mixed span: >= 3 consecutive length-1 runs
		// alternating between letters and digits.
		let span = mixed_span_len(&runs[i..]);
		if span >= 3 {
			let start = runs[i].start;
			let text: String = runs[i..i + span].iter().map(|r| r.text.as_str()).collect();
			tokens.push(Token { kind: TokenKind::Mixed, text, start });
			i += span;
			continue;
		}

		let run = &runs[i];
		let kind = match run.class {
			RunClass::Letter => TokenKind::Word,
			RunClass::Digit => classify_digits(&run.text),
			RunClass::Other => TokenKind::Symbols,
		};
		tokens.push(Token { kind, text: run.text.clone(), start: run.start });
		i += 1;
	}

	tokens
}

/// First pass: maximal runs of the same coarse class.
fn split_runs(password: &str) -> Vec<Run> {
	let mut runs: Vec<Run> = Vec::new();

	for (offset, c) in password.chars().enumerate() {
		let class = RunClass::of_char(c);
		match runs.last_mut() {
			Some(run) if run.class == class => run.text.push(c),
			_ => runs.push(Run { class, text: c.to_string(), start: offset }),
		}
	}

	runs
}

/// Length of the alternating letter/digit prefix of `runs` where every run
/// is a single character. Returns 0 or 1 when no alternation starts here.
fn mixed_span_len(runs: &[Run]) -> usize {
	let mut span = 0;
	for (i, run) in runs.iter().enumerate() {
		let alternates = match run.class {
			RunClass::Other => false,
			class => i == 0 || class != runs[i - 1].class,
		};
		if run.text.chars().count() == 1 && alternates {
			span += 1;
		} else {
			break;
		}
	}
	span
}

/// Year takes priority over generic digits for in-range 4-digit runs.
fn classify_digits(text: &str) -> TokenKind {
	if text.len() == 4 {
		if let Ok(value) = text.parse::<u32>() {
			if (1900..=2099).contains(&value) {
				return TokenKind::Year;
			}
		}
	}
	TokenKind::Digits
}
