use crypto_hash::{Algorithm, hex_digest};

/// An ordered collection of plaintext passwords under analysis.
///
/// Duplicates are allowed and increase weight in every distribution.
/// A corpus is immutable once constructed; analysis never mutates it and
/// nothing of it survives into the model except aggregate statistics.
///
/// ## Invariants
/// - `id` is a stable content digest (SHA-256 hex), usable for provenance
///   but not reversible to the entries.
#[derive(Clone, Debug)]
pub struct Corpus {
	entries: Vec<String>,
	id: String,
}

impl Corpus {
	/// Builds a corpus from already-decoded entries.
	pub fn from_entries(entries: Vec<String>) -> Self {
		let mut digest_input = Vec::new();
		for entry in &entries {
			digest_input.extend_from_slice(entry.as_bytes());
			digest_input.push(b'\n');
		}
		let id = hex_digest(Algorithm::SHA256, &digest_input);
		Self { entries, id }
	}

	/// Decodes a newline-delimited UTF-8 byte stream into a corpus.
	///
	/// Lines that are not valid UTF-8 are skipped, as are blank lines.
	/// Returns the corpus together with the number of skipped lines so the
	/// caller can warn about them.
	pub fn from_utf8_lines(bytes: &[u8]) -> (Self, usize) {
		let mut entries = Vec::new();
		let mut skipped = 0;

		for raw_line in bytes.split(|b| *b == b'\n') {
			// Tolerate CRLF input.
			let raw_line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
			if raw_line.is_empty() {
				continue;
			}
			match std::str::from_utf8(raw_line) {
				Ok(line) => entries.push(line.to_owned()),
				Err(_) => skipped += 1,
			}
		}

		(Self::from_entries(entries), skipped)
	}

	/// Stable identifier of this corpus (content digest, hex).
	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterates over the entries in load order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(String::as_str)
	}

	/// Entries as a slice (used for sharded analysis chunking).
	pub fn entries(&self) -> &[String] {
		&self.entries
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn id_is_stable_and_content_sensitive() {
		let a = Corpus::from_entries(vec!["password".into(), "admin".into()]);
		let b = Corpus::from_entries(vec!["password".into(), "admin".into()]);
		let c = Corpus::from_entries(vec!["admin".into(), "password".into()]);
		assert_eq!(a.id(), b.id());
		assert_ne!(a.id(), c.id());
		assert_eq!(a.id().len(), 64);
	}

	#[test]
	fn invalid_utf8_lines_are_skipped_not_fatal() {
		let bytes = b"password\n\xff\xfe\nadmin\n\n123456";
		let (corpus, skipped) = Corpus::from_utf8_lines(bytes);
		assert_eq!(skipped, 1);
		let entries: Vec<&str> = corpus.iter().collect();
		assert_eq!(entries, vec!["password", "admin", "123456"]);
	}

	#[test]
	fn crlf_is_tolerated() {
		let (corpus, skipped) = Corpus::from_utf8_lines(b"password\r\nadmin\r\n");
		assert_eq!(skipped, 0);
		let entries: Vec<&str> = corpus.iter().collect();
		assert_eq!(entries, vec!["password", "admin"]);
	}
}
