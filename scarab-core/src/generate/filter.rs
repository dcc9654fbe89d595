use std::collections::BTreeSet;

use crate::mask::CharClass;

use super::config::GenerationConfig;

/// Length and character-class policy applied to every raw candidate.
///
/// A candidate only counts as emitted after passing this filter; rejected
/// ones consume attempt budget and nothing else.
#[derive(Clone, Debug)]
pub struct PolicyFilter {
	min_length: usize,
	max_length: usize,
	required: BTreeSet<CharClass>,
}

impl PolicyFilter {
	pub fn from_config(config: &GenerationConfig) -> Self {
		Self {
			min_length: config.min_length,
			max_length: config.max_length,
			required: config.required_classes.clone(),
		}
	}

	/// Whether a candidate satisfies the length bounds and contains every
	/// required character class.
	pub fn accepts(&self, candidate: &str) -> bool {
		let length = candidate.chars().count();
		if length < self.min_length || length > self.max_length {
			return false;
		}

		if self.required.is_empty() {
			return true;
		}

		let mut present = [false; 4];
		for c in candidate.chars() {
			present[CharClass::of_char(c) as usize] = true;
		}
		self.required.iter().all(|class| present[*class as usize])
	}
}
