use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A recursive, JSON-like configuration document.
///
/// `conf` bags are merged top-down from instance defaults through the flow
/// and module definitions to the task record an external worker reads: maps
/// merge key-wise (recursing into nested maps), lists concatenate, and any
/// other value in the overlay replaces the base value outright.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfValue {
	#[default]
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	List(Vec<ConfValue>),
	Map(BTreeMap<String, ConfValue>),
}

impl ConfValue {
	pub fn map() -> Self {
		Self::Map(BTreeMap::new())
	}

	pub fn as_map(&self) -> Option<&BTreeMap<String, ConfValue>> {
		match self {
			Self::Map(m) => Some(m),
			_ => None,
		}
	}

	/// Merge `overlay` into `self`, overlay taking precedence.
	pub fn merge(&mut self, overlay: &ConfValue) {
		match (self, overlay) {
			(Self::Map(base), Self::Map(over)) => {
				for (key, value) in over {
					match base.get_mut(key) {
						Some(existing) => existing.merge(value),
						None => {
							base.insert(key.clone(), value.clone());
						}
					}
				}
			}
			(Self::List(base), Self::List(over)) => {
				base.extend(over.iter().cloned());
			}
			(slot, over) => {
				*slot = over.clone();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn map(pairs: &[(&str, ConfValue)]) -> ConfValue {
		ConfValue::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
	}

	#[test]
	fn scalar_overlay_replaces() {
		let mut base = ConfValue::Int(1);
		base.merge(&ConfValue::Int(2));
		assert_eq!(base, ConfValue::Int(2));
	}

	#[test]
	fn maps_merge_recursively() {
		let mut base = map(&[
			("a", ConfValue::Int(1)),
			("nested", map(&[("x", ConfValue::Int(1))])),
		]);
		let overlay = map(&[
			("b", ConfValue::Int(2)),
			("nested", map(&[("y", ConfValue::Int(2))])),
		]);
		base.merge(&overlay);

		let expected = map(&[
			("a", ConfValue::Int(1)),
			("b", ConfValue::Int(2)),
			("nested", map(&[("x", ConfValue::Int(1)), ("y", ConfValue::Int(2))])),
		]);
		assert_eq!(base, expected);
	}

	#[test]
	fn lists_concatenate() {
		let mut base = ConfValue::List(vec![ConfValue::Int(1)]);
		base.merge(&ConfValue::List(vec![ConfValue::Int(2)]));
		assert_eq!(base, ConfValue::List(vec![ConfValue::Int(1), ConfValue::Int(2)]));
	}
}
