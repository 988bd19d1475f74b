use smartstring::{LazyCompact, SmartString};

/// A cheap, cloneable identifier: module ids, port names, task ids.
pub type Ident = SmartString<LazyCompact>;

/// Join a namespace and a local name into a dotted identifier.
pub fn join(namespace: &str, name: &str) -> Ident {
	if namespace.is_empty() {
		Ident::from(name)
	} else {
		let mut s = Ident::from(namespace);
		s.push('.');
		s.push_str(name);
		s
	}
}
