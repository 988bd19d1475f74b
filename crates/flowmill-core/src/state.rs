use serde::Serialize;

/// A module or task's lifecycle state.
///
/// The same enum serves leaves, flows, and tasks: flows never have a state
/// of their own, it is always the reduction of their children (see
/// [`reduce`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
	Ready,
	Waiting,
	Paused,
	Running,
	Finished,
	Failed,
}

impl State {
	/// Reduce a flow's children states into the flow's own state.
	///
	/// A single unique state wins outright; otherwise the first match in
	/// `Failed > Running > Waiting > Paused > Ready` wins. `Finished` only
	/// ever appears through the unique-state case, i.e. when every child is
	/// `Finished`.
	pub fn reduce<'a>(children: impl Iterator<Item = &'a State> + Clone) -> State {
		let mut first = None;
		let mut all_same = true;
		for s in children.clone() {
			match first {
				None => first = Some(*s),
				Some(f) if f == *s => {}
				Some(_) => {
					all_same = false;
					break;
				}
			}
		}

		if all_same {
			return first.unwrap_or(State::Finished);
		}

		for candidate in [State::Failed, State::Running, State::Waiting, State::Paused, State::Ready] {
			if children.clone().any(|s| *s == candidate) {
				return candidate;
			}
		}

		// Unreachable: every state is one of the five above.
		State::Failed
	}
}
