use serde::Deserialize;

use crate::conf::ConfValue;

/// A port declared on a flow or a module.
///
/// Port definitions carry no data, only topology: `link` names the upstream
/// ports this one draws from (relative to the enclosing flow's namespace);
/// an empty `link` marks a source port whose data is freshly allocated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PortModel {
	pub name: String,
	pub title: Option<String>,
	pub desc: Option<String>,
	pub enabled: Option<bool>,
	pub serializer: Option<String>,
	pub wsize: Option<u64>,
	pub link: Vec<String>,
}

/// A module declared inside a flow: either a leaf (no `flow_ref`) or an
/// inclusion of another flow (`flow_ref` set, in which case `in_ports`/
/// `out_ports` carry only the override fields matched by name).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleModel {
	pub name: String,
	pub title: Option<String>,
	pub desc: Option<String>,
	pub enabled: Option<bool>,
	pub serializer: Option<String>,
	pub conf: Option<ConfValue>,
	pub priority: Option<f64>,
	pub wsize: Option<u64>,
	pub maxpar: Option<u64>,
	pub depends: Vec<String>,
	pub flow_ref: Option<String>,
	pub in_ports: Vec<PortModel>,
	pub out_ports: Vec<PortModel>,
}

/// A flow: a composite module. Its `in_ports`/`out_ports` are the "outer"
/// ports exposed to whatever includes this flow via `flow_ref`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlowModel {
	pub name: String,
	pub serializer: Option<String>,
	pub conf: Option<ConfValue>,
	pub in_ports: Vec<PortModel>,
	pub out_ports: Vec<PortModel>,
	pub modules: Vec<ModuleModel>,
}
