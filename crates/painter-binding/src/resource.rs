use crate::strategy::{Strategy, StrategyList};
use serde::{Deserialize, Serialize};

pub const IMPORT_STAGE: &str = "import_resource";
pub const IDENTIFIER_STAGE: &str = "resource_identifier";

const ACCESSORS: &[&str] = &["identifier", "resource_id", "id", "resourceId"];
const FACTORIES: &[&str] = &["from_resource", "fromResource", "from_handle", "fromHandle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStrategy {
    ProjectResourceUsage,
    ProjectResourceUsageKeyword,
    ProjectResource,
    ImportProject,
    Import,
}

impl ImportStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportStrategy::ProjectResourceUsage => "project_resource_usage",
            ImportStrategy::ProjectResourceUsageKeyword => "project_resource_usage_keyword",
            ImportStrategy::ProjectResource => "project_resource",
            ImportStrategy::ImportProject => "import_project",
            ImportStrategy::Import => "import_",
        }
    }
}

impl Strategy for ImportStrategy {
    fn label(&self) -> String {
        match self {
            ImportStrategy::ProjectResourceUsage => "import_project_resource(path, usage)",
            ImportStrategy::ProjectResourceUsageKeyword => {
                "import_project_resource(path, resource_usage=usage)"
            }
            ImportStrategy::ProjectResource => "import_project_resource(path)",
            ImportStrategy::ImportProject => "import_project(path)",
            ImportStrategy::Import => "import_(path)",
        }
        .to_string()
    }

    fn capability(&self) -> Option<&'static str> {
        Some(match self {
            ImportStrategy::ProjectResourceUsage
            | ImportStrategy::ProjectResourceUsageKeyword
            | ImportStrategy::ProjectResource => "resource.import_project_resource",
            ImportStrategy::ImportProject => "resource.import_project",
            ImportStrategy::Import => "resource.import_",
        })
    }
}

pub fn import_strategies() -> StrategyList<ImportStrategy> {
    StrategyList::new(
        IMPORT_STAGE,
        vec![
            ImportStrategy::ProjectResourceUsage,
            ImportStrategy::ProjectResourceUsageKeyword,
            ImportStrategy::ProjectResource,
            ImportStrategy::ImportProject,
            ImportStrategy::Import,
        ],
    )
}

/// What a conversion is applied to: the imported object or its inner handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierTarget {
    Resource,
    RawHandle,
}

impl IdentifierTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierTarget::Resource => "resource",
            IdentifierTarget::RawHandle => "raw_handle",
        }
    }
}

/// One way of turning an imported resource into the canonical identifier type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentifierStrategy {
    Identity,
    Accessor { name: String },
    Constructor { target: IdentifierTarget },
    Factory { name: String, target: IdentifierTarget },
}

impl IdentifierStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            IdentifierStrategy::Identity => "identity",
            IdentifierStrategy::Accessor { .. } => "accessor",
            IdentifierStrategy::Constructor { .. } => "constructor",
            IdentifierStrategy::Factory { .. } => "factory",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            IdentifierStrategy::Accessor { name } | IdentifierStrategy::Factory { name, .. } => {
                Some(name.as_str())
            }
            _ => None,
        }
    }

    pub fn target(&self) -> IdentifierTarget {
        match self {
            IdentifierStrategy::Constructor { target } | IdentifierStrategy::Factory { target, .. } => {
                *target
            }
            _ => IdentifierTarget::Resource,
        }
    }
}

impl Strategy for IdentifierStrategy {
    fn label(&self) -> String {
        match self {
            IdentifierStrategy::Identity => "identity".to_string(),
            IdentifierStrategy::Accessor { name } => format!("resource.{name}"),
            IdentifierStrategy::Constructor { target } => {
                format!("ResourceID({})", target.as_str())
            }
            IdentifierStrategy::Factory { name, target } => {
                format!("ResourceID.{name}({})", target.as_str())
            }
        }
    }

    fn capability(&self) -> Option<&'static str> {
        match self {
            IdentifierStrategy::Identity | IdentifierStrategy::Accessor { .. } => None,
            IdentifierStrategy::Constructor { .. } => Some("resource.ResourceID"),
            IdentifierStrategy::Factory { name, .. } => match name.as_str() {
                "from_resource" => Some("ResourceID.from_resource"),
                "fromResource" => Some("ResourceID.fromResource"),
                "from_handle" => Some("ResourceID.from_handle"),
                "fromHandle" => Some("ResourceID.fromHandle"),
                _ => Some("resource.ResourceID"),
            },
        }
    }
}

/// Identity, then accessors, then constructors, then factories; each
/// conversion tried on the resource before its raw handle.
pub fn identifier_strategies() -> StrategyList<IdentifierStrategy> {
    let mut strategies = vec![IdentifierStrategy::Identity];
    strategies.extend(ACCESSORS.iter().map(|name| IdentifierStrategy::Accessor {
        name: name.to_string(),
    }));
    for target in [IdentifierTarget::Resource, IdentifierTarget::RawHandle] {
        strategies.push(IdentifierStrategy::Constructor { target });
    }
    for name in FACTORIES {
        for target in [IdentifierTarget::Resource, IdentifierTarget::RawHandle] {
            strategies.push(IdentifierStrategy::Factory {
                name: name.to_string(),
                target,
            });
        }
    }
    StrategyList::new(IDENTIFIER_STAGE, strategies)
}
