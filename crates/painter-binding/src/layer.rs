use crate::strategy::{Strategy, StrategyList};
use serde::{Deserialize, Serialize};

pub const STACK_STAGE: &str = "locate_stack";
pub const FILL_STAGE: &str = "insert_fill";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStrategy {
    AllStacks,
    GetStack,
}

impl StackStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            StackStrategy::AllStacks => "all_stacks",
            StackStrategy::GetStack => "get_stack",
        }
    }
}

impl Strategy for StackStrategy {
    fn label(&self) -> String {
        format!("texture_set.{}", self.as_str())
    }

    fn capability(&self) -> Option<&'static str> {
        Some(match self {
            StackStrategy::AllStacks => "texture_set.all_stacks",
            StackStrategy::GetStack => "texture_set.get_stack",
        })
    }
}

pub fn stack_strategies() -> StrategyList<StackStrategy> {
    StrategyList::new(
        STACK_STAGE,
        vec![StackStrategy::AllStacks, StackStrategy::GetStack],
    )
}

/// Where the fill layer is inserted. Node-relative positions use the first
/// root layer of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPosition {
    FromStack,
    AboveNode,
    BelowNode,
    InsideNode,
    Unpositioned,
}

impl FillPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            FillPosition::FromStack => "from_stack",
            FillPosition::AboveNode => "above_node",
            FillPosition::BelowNode => "below_node",
            FillPosition::InsideNode => "inside_node",
            FillPosition::Unpositioned => "unpositioned",
        }
    }

    pub fn needs_root(self) -> bool {
        matches!(
            self,
            FillPosition::AboveNode | FillPosition::BelowNode | FillPosition::InsideNode
        )
    }
}

impl Strategy for FillPosition {
    fn label(&self) -> String {
        match self {
            FillPosition::FromStack => "insert_fill(InsertPosition.from_textureset_stack)".to_string(),
            FillPosition::Unpositioned => "insert_fill()".to_string(),
            other => format!("insert_fill(InsertPosition.{}(root))", other.as_str()),
        }
    }

    fn capability(&self) -> Option<&'static str> {
        Some(match self {
            FillPosition::FromStack => "InsertPosition.from_textureset_stack",
            FillPosition::AboveNode => "InsertPosition.above_node",
            FillPosition::BelowNode => "InsertPosition.below_node",
            FillPosition::InsideNode => "InsertPosition.inside_node",
            FillPosition::Unpositioned => "layerstack.insert_fill",
        })
    }
}

pub fn fill_strategies() -> StrategyList<FillPosition> {
    StrategyList::new(
        FILL_STAGE,
        vec![
            FillPosition::FromStack,
            FillPosition::AboveNode,
            FillPosition::BelowNode,
            FillPosition::InsideNode,
            FillPosition::Unpositioned,
        ],
    )
}
