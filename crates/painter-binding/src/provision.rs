use crate::channel::candidate_formats;
use crate::strategy::{Strategy, StrategyList};
use serde::{Deserialize, Serialize};

pub const PROVISION_STAGE: &str = "add_channel";

const ALREADY_EXISTS_MARKERS: &[&str] = &["already", "exist", "present", "duplicate"];

/// Where a channel-add call is made on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSite {
    Stack,
    TextureSet,
    ModuleTextureSet,
    ModuleStack,
    StackEditChannelList,
    StackSetChannels,
}

impl CallSite {
    pub fn as_str(self) -> &'static str {
        match self {
            CallSite::Stack => "stack",
            CallSite::TextureSet => "texture_set",
            CallSite::ModuleTextureSet => "module_texture_set",
            CallSite::ModuleStack => "module_stack",
            CallSite::StackEditChannelList => "stack_edit_channel_list",
            CallSite::StackSetChannels => "stack_set_channels",
        }
    }

    pub fn capability(self) -> &'static str {
        match self {
            CallSite::Stack => "stack.add_channel",
            CallSite::TextureSet => "texture_set.add_channel",
            CallSite::ModuleTextureSet | CallSite::ModuleStack => "textureset.add_channel",
            CallSite::StackEditChannelList => "stack.edit_channel_list",
            CallSite::StackSetChannels => "stack.set_channels",
        }
    }

    /// List-edit sites take the channel alone.
    pub fn accepts_format(self) -> bool {
        !matches!(
            self,
            CallSite::StackEditChannelList | CallSite::StackSetChannels
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionAttempt {
    pub site: CallSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Strategy for ProvisionAttempt {
    fn label(&self) -> String {
        match &self.format {
            Some(format) => format!("{}(channel, {format})", self.site.as_str()),
            None => format!("{}(channel)", self.site.as_str()),
        }
    }

    fn capability(&self) -> Option<&'static str> {
        Some(self.site.capability())
    }
}

fn sites_for(format: &Option<String>) -> Vec<(CallSite, Option<String>)> {
    match format {
        Some(_) => vec![
            (CallSite::Stack, format.clone()),
            (CallSite::Stack, None),
            (CallSite::TextureSet, format.clone()),
            (CallSite::TextureSet, None),
            (CallSite::ModuleTextureSet, format.clone()),
            (CallSite::ModuleStack, format.clone()),
            (CallSite::ModuleTextureSet, None),
            (CallSite::StackEditChannelList, None),
            (CallSite::StackSetChannels, None),
        ],
        None => vec![
            (CallSite::Stack, None),
            (CallSite::TextureSet, None),
            (CallSite::ModuleTextureSet, None),
            (CallSite::StackEditChannelList, None),
            (CallSite::StackSetChannels, None),
        ],
    }
}

/// Candidate formats crossed with call sites, in trial order. A pair that
/// already appeared earlier in the plan is not repeated.
pub fn provisioning_plan(channel: &str, available_formats: &[String]) -> StrategyList<ProvisionAttempt> {
    let mut plan: Vec<ProvisionAttempt> = Vec::new();
    for format in candidate_formats(channel, available_formats) {
        for (site, format) in sites_for(&format) {
            let attempt = ProvisionAttempt { site, format };
            if !plan.contains(&attempt) {
                plan.push(attempt);
            }
        }
    }
    StrategyList::new(PROVISION_STAGE, plan)
}

/// Provisioning failures that mean the channel is already there.
pub fn is_already_exists(message: &str) -> bool {
    let lower = message.to_lowercase();
    ALREADY_EXISTS_MARKERS.iter().any(|m| lower.contains(m))
}
