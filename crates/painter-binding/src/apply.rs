use crate::channel::{normalize_key, resolve_channel, ChannelEnumeration, ChannelMatch};
use crate::layer::{fill_strategies, stack_strategies};
use crate::provision::{is_already_exists, provisioning_plan};
use crate::report::{
    fingerprint_file, ChannelResolution, FailureKind, ResourceBinding, TaskReport,
};
use crate::resource::{identifier_strategies, import_strategies};
use crate::strategy::{Capabilities, Strategy};
use crate::surface::{Handle, RemoteObject, RemoteSurface, StackInspection};
use crate::task::TextureSetTask;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_WAIT_TRIES: u32 = 20;
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct BindingOptions {
    pub version: String,
    pub provision_missing: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            version: String::new(),
            provision_missing: true,
        }
    }
}

/// Configures one texture set: resolves channels, provisions them, creates a
/// fill layer and binds every imported texture to it. Failures are recorded
/// in the returned report; nothing here aborts the run.
pub fn apply_texture_set<S: RemoteSurface + ?Sized>(
    surface: &mut S,
    task: &TextureSetTask,
    options: &BindingOptions,
) -> TaskReport {
    let mut report = TaskReport::new(&task.name, &options.version);
    info!(task = %task.name, keys = ?task.keys(), "applying texture set");

    report.bindings = task
        .bindings
        .iter()
        .map(|binding| {
            let mut entry = ResourceBinding::new(&binding.key, &binding.path);
            match fingerprint_file(Path::new(&binding.path)) {
                Ok(fingerprint) => entry.source = Some(fingerprint),
                Err(err) => entry.fail(FailureKind::MissingFile, err),
            }
            entry
        })
        .collect();

    apply_inner(surface, task, options, &mut report);

    for binding in report.bindings.iter_mut().filter(|b| b.is_pending()) {
        binding.fail(FailureKind::TargetUnavailable, "texture set was not configured");
    }
    let summary = report.summary();
    info!(
        task = %task.name,
        bindings_ok = summary.bindings_ok,
        bindings_failed = summary.bindings_failed,
        attempts = summary.attempts,
        "texture set applied"
    );
    report.completed = true;
    report
}

fn apply_inner<S: RemoteSurface + ?Sized>(
    surface: &mut S,
    task: &TextureSetTask,
    options: &BindingOptions,
    report: &mut TaskReport,
) {
    let texture_set = match surface.open_texture_set(&task.name) {
        Ok(texture_set) => {
            report.attempts.record(
                "open_texture_set",
                None,
                format!("texture_set({})", task.name),
                Ok(()),
            );
            texture_set
        }
        Err(err) => {
            warn!(task = %task.name, error = %err, "texture set not found");
            report.attempts.record(
                "open_texture_set",
                None,
                format!("texture_set({})", task.name),
                Err(err.clone()),
            );
            report.push_error(format!("texture set unavailable: {err}"));
            return;
        }
    };
    report.texture_set = Some(texture_set.object.repr.clone());
    report.channel_members = texture_set.channel_members.clone();
    let mut capabilities = Capabilities::from_reported(texture_set.capabilities.clone());
    let enumeration = ChannelEnumeration::new(texture_set.channel_members.clone());
    let ts_handle = texture_set.object.handle.clone();

    report.channels = task
        .bindings
        .iter()
        .map(|binding| resolve_for_report(&binding.key, &enumeration))
        .collect();
    for binding in report.bindings.iter_mut() {
        let resolution = report.channels.iter().find(|c| c.key == binding.key);
        binding.channel = resolution.and_then(|c| c.resolved_channel.clone());
    }

    let stack = stack_strategies().run(None, &capabilities, &mut report.attempts, |strategy| {
        surface.locate_stack(&ts_handle, *strategy)
    });
    let Some(stack) = stack else {
        report.push_error("no layer stack could be located");
        return;
    };
    let stack: RemoteObject = stack.value;
    report.stack = Some(stack.repr.clone());

    let inspection = match surface.inspect_stack(&ts_handle, &stack.handle) {
        Ok(inspection) => {
            report
                .attempts
                .record("inspect_stack", None, "inspect_stack".to_string(), Ok(()));
            inspection
        }
        Err(err) => {
            report.attempts.record(
                "inspect_stack",
                None,
                "inspect_stack".to_string(),
                Err(err),
            );
            StackInspection::default()
        }
    };
    if !inspection.capabilities.is_empty() {
        capabilities = Capabilities::from_reported(inspection.capabilities.clone());
    }
    report.capabilities = capabilities.names();
    report.channel_formats = inspection.channel_formats.clone();
    report.existing_channels = inspection.existing_channels.clone();

    if options.provision_missing {
        provision_channels(surface, &ts_handle, &stack.handle, &inspection, &capabilities, report);
    }

    let roots = inspection.root_layers.clone();
    let fill = fill_strategies().run(None, &capabilities, &mut report.attempts, |position| {
        let root = if position.needs_root() {
            Some(&roots.first().ok_or("no root layer to position against")?.handle)
        } else {
            None
        };
        surface.insert_fill(&stack.handle, *position, root)
    });
    let Some(fill) = fill else {
        report.push_error("fill layer creation failed");
        return;
    };
    let fill: RemoteObject = fill.value;
    report.fill = Some(fill.repr.clone());

    bind_resources(surface, &fill.handle, &capabilities, report);
}

fn resolve_for_report(key: &str, enumeration: &ChannelEnumeration) -> ChannelResolution {
    match resolve_channel(key, enumeration) {
        Ok(resolved) => ChannelResolution {
            key: key.to_string(),
            resolved_channel: Some(resolved.member),
            matched_by: Some(match resolved.matched {
                ChannelMatch::Exact => "exact".to_string(),
                ChannelMatch::Alias { bucket } => format!("alias:{bucket}"),
            }),
            ..ChannelResolution::default()
        },
        Err(err) => ChannelResolution {
            key: key.to_string(),
            error: Some(err.to_string()),
            ..ChannelResolution::default()
        },
    }
}

fn channel_present(existing: &[String], member: &str) -> bool {
    let wanted = normalize_key(member);
    existing.iter().any(|name| {
        let last = name.rsplit('.').next().unwrap_or(name);
        normalize_key(last) == wanted
    })
}

fn provision_channels<S: RemoteSurface + ?Sized>(
    surface: &mut S,
    texture_set: &Handle,
    stack: &Handle,
    inspection: &StackInspection,
    capabilities: &Capabilities,
    report: &mut TaskReport,
) {
    // Several keys may resolve to one channel; it is provisioned once.
    let mut done: BTreeMap<String, (bool, Option<String>)> = BTreeMap::new();
    for index in 0..report.channels.len() {
        let Some(member) = report.channels[index].resolved_channel.clone() else {
            continue;
        };
        let key = report.channels[index].key.clone();
        let outcome = match done.get(&member) {
            Some(outcome) => outcome.clone(),
            None => {
                let outcome = if channel_present(&inspection.existing_channels, &member) {
                    (true, Some("already_present".to_string()))
                } else {
                    let plan = provisioning_plan(&member, &inspection.channel_formats);
                    let resolved = plan.run(
                        Some(key.as_str()),
                        capabilities,
                        &mut report.attempts,
                        |attempt| match surface.add_channel(texture_set, stack, &member, attempt) {
                            Ok(()) => Ok(attempt.label()),
                            Err(err) if is_already_exists(&err) => {
                                Ok(format!("already_exists({})", attempt.label()))
                            }
                            Err(err) => Err(err),
                        },
                    );
                    match resolved {
                        Some(resolved) => (true, Some(resolved.value)),
                        None => {
                            warn!(key = %key, channel = %member, "channel provisioning exhausted");
                            (false, None)
                        }
                    }
                };
                done.insert(member.clone(), outcome.clone());
                outcome
            }
        };
        let entry = &mut report.channels[index];
        entry.provisioned = outcome.0;
        entry.provision_strategy = outcome.1;
    }
}

fn bind_resources<S: RemoteSurface + ?Sized>(
    surface: &mut S,
    fill: &Handle,
    capabilities: &Capabilities,
    report: &mut TaskReport,
) {
    let imports = import_strategies();
    let identifiers = identifier_strategies();
    for index in 0..report.bindings.len() {
        if !report.bindings[index].is_pending() {
            continue;
        }
        let key = report.bindings[index].key.clone();
        let path = report.bindings[index].path.clone();
        let Some(channel) = report.bindings[index].channel.clone() else {
            let reason = report
                .channel(&key)
                .and_then(|c| c.error.clone())
                .unwrap_or_else(|| format!("no channel for {key}"));
            report.bindings[index].fail(FailureKind::ChannelUnresolved, reason);
            continue;
        };

        let imported = imports.run(
            Some(key.as_str()),
            capabilities,
            &mut report.attempts,
            |strategy| surface.import_resource(&path, *strategy),
        );
        let Some(imported) = imported else {
            warn!(key = %key, path = %path, "texture import failed");
            report.bindings[index].fail(FailureKind::ImportFailed, "no import strategy succeeded");
            continue;
        };
        {
            let binding = &mut report.bindings[index];
            binding.import_ok = true;
            binding.import_strategy = Some(imported.label.clone());
            binding.resource = Some(imported.value.repr.clone());
        }

        let resource = imported.value.handle;
        let identifier = identifiers.run(
            Some(key.as_str()),
            capabilities,
            &mut report.attempts,
            |strategy| surface.resource_identifier(&resource, strategy),
        );
        let Some(identifier) = identifier else {
            warn!(key = %key, "no canonical identifier for imported resource");
            report.bindings[index].fail(
                FailureKind::IdentifierUnresolved,
                format!("no identifier strategy produced a canonical id for {key}"),
            );
            continue;
        };
        {
            let binding = &mut report.bindings[index];
            binding.resolved_identifier = Some(identifier.value.repr.clone());
            binding.identifier_strategy = Some(identifier.label.clone());
        }

        let bound = surface.set_source(fill, &channel, &identifier.value.handle);
        report.attempts.record(
            "set_source",
            Some(key.as_str()),
            format!("fill.set_source({channel})"),
            bound.clone(),
        );
        match bound {
            Ok(()) => {
                info!(key = %key, channel = %channel, "texture bound");
                report.bindings[index].bind_ok = true;
            }
            Err(err) => {
                warn!(key = %key, channel = %channel, error = %err, "set_source failed");
                report.bindings[index].fail(FailureKind::BindFailed, err);
            }
        }
    }
}
