use painter_job::{
    JobConfig, JobError, JobOrchestrator, JobStatus, ProvisionRequest, RemoteJob,
};
use painter_remote::{Dispatch, DispatchRequest, RemoteReply, TransportError};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Behaviour {
    drop_job_id: bool,
    polls_until_ready: u32,
    never_ready: bool,
    fail_create: bool,
    fail_save: bool,
}

#[derive(Default)]
struct State {
    record: Option<Value>,
    polls: u32,
    ops: Vec<String>,
    poll_timeouts: Vec<Duration>,
    save_params: Option<Value>,
}

/// In-memory stand-in for the remote job registry.
struct FakeRegistry {
    behaviour: Behaviour,
    state: Mutex<State>,
}

impl FakeRegistry {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            state: Mutex::new(State::default()),
        }
    }

    fn ops(&self) -> Vec<String> {
        self.state.lock().expect("lock").ops.clone()
    }
}

impl Dispatch for FakeRegistry {
    fn dispatch(
        &self,
        request: &DispatchRequest,
        timeout: Duration,
    ) -> Result<RemoteReply, TransportError> {
        let mut state = self.state.lock().expect("lock");
        state.ops.push(request.op.clone());
        if request.op == "job_poll" {
            state.poll_timeouts.push(timeout);
        }
        let job_id = request.params["job_id"].as_str().unwrap_or_default().to_string();
        let reply = match request.op.as_str() {
            "job_start" => {
                state.record = Some(json!({
                    "job_id": job_id,
                    "status": "running",
                    "step": "start",
                    "mesh_path": request.params["mesh_path"],
                    "output_path": request.params["output_path"],
                }));
                if self.behaviour.drop_job_id {
                    RemoteReply::success("job_start", json!({}))
                } else {
                    RemoteReply::success("job_start", json!({ "job_id": job_id }))
                }
            }
            "job_poll" => {
                state.polls += 1;
                let polls = state.polls;
                match state.record.as_mut() {
                    Some(record) if record["job_id"] == job_id.as_str() => {
                        if record["status"] == "running"
                            && !self.behaviour.never_ready
                            && polls >= self.behaviour.polls_until_ready
                        {
                            if self.behaviour.fail_create {
                                record["status"] = json!("error");
                                record["step"] = json!("error");
                                record["error"] =
                                    json!("RuntimeError('mesh_missing_or_not_found: /m.fbx')");
                            } else {
                                record["status"] = json!("ready_for_save");
                                record["step"] = json!("create_done");
                            }
                        } else if record["status"] == "running" {
                            record["step"] = json!(format!("create_begin_{polls}"));
                        }
                        RemoteReply::success("job_poll", record.clone())
                    }
                    _ => RemoteReply::success("job_poll", Value::Null),
                }
            }
            "job_save" => {
                state.save_params = Some(request.params.clone());
                let Some(record) = state.record.as_mut() else {
                    return Ok(RemoteReply::failure("job_save", "job_state_missing"));
                };
                if record["status"] != "ready_for_save" {
                    let message = format!("not_ready_for_save:{}", record["status"]);
                    return Ok(RemoteReply::failure("job_save", &message));
                }
                if self.behaviour.fail_save {
                    record["status"] = json!("error");
                    record["step"] = json!("error");
                    record["error"] = json!("OSError('disk full')");
                    RemoteReply::failure("job_save", "disk full")
                } else {
                    record["status"] = json!("done");
                    record["step"] = json!("done");
                    RemoteReply::success(
                        "job_save",
                        json!({
                            "job_id": job_id,
                            "status": "done",
                            "step": "done",
                            "close_error": null,
                            "open_error": "reopen refused",
                        }),
                    )
                }
            }
            other => RemoteReply::failure(other, &format!("unknown_op:{other}")),
        };
        Ok(reply)
    }
}

fn fast_config() -> JobConfig {
    JobConfig {
        poll_interval: Duration::from_millis(5),
        ceiling: Duration::from_millis(200),
        ..JobConfig::default()
    }
}

fn request() -> ProvisionRequest {
    ProvisionRequest {
        mesh_path: "/assets/m.fbx".to_string(),
        output_path: "/out/m.spp".to_string(),
        save_delay_secs: 3.0,
        reopen_delay_secs: 1.5,
    }
}

#[test]
fn provision_runs_create_save_and_final_poll() {
    let remote = FakeRegistry::new(Behaviour {
        polls_until_ready: 3,
        ..Behaviour::default()
    });
    let orchestrator = JobOrchestrator::new(&remote, fast_config());

    let outcome = orchestrator.provision(&request()).expect("provision");

    assert!(outcome.succeeded());
    assert_eq!(outcome.wait.polls, 3);
    let save = outcome.save.as_ref().expect("save result");
    assert_eq!(save.open_error.as_deref(), Some("reopen refused"));
    let statuses: Vec<JobStatus> = outcome.job.transitions.iter().map(|t| t.status).collect();
    assert_eq!(statuses.first(), Some(&JobStatus::Running));
    assert!(statuses.contains(&JobStatus::ReadyForSave));
    assert_eq!(statuses.last(), Some(&JobStatus::Done));
    assert_eq!(
        remote.ops().last().map(String::as_str),
        Some("job_poll"),
        "final status comes from a poll after save"
    );

    let params = remote
        .state
        .lock()
        .expect("lock")
        .save_params
        .clone()
        .expect("save params");
    assert_eq!(params["save_delay"], 2.0);
    assert_eq!(params["reopen_delay"], 1.5);
}

#[test]
fn create_error_is_reported_and_save_is_never_attempted() {
    let remote = FakeRegistry::new(Behaviour {
        polls_until_ready: 2,
        fail_create: true,
        ..Behaviour::default()
    });
    let orchestrator = JobOrchestrator::new(&remote, fast_config());

    let outcome = orchestrator.provision(&request()).expect("provision");

    assert_eq!(outcome.status(), JobStatus::Error);
    assert!(outcome.save.is_none());
    assert!(outcome
        .job
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("mesh_missing_or_not_found"));
    assert!(!remote.ops().iter().any(|op| op == "job_save"));
}

#[test]
fn stuck_job_times_out_locally_without_save() {
    let remote = FakeRegistry::new(Behaviour {
        never_ready: true,
        ..Behaviour::default()
    });
    let config = JobConfig {
        ceiling: Duration::from_millis(40),
        ..fast_config()
    };
    let orchestrator = JobOrchestrator::new(&remote, config);

    let outcome = orchestrator.provision(&request()).expect("provision");

    assert_eq!(outcome.status(), JobStatus::Timeout);
    assert!(outcome.wait.timed_out);
    assert!(outcome.save.is_none());
    assert!(!remote.ops().iter().any(|op| op == "job_save"));
}

#[test]
fn polls_never_outlive_the_ceiling() {
    let remote = FakeRegistry::new(Behaviour {
        never_ready: true,
        ..Behaviour::default()
    });
    let ceiling = Duration::from_millis(40);
    let config = JobConfig {
        ceiling,
        poll_timeout: Duration::from_secs(20),
        ..fast_config()
    };
    let orchestrator = JobOrchestrator::new(&remote, config);
    let mut job = orchestrator.start(&request()).expect("start");

    let wait = orchestrator.wait_for_terminal(&mut job);

    assert!(wait.timed_out);
    let timeouts = remote.state.lock().expect("lock").poll_timeouts.clone();
    assert!(!timeouts.is_empty());
    assert!(timeouts.iter().all(|t| *t <= ceiling), "{timeouts:?}");
}

#[test]
fn missing_job_id_is_fatal() {
    let remote = FakeRegistry::new(Behaviour {
        drop_job_id: true,
        ..Behaviour::default()
    });
    let orchestrator = JobOrchestrator::new(&remote, fast_config());

    let err = orchestrator.provision(&request()).expect_err("identity missing");
    assert!(matches!(err, JobError::IdentityMissing { .. }), "got {err}");
    assert_eq!(remote.ops(), vec!["job_start".to_string()]);
}

#[test]
fn save_requires_ready_for_save() {
    let remote = FakeRegistry::new(Behaviour::default());
    let orchestrator = JobOrchestrator::new(&remote, fast_config());
    let job = RemoteJob::new("job-x".into(), "/m.fbx".into(), "/o.spp".into());

    let err = orchestrator.save(&job, &request()).expect_err("precondition");
    assert!(matches!(
        err,
        JobError::NotReadyForSave {
            status: JobStatus::Running
        }
    ));
    assert!(remote.ops().is_empty());
}

#[test]
fn unknown_job_polls_as_none() {
    let remote = FakeRegistry::new(Behaviour::default());
    let orchestrator = JobOrchestrator::new(&remote, fast_config());

    let snapshot = orchestrator.poll("job-never-started").expect("poll");
    assert!(snapshot.is_none());
}

#[test]
fn failed_save_ends_in_error_from_final_poll() {
    let remote = FakeRegistry::new(Behaviour {
        polls_until_ready: 1,
        fail_save: true,
        ..Behaviour::default()
    });
    let orchestrator = JobOrchestrator::new(&remote, fast_config());

    let outcome = orchestrator.provision(&request()).expect("provision");

    assert_eq!(outcome.status(), JobStatus::Error);
    let save = outcome.save.as_ref().expect("save result");
    assert_eq!(
        save.error.as_ref().map(|err| err.message.as_str()),
        Some("disk full")
    );
    assert!(outcome
        .job
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("disk full"));
}
