//! End-to-end protocol scenarios over real TCP connections.

use std::net::SocketAddr;
use std::path::Path;
use std::thread::JoinHandle;

use silkbridge_core::task::CheckpointStore;
use silkbridge_core::traits::EngineProvider;
use silkbridge_core::types::TaskSpec;
use silkbridge_policy::LinearPpoProvider;
use silkbridge_server::prelude::*;
use silkbridge_server::protocol::{InitResponse, TransitionAck, TransitionPayload};
use silkbridge_test_utils::{RecordingProvider, TestClient, deterministic_vec};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Sessions = Vec<Result<SessionSummary, ProtocolError>>;

/// Serve `sessions` connections in the background, then hand back the
/// dispatcher and each session's outcome.
fn spawn_server(
    provider: Box<dyn EngineProvider>,
    model_dir: &Path,
    sessions: usize,
) -> (SocketAddr, JoinHandle<(Dispatcher, Sessions)>) {
    let server = BridgeServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();
    let mut dispatcher = Dispatcher::with_provider(provider, CheckpointStore::new(model_dir));
    let handle = std::thread::spawn(move || {
        let outcomes = (0..sessions)
            .map(|_| server.serve_one(&mut dispatcher))
            .collect();
        (dispatcher, outcomes)
    });
    (addr, handle)
}

fn hornet() -> Request {
    Request::Initialize(TaskSpec::flat("Hornet", 10, vec![3, 2]))
}

fn moss_knight() -> Request {
    Request::Initialize(TaskSpec::split("Moss Knight", 21, vec![4], 5, 4, 4))
}

fn get_action(state: Vec<f32>) -> Request {
    Request::GetAction {
        state,
        deterministic: false,
    }
}

fn expect_error(response: Response) -> String {
    match response {
        Response::Error(e) => e.error,
        other => panic!("expected ERROR, got {other:?}"),
    }
}

fn expect_action(response: Response) -> Vec<u32> {
    match response {
        Response::Action(a) => a.action,
        other => panic!("expected ACTION_RESPONSE, got {other:?}"),
    }
}

fn expect_init(response: Response) -> InitResponse {
    match response {
        Response::Init(init) => init,
        other => panic!("expected INIT_RESPONSE, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn fresh_flat_task_then_actions_and_transition() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider::new(1);
    let (addr, handle) = spawn_server(Box::new(provider.clone()), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    // A
    let init = expect_init(client.request(&hornet()).unwrap());
    assert_eq!(
        init,
        InitResponse {
            initialized: true,
            task_id: "Hornet".into(),
            total_obs_dim: 10,
            checkpoint_loaded: false,
        }
    );
    assert!(dir.path().join("hornet").join("checkpoint").is_file());

    // B
    for _ in 0..20 {
        let action = expect_action(client.request(&get_action(vec![0.0; 10])).unwrap());
        assert_eq!(action.len(), 2);
        assert!(action[0] < 3);
        assert!(action[1] < 2);
    }

    // D
    let resp = client
        .request(&Request::StoreTransition(TransitionPayload {
            state: deterministic_vec(10, 1),
            action: vec![1, 1],
            reward: 1.0,
            next_state: deterministic_vec(10, 2),
            done: true,
        }))
        .unwrap();
    assert_eq!(resp, Response::TransitionAck(TransitionAck { success: true }));

    client.close();
    let (_, sessions) = handle.join().unwrap();
    let summary = sessions.into_iter().next().unwrap().unwrap();
    assert_eq!(summary.messages, 22);
    assert_eq!(summary.errors, 0);

    let log = provider.snapshot();
    assert_eq!(log.created, vec!["hornet".to_string()]);
    assert_eq!(log.transitions.len(), 1);
    assert!(log.transitions[0].done);
}

#[test]
fn split_task_rejects_short_state() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(2)), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    // C
    let init = expect_init(client.request(&moss_knight()).unwrap());
    assert_eq!(init.total_obs_dim, 21);

    let error = expect_error(client.request(&get_action(vec![0.0; 20])).unwrap());
    assert!(error.contains("21"), "{error}");
    assert!(error.contains("20"), "{error}");

    // The session survives and the correct length works.
    let action = expect_action(client.request(&get_action(vec![0.5; 21])).unwrap());
    assert!(action[0] < 4);

    client.close();
    handle.join().unwrap();
}

#[test]
fn reinitialize_loads_checkpoint_without_shape_residue() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider::new(3);
    let (addr, handle) = spawn_server(Box::new(provider.clone()), dir.path(), 2);

    let mut first = TestClient::connect(addr).unwrap();
    expect_init(first.request(&hornet()).unwrap());
    expect_init(
        first
            .request(&Request::Initialize(TaskSpec::flat("Other", 4, vec![5])))
            .unwrap(),
    );
    first.close();

    // E
    let mut second = TestClient::connect(addr).unwrap();
    let init = expect_init(second.request(&hornet()).unwrap());
    assert!(init.checkpoint_loaded);
    assert_eq!(init.total_obs_dim, 10);

    let action = expect_action(second.request(&get_action(vec![0.0; 10])).unwrap());
    assert_eq!(action.len(), 2);
    let error = expect_error(second.request(&get_action(vec![0.0; 4])).unwrap());
    assert!(error.contains("expected 10, got 4"), "{error}");

    second.close();
    let (dispatcher, sessions) = handle.join().unwrap();
    assert!(sessions.iter().all(Result::is_ok));
    assert_eq!(dispatcher.tasks().context().unwrap().task_id(), "Hornet");

    let log = provider.snapshot();
    assert_eq!(log.loaded, vec!["hornet".to_string()]);
}

#[test]
fn task_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(4)), dir.path(), 2);

    let mut first = TestClient::connect(addr).unwrap();
    expect_init(first.request(&hornet()).unwrap());
    first.close();

    let mut second = TestClient::connect(addr).unwrap();
    let action = expect_action(second.request(&get_action(vec![1.0; 10])).unwrap());
    assert_eq!(action.len(), 2);
    second.close();

    handle.join().unwrap();
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

#[test]
fn requests_before_initialize_are_rejected_then_recover() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(5)), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    let error = expect_error(client.request(&get_action(vec![0.0; 10])).unwrap());
    assert!(error.contains("No task initialized"), "{error}");

    let error = expect_error(
        client
            .request(&Request::StoreTransition(TransitionPayload {
                state: vec![0.0; 10],
                action: vec![0, 0],
                reward: 0.0,
                next_state: vec![0.0; 10],
                done: false,
            }))
            .unwrap(),
    );
    assert!(error.contains("No task initialized"), "{error}");

    expect_init(client.request(&hornet()).unwrap());
    expect_action(client.request(&get_action(vec![0.0; 10])).unwrap());

    client.close();
    let (_, sessions) = handle.join().unwrap();
    let summary = sessions.into_iter().next().unwrap().unwrap();
    assert_eq!(summary.errors, 2);
}

#[test]
fn missing_field_keeps_connection_open() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(6)), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    client
        .send_json(MessageType::Initialize, r#"{"total_obs_dim":10,"action_shape":[3]}"#)
        .unwrap();
    let error = expect_error(client.read_response().unwrap().unwrap());
    assert_eq!(error, "missing required field 'task_id' in INITIALIZE");

    client.send_json(MessageType::GetAction, "{oops").unwrap();
    let error = expect_error(client.read_response().unwrap().unwrap());
    assert!(error.starts_with("malformed JSON payload in GET_ACTION"), "{error}");

    client.send_json(MessageType::ActionResponse, r#"{"action":[1]}"#).unwrap();
    let error = expect_error(client.read_response().unwrap().unwrap());
    assert_eq!(error, "ACTION_RESPONSE is not a client request");

    expect_init(client.request(&hornet()).unwrap());

    client.close();
    handle.join().unwrap();
}

#[test]
fn original_client_field_names_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(7)), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    client
        .send_json(
            MessageType::Initialize,
            r#"{"boss_name":"Savage Beastfly","observation_size":6,"action_space_shape":[3,3],
                "observation_type":"hybrid","vector_obs_size":2,"visual_width":2,"visual_height":2}"#,
        )
        .unwrap();
    let init = expect_init(client.read_response().unwrap().unwrap());
    assert_eq!(init.task_id, "Savage Beastfly");
    assert_eq!(init.total_obs_dim, 6);
    assert!(dir.path().join("savage_beastfly").join("checkpoint").is_file());

    client.close();
    handle.join().unwrap();
}

#[test]
fn camel_case_field_names_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(12)), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    client
        .send_json(
            MessageType::Initialize,
            r#"{"taskId":"Hornet","totalObsDim":10,"actionShape":[3,2],"layout":"flat"}"#,
        )
        .unwrap();
    let init = expect_init(client.read_response().unwrap().unwrap());
    assert_eq!(
        init,
        InitResponse {
            initialized: true,
            task_id: "Hornet".into(),
            total_obs_dim: 10,
            checkpoint_loaded: false,
        }
    );

    client
        .send_json(
            MessageType::StoreTransition,
            r#"{"state":[0,0,0,0,0,0,0,0,0,0],"action":[1,1],"reward":1.0,
                "nextState":[1,1,1,1,1,1,1,1,1,1],"done":true}"#,
        )
        .unwrap();
    assert_eq!(
        client.read_response().unwrap().unwrap(),
        Response::TransitionAck(TransitionAck { success: true })
    );

    client.close();
    handle.join().unwrap();
}

#[test]
fn invalid_split_spec_keeps_previous_task() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(8)), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    expect_init(client.request(&hornet()).unwrap());
    let error = expect_error(
        client
            .request(&Request::Initialize(TaskSpec::split(
                "Moss Knight",
                21,
                vec![4],
                4,
                4,
                4,
            )))
            .unwrap(),
    );
    assert!(error.contains("21"), "{error}");

    let action = expect_action(client.request(&get_action(vec![0.0; 10])).unwrap());
    assert_eq!(action.len(), 2);

    client.close();
    handle.join().unwrap();
}

#[test]
fn unknown_type_closes_session_and_next_client_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(9)), dir.path(), 2);

    let mut bad = TestClient::connect(addr).unwrap();
    // length 1, type 42, empty payload
    bad.send_raw(&[0, 0, 0, 1, 42]).unwrap();
    // Closed without an ERROR frame (a reset is also acceptable).
    assert!(!matches!(bad.read_response(), Ok(Some(_))));

    let mut good = TestClient::connect(addr).unwrap();
    expect_init(good.request(&hornet()).unwrap());
    good.close();

    let (_, sessions) = handle.join().unwrap();
    assert!(matches!(
        sessions[0],
        Err(ProtocolError::UnknownMessageType(42))
    ));
    assert!(sessions[1].is_ok());
}

#[test]
fn zero_length_frame_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(RecordingProvider::new(10)), dir.path(), 1);

    let mut client = TestClient::connect(addr).unwrap();
    client.send_raw(&[0, 0, 0, 0]).unwrap();
    assert!(!matches!(client.read_response(), Ok(Some(_))));

    let (_, sessions) = handle.join().unwrap();
    assert!(matches!(
        sessions[0],
        Err(ProtocolError::InvalidLength { length: 0, .. })
    ));
}

// ---------------------------------------------------------------------------
// Bundled engine
// ---------------------------------------------------------------------------

#[test]
fn oversized_model_is_rejected_and_previous_task_stays() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_server(Box::new(LinearPpoProvider::new(Some(13))), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();

    expect_init(client.request(&hornet()).unwrap());
    let error = expect_error(
        client
            .request(&Request::Initialize(TaskSpec::flat(
                "big",
                100_000,
                vec![u32::MAX, u32::MAX],
            )))
            .unwrap(),
    );
    assert!(error.contains("parameters"), "{error}");
    assert!(!dir.path().join("big").exists());

    let action = expect_action(client.request(&get_action(vec![0.0; 10])).unwrap());
    assert_eq!(action.len(), 2);

    client.close();
    let (dispatcher, sessions) = handle.join().unwrap();
    assert_eq!(dispatcher.tasks().context().unwrap().task_id(), "Hornet");
    assert_eq!(sessions[0].as_ref().unwrap().errors, 1);
}

#[test]
fn linear_engine_round_trip_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (addr, handle) = spawn_server(Box::new(LinearPpoProvider::new(Some(11))), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();
    let init = expect_init(client.request(&hornet()).unwrap());
    assert!(!init.checkpoint_loaded);
    for i in 0..8 {
        let state = deterministic_vec(10, i);
        let action = expect_action(client.request(&get_action(state.clone())).unwrap());
        let resp = client
            .request(&Request::StoreTransition(TransitionPayload {
                state,
                action,
                reward: 0.5,
                next_state: deterministic_vec(10, i + 100),
                done: i == 7,
            }))
            .unwrap();
        assert_eq!(resp, Response::TransitionAck(TransitionAck { success: true }));
    }
    client.close();
    drop(handle.join().unwrap());

    // A new server process over the same model directory.
    let (addr, handle) = spawn_server(Box::new(LinearPpoProvider::new(Some(11))), dir.path(), 1);
    let mut client = TestClient::connect(addr).unwrap();
    let init = expect_init(client.request(&hornet()).unwrap());
    assert!(init.checkpoint_loaded);
    let action = expect_action(
        client
            .request(&Request::GetAction {
                state: vec![0.0; 10],
                deterministic: true,
            })
            .unwrap(),
    );
    assert!(action[0] < 3 && action[1] < 2);

    // Same id, different action shape: the stored checkpoint does not fit.
    let error = expect_error(
        client
            .request(&Request::Initialize(TaskSpec::flat("Hornet", 10, vec![4, 2])))
            .unwrap(),
    );
    assert!(error.contains("incompatible"), "{error}");

    client.close();
    handle.join().unwrap();
}
