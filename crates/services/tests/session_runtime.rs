use std::sync::Arc;
use std::time::Duration;

use authority::{AuthorityError, InMemoryAuthority, RpcMethod};
use services::sessions::spawn;
use services::{
    ControllerConfig, ControllerError, ExamCatalogService, Operation, RecordingObserver,
    SessionCommand, SessionController, SessionEvent,
};
use simulado_core::fixtures::sample_exam;
use simulado_core::model::{ChoiceId, ExamId, ItemId, SessionStatus};
use simulado_core::time::fixed_clock;
use tokio::time::sleep;

async fn start(memory: &InMemoryAuthority) -> (RecordingObserver, SessionController) {
    let observer = RecordingObserver::new();
    let catalog = ExamCatalogService::new(Arc::new(memory.clone())).with_config(
        ControllerConfig::default().with_tick_interval(Duration::from_secs(1)),
    );
    let controller = catalog
        .start_session(&ExamId::new("enem_2023_dia1"), Arc::new(observer.clone()))
        .await
        .unwrap();
    (observer, controller)
}

fn answer_q01() -> SessionCommand {
    SessionCommand::RecordAnswer {
        item: ItemId::new("Q01"),
        choice: Some(ChoiceId::new("B")),
    }
}

#[tokio::test(start_paused = true)]
async fn cadence_ticks_once_per_interval_until_disposed() {
    let memory = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
    let (_observer, controller) = start(&memory).await;
    let liveness = controller.liveness();
    let handle = spawn(controller);

    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(memory.call_count(RpcMethod::TickSession), 3);

    handle.dispose();
    assert!(!liveness.is_alive());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(memory.call_count(RpcMethod::TickSession), 3);
}

#[tokio::test(start_paused = true)]
async fn paused_session_stops_pushing_time() {
    let memory = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
    let (_observer, controller) = start(&memory).await;
    let handle = spawn(controller);

    handle.submit(SessionCommand::TogglePause).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_pending());

    memory.clear_calls();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(memory.call_count(RpcMethod::TickSession), 0);

    handle.submit(SessionCommand::TogglePause).unwrap();
    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(memory.call_count(RpcMethod::ResumeSession), 1);
    assert_eq!(memory.call_count(RpcMethod::TickSession), 2);

    handle.dispose();
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_while_paused_is_retried_after_one_period() {
    let memory = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
    let (observer, controller) = start(&memory).await;
    let handle = spawn(controller);

    memory.clear_calls();
    memory.fail_next(
        RpcMethod::GetSessionState,
        AuthorityError::Transient("timeout".into()),
    );
    handle.submit(SessionCommand::Pause).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(memory.call_count(RpcMethod::PauseSession), 1);
    assert_eq!(memory.call_count(RpcMethod::GetSessionState), 1);
    assert_eq!(observer.last_view().unwrap().status, SessionStatus::Running);

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(memory.call_count(RpcMethod::GetSessionState), 2);
    assert_eq!(memory.call_count(RpcMethod::TickSession), 0);
    assert_eq!(observer.last_view().unwrap().status, SessionStatus::Paused);

    handle.dispose();
}

#[tokio::test(start_paused = true)]
async fn second_mutation_is_refused_while_the_first_is_in_flight() {
    let memory = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(3));
    let (observer, controller) = start(&memory).await;
    let handle = spawn(controller);

    handle.submit(answer_q01()).unwrap();
    assert!(handle.is_pending());
    assert_eq!(
        handle.submit(SessionCommand::Advance),
        Err(ControllerError::Busy)
    );
    handle.submit(SessionCommand::Refresh).unwrap();

    sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_pending());
    handle.submit(SessionCommand::Advance).unwrap();
    sleep(Duration::from_millis(10)).await;

    let view = observer.last_view().unwrap();
    assert_eq!(view.current_item, ItemId::new("Q02"));
    assert_eq!(memory.call_count(RpcMethod::AdvanceItem), 1);

    let pending: Vec<Option<Operation>> = observer
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Pending(operation) => Some(operation),
            _ => None,
        })
        .collect();
    assert_eq!(
        pending,
        vec![
            Some(Operation::RecordAnswer),
            None,
            Some(Operation::Advance),
            None
        ]
    );

    handle.dispose();
}

#[tokio::test(start_paused = true)]
async fn finishing_through_the_handle_stops_the_cadence() {
    let memory = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
    let (observer, controller) = start(&memory).await;
    let handle = spawn(controller);

    handle.submit(SessionCommand::Finish).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(observer.finished_count(), 1);

    memory.clear_calls();
    sleep(Duration::from_secs(5)).await;
    assert!(memory.calls().is_empty());

    handle.submit(SessionCommand::Finish).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(observer.finished_count(), 1);
    assert_eq!(memory.call_count(RpcMethod::FinishSession), 0);

    handle.dispose();
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_tears_the_session_down() {
    let memory = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
    let (_observer, controller) = start(&memory).await;
    let liveness = controller.liveness();

    let handle = spawn(controller);
    sleep(Duration::from_millis(1_500)).await;
    drop(handle);
    assert!(!liveness.is_alive());

    memory.clear_calls();
    sleep(Duration::from_secs(5)).await;
    assert!(memory.calls().is_empty());
}
