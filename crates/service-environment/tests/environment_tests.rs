//! Integration tests for environment startup and teardown

#![cfg(feature = "smol")]

mod common;

use common::{MockService, Recorder, start_begin, start_end, start_failed, svc};
use service_environment::{Environment, Error, Service, ServiceSpec, ServiceState};
use std::time::Duration;

/// S2 depends on S1, S3 and S4; S4 depends on S3; S5 is independent
fn layered(recorder: &Recorder) -> [std::sync::Arc<MockService>; 5] {
    [
        MockService::new("s1", recorder).build(),
        MockService::new("s2", recorder)
            .expecting(&["s1", "s3", "s4"])
            .build(),
        MockService::new("s3", recorder).build(),
        MockService::new("s4", recorder).expecting(&["s3"]).build(),
        MockService::new("s5", recorder).build(),
    ]
}

fn layered_specs(services: &[std::sync::Arc<MockService>; 5]) -> Vec<ServiceSpec> {
    let [s1, s2, s3, s4, s5] = services;
    vec![
        ServiceSpec::new(svc(s2)).with_dependencies([svc(s1), svc(s3), svc(s4)]),
        ServiceSpec::new(svc(s4)).depends_on(svc(s3)),
        ServiceSpec::new(svc(s5)),
    ]
}

#[smol_potat::test]
async fn test_start_respects_dependencies() {
    let recorder = Recorder::default();
    let services = layered(&recorder);
    let mut env = Environment::named("layered", layered_specs(&services)).unwrap();

    let ctx = env.start().await.unwrap();

    let s2_begins = recorder.position(&start_begin("s2")).unwrap();
    for dependency in ["s1", "s3", "s4"] {
        assert!(recorder.position(&start_end(dependency)).unwrap() < s2_begins);
    }
    assert!(
        recorder.position(&start_end("s3")).unwrap()
            < recorder.position(&start_begin("s4")).unwrap()
    );

    for service in &services {
        assert_eq!(service.starts(), 1, "{} started more than once", service.id());
    }
    assert_eq!(ctx.len(), 5);
    assert_eq!(ctx.name(), "layered");
    let s2 = ctx.get("s2").unwrap();
    assert_eq!(s2.get("name").unwrap(), "s2");
    assert_eq!(s2.get("env").unwrap(), "layered");

    env.stop().await.unwrap();
}

#[smol_potat::test]
async fn test_start_failure_rolls_back_started_services() {
    let recorder = Recorder::default();
    let s1 = MockService::new("s1", &recorder).build();
    let s2 = MockService::new("s2", &recorder).build();
    let s3 = MockService::new("s3", &recorder).failing_start().build();
    let s4 = MockService::new("s4", &recorder).build();
    let s5 = MockService::new("s5", &recorder).build();

    let mut env = Environment::new(vec![
        ServiceSpec::new(svc(&s1)).depends_on(svc(&s2)),
        ServiceSpec::new(svc(&s2)).depends_on(svc(&s3)),
        ServiceSpec::new(svc(&s3)).depends_on(svc(&s4)),
        ServiceSpec::new(svc(&s4)).depends_on(svc(&s5)),
    ])
    .unwrap();

    let err = env.start().await.unwrap_err();
    assert_eq!(err.service_id(), Some("s3"));
    assert!(err.to_string().contains("synthetic-start-error"));
    assert!(!env.is_started());

    assert_eq!(
        [s1.starts(), s2.starts(), s3.starts(), s4.starts(), s5.starts()],
        [0, 0, 1, 1, 1]
    );
    assert_eq!(
        [s1.stops(), s2.stops(), s3.stops(), s4.stops(), s5.stops()],
        [0, 0, 0, 1, 1]
    );
    assert_eq!(recorder.stops(), vec!["s4".to_string(), "s5".to_string()]);
    assert!(matches!(env.service_state("s3"), Some(ServiceState::Failed(_))));
    assert_eq!(env.service_state("s1"), Some(ServiceState::Stopped));
}

#[smol_potat::test]
async fn test_failed_dependency_blocks_every_dependent() {
    let recorder = Recorder::default();
    let s1 = MockService::new("s1", &recorder).build();
    let s2 = MockService::new("s2", &recorder).build();
    let s3 = MockService::new("s3", &recorder).failing_start().build();
    let s4 = MockService::new("s4", &recorder).build();
    let s5 = MockService::new("s5", &recorder)
        .with_delay(Duration::from_millis(50))
        .build();

    let mut env = Environment::new(vec![
        ServiceSpec::new(svc(&s2)).with_dependencies([svc(&s1), svc(&s3), svc(&s4)]),
        ServiceSpec::new(svc(&s4)).depends_on(svc(&s3)),
        ServiceSpec::new(svc(&s5)),
    ])
    .unwrap();

    let err = env.start().await.unwrap_err();
    assert_eq!(err.service_id(), Some("s3"));

    assert_eq!(s2.starts(), 0);
    assert_eq!(s4.starts(), 0);
    assert_eq!(s3.stops(), 0);
    // Roots already in flight settle and are rolled back
    assert_eq!(s5.starts(), 1);
    assert_eq!(s5.stops(), 1);
    assert_eq!(s1.starts(), 1);
    assert_eq!(s1.stops(), 1);
}

/// `broken` and `sibling` are roots; `dependent` only waits on `sibling`
async fn start_beside_failure(broken_delay: u64, sibling_delay: u64) -> (Recorder, usize) {
    let recorder = Recorder::default();
    let broken = MockService::new("broken", &recorder)
        .failing_start()
        .with_delay(Duration::from_millis(broken_delay))
        .build();
    let sibling = MockService::new("sibling", &recorder)
        .with_delay(Duration::from_millis(sibling_delay))
        .build();
    let dependent = MockService::new("dependent", &recorder).build();

    let mut env = Environment::new(vec![
        ServiceSpec::new(svc(&broken)),
        ServiceSpec::new(svc(&dependent)).depends_on(svc(&sibling)),
    ])
    .unwrap();

    let err = env.start().await.unwrap_err();
    assert_eq!(err.service_id(), Some("broken"));
    assert_eq!(sibling.stops(), sibling.starts());
    (recorder, dependent.starts())
}

#[smol_potat::test]
async fn test_failure_stops_unrelated_cascades() {
    for _ in 0..20 {
        let (recorder, dependent_starts) = start_beside_failure(2, 2).await;
        if dependent_starts > 0 {
            // Only a sibling that finished before the failure may cascade
            let failed = recorder.position(&start_failed("broken")).unwrap();
            let sibling_done = recorder.position(&start_end("sibling")).unwrap();
            assert!(sibling_done < failed, "{:?}", recorder.calls());
        }
    }

    for _ in 0..20 {
        let (recorder, dependent_starts) = start_beside_failure(2, 10).await;
        assert_eq!(dependent_starts, 0, "{:?}", recorder.calls());
    }
}

#[smol_potat::test]
async fn test_stop_in_reverse_dependency_order() {
    let recorder = Recorder::default();
    let services = layered(&recorder);
    let mut env = Environment::new(layered_specs(&services)).unwrap();

    let ctx = env.start().await.unwrap();
    env.stop().await.unwrap();

    let stops = recorder.stops();
    let position = |id: &str| stops.iter().position(|s| s == id).unwrap();
    assert!(position("s2") < position("s1"));
    assert!(position("s2") < position("s3"));
    assert!(position("s2") < position("s4"));
    assert!(position("s4") < position("s3"));

    for service in &services {
        assert_eq!(service.stops(), 1);
    }
    assert!(ctx.is_empty());
    assert!(ctx.is_shutting_down());
    assert!(!env.is_started());
}

#[smol_potat::test]
async fn test_stop_visits_every_service_despite_failures() {
    let recorder = Recorder::default();
    let s1 = MockService::new("s1", &recorder).build();
    let s2 = MockService::new("s2", &recorder).failing_stop().build();
    let s3 = MockService::new("s3", &recorder).build();
    let s4 = MockService::new("s4", &recorder).failing_stop().build();

    let mut env = Environment::new(vec![
        ServiceSpec::new(svc(&s4)).depends_on(svc(&s3)),
        ServiceSpec::new(svc(&s3)).depends_on(svc(&s2)),
        ServiceSpec::new(svc(&s2)).depends_on(svc(&s1)),
    ])
    .unwrap();

    let ctx = env.start().await.unwrap();
    let err = env.stop().await.unwrap_err();

    assert_eq!(recorder.stops(), vec!["s4", "s3", "s2", "s1"]);
    let failed: Vec<_> = err.failures().iter().filter_map(|e| e.service_id()).collect();
    assert_eq!(failed, vec!["s4", "s2"]);
    assert_eq!(
        err.to_string(),
        "Service 's4' failed to stop: synthetic-stop-error\n\
         Service 's2' failed to stop: synthetic-stop-error"
    );
    assert!(ctx.is_empty());

    // Still started; a second pass has nothing left to stop
    assert!(env.is_started());
    env.stop().await.unwrap();
    assert!(!env.is_started());
    assert_eq!(s2.stops(), 1);
}

#[smol_potat::test]
async fn test_protocol_errors() {
    let recorder = Recorder::default();
    let a = MockService::new("a", &recorder).build();
    let mut env = Environment::new(vec![ServiceSpec::new(svc(&a))]).unwrap();

    assert!(matches!(env.stop().await, Err(Error::NotStarted)));

    env.start().await.unwrap();
    assert!(matches!(env.start().await, Err(Error::AlreadyStarted)));
    assert_eq!(a.starts(), 1);

    env.stop().await.unwrap();
    assert!(matches!(env.stop().await, Err(Error::NotStarted)));
}

#[test]
fn test_cycle_is_rejected_at_construction() {
    let recorder = Recorder::default();
    let a = MockService::new("a", &recorder).build();
    let b = MockService::new("b", &recorder).build();

    let result = Environment::new(vec![
        ServiceSpec::new(svc(&a)).depends_on(svc(&b)),
        ServiceSpec::new(svc(&b)).depends_on(svc(&a)),
    ]);

    match result {
        Err(Error::Cycle(cycle)) => {
            assert_eq!(cycle.from, "a");
            assert_eq!(cycle.to, "b");
        }
        other => panic!("expected a cycle error, got {:?}", other),
    }
}

#[test]
fn test_default_name_is_unique() {
    let first = Environment::new(Vec::new()).unwrap();
    let second = Environment::new(Vec::new()).unwrap();

    assert!(first.name().starts_with("env-"));
    assert_ne!(first.name(), second.name());
}

#[smol_potat::test]
async fn test_empty_environment() {
    let mut env = Environment::named("empty", Vec::new()).unwrap();

    let ctx = env.start().await.unwrap();
    assert!(ctx.is_empty());
    assert!(env.is_started());

    env.stop().await.unwrap();
}

#[smol_potat::test]
async fn test_restart_after_stop() {
    let recorder = Recorder::default();
    let services = layered(&recorder);
    let mut env = Environment::new(layered_specs(&services)).unwrap();

    let first = env.start().await.unwrap();
    env.stop().await.unwrap();
    let second = env.start().await.unwrap();

    assert!(!std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(second.len(), 5);
    assert!(!second.is_shutting_down());
    for service in &services {
        assert_eq!(service.starts(), 2);
    }
    assert_eq!(env.context().unwrap().len(), 5);

    env.stop().await.unwrap();
}

#[smol_potat::test]
async fn test_independent_services_start_concurrently() {
    let recorder = Recorder::default();
    let delay = Duration::from_millis(100);
    let services: Vec<_> = (0..5)
        .map(|i| {
            MockService::new(&format!("root-{}", i), &recorder)
                .with_delay(delay)
                .build()
        })
        .collect();
    let mut env = Environment::new(services.iter().map(|s| ServiceSpec::new(svc(s)))).unwrap();

    let started = std::time::Instant::now();
    env.start().await.unwrap();

    assert!(started.elapsed() < delay * 2);
    env.stop().await.unwrap();
}

#[smol_potat::test]
async fn test_service_states_follow_lifecycle() {
    let recorder = Recorder::default();
    let a = MockService::new("a", &recorder).build();
    let b = MockService::new("b", &recorder).build();
    let mut env = Environment::new(vec![ServiceSpec::new(svc(&b)).depends_on(svc(&a))]).unwrap();

    assert_eq!(env.service_ids(), vec!["b", "a"]);
    assert!(env.service_states().iter().all(|(_, s)| *s == ServiceState::Stopped));

    env.start().await.unwrap();
    assert!(env.service_states().iter().all(|(_, s)| *s == ServiceState::Started));

    env.stop().await.unwrap();
    assert_eq!(env.service_state("a"), Some(ServiceState::Stopped));
    assert_eq!(env.service_state("missing"), None);
}
