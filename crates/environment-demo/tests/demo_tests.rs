//! End-to-end tests with the demo services

use async_net::TcpStream;
use environment_config::parser;
use environment_demo::{EchoService, EchoSettings, demo_config, demo_registry};
use futures::io::{AsyncReadExt, AsyncWriteExt};
use service_environment::{RuntimeContext, Service};
use std::io::Write;

#[smol_potat::test]
async fn test_echo_service_serves_until_stopped() {
    let service = EchoService::new("echo", EchoSettings::default());
    let ctx = RuntimeContext::new("test");

    let meta = service.start(&ctx).await.unwrap();
    assert_eq!(meta["scheme"], "tcp");
    assert_eq!(meta["host"], "127.0.0.1");
    let port = meta["port"].as_u64().unwrap() as u16;
    assert_eq!(meta["url"], format!("tcp://127.0.0.1:{}", port));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(b"hello").await.unwrap();
    let mut reply = [0u8; 5];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"hello");

    service.stop(&ctx).await.unwrap();
    smol::Timer::after(std::time::Duration::from_millis(20)).await;
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[smol_potat::test]
async fn test_echo_bind_failure_is_reported() {
    let first = EchoService::new("first", EchoSettings::default());
    let ctx = RuntimeContext::new("test");
    let meta = first.start(&ctx).await.unwrap();

    let taken = EchoSettings {
        port: meta["port"].as_u64().unwrap() as u16,
        ..Default::default()
    };
    let second = EchoService::new("second", taken);
    let err = second.start(&ctx).await.unwrap_err();
    assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:"));

    first.stop(&ctx).await.unwrap();
}

#[smol_potat::test]
async fn test_demo_environment_round_trip() {
    let config = demo_config();
    let mut env = demo_registry().build_environment(&config).unwrap();
    assert_eq!(env.name(), "demo-env");

    let ctx = env.start().await.unwrap();
    assert_eq!(ctx.len(), 5);
    for id in ["storage-srv", "mq-srv", "config-srv", "auth-srv", "app-srv"] {
        let meta = ctx.get(id).unwrap();
        assert!(meta.get("url").unwrap().as_str().unwrap().starts_with("tcp://"));
    }

    env.stop().await.unwrap();
    assert!(ctx.is_empty());
}

#[smol_potat::test]
async fn test_failing_noop_rolls_back_echo_services() {
    let yaml = r#"
name: failing
services:
  storage:
    kind: echo
  broken:
    kind: noop
    depends_on: [storage]
    settings:
      start_delay_ms: 10
      fail_on_start: true
  app:
    kind: echo
    depends_on: [broken]
"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = parser::parse_file(file.path()).unwrap();
    let mut env = demo_registry().build_environment(&config).unwrap();

    let err = env.start().await.unwrap_err();
    assert_eq!(err.service_id(), Some("broken"));
    assert!(!env.is_started());
    assert_eq!(
        env.service_state("storage"),
        Some(service_environment::ServiceState::Stopped)
    );
    assert_eq!(
        env.service_state("app"),
        Some(service_environment::ServiceState::Stopped)
    );
}
