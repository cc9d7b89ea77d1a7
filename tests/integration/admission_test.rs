// tests/integration/admission_test.rs

//! End-to-end tests of the open-connection cap.

use super::test_helpers::TestServer;
use netshell::config::Config;
use netshell::connection::ListenerKind;
use std::time::Duration;

#[tokio::test]
async fn test_connection_over_cap_waits_for_a_session_to_close() {
    let mut config = Config::default();
    config.max_open_connections = 1;
    let mut server = TestServer::with_config(config);
    let state = server.state.clone();

    let permit = state.limiter.admit(&state.stats).await.unwrap();
    let mut first = server.connect_with_permit(ListenerKind::Console, Some(permit));
    first.read_until("netshell> ").await;
    assert_eq!(state.stats.open_connections(), 1);
    assert_eq!(state.limiter.available(), 0);

    let waiter_state = state.clone();
    let waiting = tokio::spawn(async move {
        let permit = waiter_state.limiter.admit(&waiter_state.stats).await;
        // The slot is only handed over once the closed session is unregistered.
        (permit, waiter_state.stats.open_connections())
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.stats.stalls() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("second connection never stalled");
    tokio::task::yield_now().await;
    assert!(!waiting.is_finished());
    assert_eq!(state.stats.stalls(), 1);
    assert_eq!(state.stats.open_connections(), 1);

    first.send_line("quit").await;
    first.read_to_end().await;
    first.finish().await.unwrap();

    let (permit, open_at_admission) = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .expect("second connection was never admitted")
        .unwrap();
    let permit = permit.unwrap();
    assert_eq!(open_at_admission, 0);

    let mut second = server.connect_with_permit(ListenerKind::Console, Some(permit));
    second.read_until("netshell> ").await;
    assert_eq!(state.stats.open_connections(), 1);
    assert_eq!(state.stats.total_connections(), 2);
    assert_eq!(state.stats.stalls(), 1);

    second.send_line("quit").await;
    second.read_to_end().await;
    second.finish().await.unwrap();
    assert_eq!(state.stats.open_connections(), 0);
    assert_eq!(state.limiter.available(), 1);
}
