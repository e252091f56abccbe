// TCP reachability prober tests against a loopback listener

use std::time::Duration;
use stockpiler::probe::{PortProbe, TcpProbe, check_ports};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_open_port_reports_true() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    assert!(TcpProbe.is_open("127.0.0.1", port, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_closed_port_reports_false() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    assert!(!TcpProbe.is_open("127.0.0.1", port, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_unresolvable_host_reports_false() {
    assert!(
        !TcpProbe
            .is_open("host.invalid", 22, Duration::from_millis(500))
            .await
    );
}

#[tokio::test]
async fn test_check_ports_one_entry_per_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let closed_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = closed_listener.local_addr().unwrap().port();
    drop(closed_listener);

    let results = check_ports(
        &TcpProbe,
        "127.0.0.1",
        &[open, closed, open],
        Duration::from_secs(1),
    )
    .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[&open], true);
    assert_eq!(results[&closed], false);
}
