mod support;

use std::time::{Duration, Instant};

use efflux::HttpClient;
use futures_util::future::join;
use support::{with_local, Behavior, StubServer};

#[tokio::test]
async fn stop_drains_idle_now_and_waits_for_in_flight() {
    with_local(async {
        let parked = StubServer::spawn(Behavior::KeepAlive {
            body: "idle".into(),
        })
        .await;
        let slow = StubServer::spawn(Behavior::SlowBody {
            body: "almost there".into(),
            delay: Duration::from_millis(500),
        })
        .await;

        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .build();

        // Park one idle socket, then put one request in flight.
        client.get(parked.url("/")).send().await.unwrap();
        assert_eq!(client.pool_stats().idle, 1);

        let in_flight = client.get(slow.url("/")).send();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.pool_stats().busy, 1);

        let started = Instant::now();
        let shutdown = client.stop();

        // The idle socket is gone before the shutdown future is even polled.
        let stats = client.pool_stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.busy, 1);

        let (response, ()) = join(in_flight, shutdown).await;
        assert_eq!(response.unwrap().text(), "almost there");
        assert!(
            started.elapsed() >= Duration::from_millis(300),
            "shutdown waited for the in-flight exchange",
        );

        // Shutting down forces close instead of re-parking the survivor.
        let stats = client.pool_stats();
        assert_eq!(stats.idle + stats.busy, 0);
    })
    .await;
}

#[tokio::test]
async fn shutdown_deadline_bounds_a_stalled_drain() {
    with_local(async {
        let server = StubServer::spawn(Behavior::Stall).await;

        // No active deadline configured: only the shutdown drain deadline
        // bounds the stalled exchange.
        let client = HttpClient::builder()
            .shutdown_rw_timeout(Duration::from_millis(200))
            .build();

        let in_flight = client.get(server.url("/")).send();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let (response, ()) = join(in_flight, client.stop()).await;

        assert!(response.unwrap_err().is_timeout());
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "drain terminated by the shutdown deadline, not the peer",
        );
        assert_eq!(client.pool_stats().busy_expired_total, 1);
    })
    .await;
}

#[tokio::test]
async fn completions_racing_stop_do_not_reenter_the_pool() {
    with_local(async {
        let server = StubServer::spawn(Behavior::SlowBody {
            body: "late".into(),
            delay: Duration::from_millis(200),
        })
        .await;

        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .build();

        let in_flight = client.get(server.url("/")).send();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let shutdown = client.stop();

        let (response, ()) = join(in_flight, shutdown).await;
        assert!(response.is_ok());

        // The keep-alive timeout is still nonzero, but the shutting-down
        // check wins: nothing may be parked after stop().
        assert_eq!(client.pool_stats().idle, 0);
    })
    .await;
}
