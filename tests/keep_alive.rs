mod support;

use std::{rc::Rc, time::Duration};

use efflux::{find_inspector, ForwardingInspector, HttpClient};
use support::{with_local, Behavior, CountingInspector, StubServer};

#[tokio::test]
async fn sequential_requests_reuse_one_connection() {
    with_local(async {
        let server = StubServer::spawn(Behavior::KeepAlive {
            body: "pong".into(),
        })
        .await;

        let leaf = Rc::new(CountingInspector::default());
        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .inspector(ForwardingInspector::new(leaf))
            .build();

        let first = client.get(server.url("/a")).send().await.unwrap();
        assert_eq!(first.status(), 200);
        assert_eq!(first.text(), "pong");

        let stats = client.pool_stats();
        assert_eq!(stats.idle, 1, "socket parked between requests");
        assert_eq!(stats.busy, 0);

        let second = client.get(server.url("/b")).send().await.unwrap();
        assert_eq!(second.status(), 200);

        assert_eq!(server.accepted(), 1, "second request reused the socket");
        assert_eq!(server.served(), 2);

        let counters = find_inspector::<CountingInspector>(client.inspector()).unwrap();
        assert_eq!(counters.connects.get(), 1);
        assert_eq!(counters.responses.get(), 2);
        assert_eq!(counters.requests.get(), 2);
        assert_eq!(counters.errors.get(), 0);
    })
    .await;
}

#[tokio::test]
async fn disabled_keep_alive_closes_after_each_response() {
    with_local(async {
        let server = StubServer::spawn(Behavior::KeepAlive {
            body: "pong".into(),
        })
        .await;

        // Default configuration: keep-alive disabled.
        let client = HttpClient::builder().build();

        for _ in 0..3 {
            client.get(server.url("/")).send().await.unwrap();
            assert_eq!(client.pool_stats().idle, 0);
        }
        assert_eq!(server.accepted(), 3);
    })
    .await;
}

#[tokio::test]
async fn server_connection_close_prevents_reuse() {
    with_local(async {
        let server = StubServer::spawn(Behavior::Close {
            body: "bye".into(),
        })
        .await;

        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .build();

        for _ in 0..2 {
            let resp = client.get(server.url("/")).send().await.unwrap();
            assert_eq!(resp.text(), "bye");
            assert_eq!(client.pool_stats().idle, 0);
        }
        assert_eq!(server.accepted(), 2);
    })
    .await;
}

#[tokio::test]
async fn request_connection_close_header_prevents_reuse() {
    with_local(async {
        let server = StubServer::spawn(Behavior::KeepAlive {
            body: "pong".into(),
        })
        .await;

        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .build();

        for _ in 0..2 {
            client
                .get(server.url("/"))
                .header("connection", "close")
                .send()
                .await
                .unwrap();
        }
        assert_eq!(client.pool_stats().idle, 0);
        assert_eq!(server.accepted(), 2);
    })
    .await;
}

#[tokio::test]
async fn keep_alive_cap_limits_recycling() {
    with_local(async {
        let server = StubServer::spawn(Behavior::KeepAlive {
            body: "pong".into(),
        })
        .await;

        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .max_keep_alive_requests(1)
            .build();

        // One recycle is allowed per connection, then it must close.
        for _ in 0..4 {
            client.get(server.url("/")).send().await.unwrap();
        }
        assert_eq!(server.accepted(), 2);
    })
    .await;
}

#[tokio::test]
async fn chunked_responses_flow_and_recycle() {
    with_local(async {
        let server = StubServer::spawn(Behavior::Chunked {
            chunks: vec!["hello ".into(), "chunked ".into(), "world".into()],
        })
        .await;

        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .build();

        let resp = client.get(server.url("/")).send().await.unwrap();
        assert_eq!(resp.text(), "hello chunked world");
        assert_eq!(client.pool_stats().idle, 1);

        client.get(server.url("/")).send().await.unwrap();
        assert_eq!(server.accepted(), 1);
    })
    .await;
}

#[tokio::test]
async fn post_bodies_round_trip() {
    with_local(async {
        let server = StubServer::spawn(Behavior::Echo).await;

        let client = HttpClient::builder()
            .keep_alive_timeout(Duration::from_secs(30))
            .build();

        let resp = client
            .post(server.url("/echo"))
            .body("payload bytes")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text(), "payload bytes");

        // HEAD responses carry no body even if a length were announced.
        let head = client.head(server.url("/echo")).send().await.unwrap();
        assert!(head.body().is_empty());
    })
    .await;
}
