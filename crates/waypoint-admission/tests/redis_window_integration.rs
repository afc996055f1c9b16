use std::time::Duration;

use waypoint_admission::{
    AdmissionController, AdmissionError, FixedWindowAdmission, FixedWindowSettings,
    RedisWindowCounter, WindowCounter,
};
use waypoint_test_infra::redis::RedisServer;

#[tokio::test]
#[ignore = "requires docker"]
async fn fresh_keys_get_an_expiry() {
    let redis = RedisServer::new().await.unwrap();
    let mut conn = redis.connection().await.unwrap();
    let counter = RedisWindowCounter::new(conn.clone());
    let keys = vec!["rl:g:1".to_string(), "rl:i:10.0.0.1:1".to_string()];

    let counts = counter
        .increment(&keys, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(counts, vec![1, 1]);

    let ttl: i64 = redis::cmd("PTTL")
        .arg("rl:g:1")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(ttl > 0 && ttl <= 2_000, "ttl was {ttl}");

    let counts = counter
        .increment(&keys, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(counts, vec![2, 2]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn limits_are_shared_between_instances() {
    let redis = RedisServer::new().await.unwrap();
    let settings = FixedWindowSettings::builder()
        .global_limit(100)
        .origin_limit(2)
        .window_secs(3600)
        .build();
    let first = FixedWindowAdmission::new(
        RedisWindowCounter::new(redis.connection().await.unwrap()),
        settings.clone(),
    );
    let second = FixedWindowAdmission::new(
        RedisWindowCounter::new(redis.connection().await.unwrap()),
        settings,
    );

    assert!(first.admit("10.0.0.1").await.is_ok());
    assert!(second.admit("10.0.0.1").await.is_ok());
    assert_eq!(
        first.admit("10.0.0.1").await,
        Err(AdmissionError::RateLimited {
            origin: "10.0.0.1".into()
        })
    );
}
