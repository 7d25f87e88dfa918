// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Index import against a mocked Strava, over in-memory tiers.

use std::collections::HashSet;
use std::time::Duration;

use mockito::{Matcher, Mock, Server};
use trackcache::cache::{keys, HotCache};
use trackcache::db::WarmStore;
use trackcache::error::AppError;
use trackcache::index::SummaryFilter;
use trackcache::models::ImportProgress;

mod common;
use common::{activity_json, test_context, test_session, ROUTE, TEST_USER};

async fn mock_page(server: &mut Server, page: u32, body: serde_json::Value) -> Mock {
    server
        .mock("GET", "/api/v3/athlete/activities")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), page.to_string()),
            Matcher::UrlEncoded("per_page".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_import_walks_pages_and_skips_routeless() {
    let mut server = Server::new_async().await;
    let p1 = mock_page(
        &mut server,
        1,
        serde_json::json!([
            activity_json(3, TEST_USER, "2026-03-03T08:00:00Z", ROUTE),
            activity_json(2, TEST_USER, "2026-03-02T08:00:00Z", ""),
        ]),
    )
    .await;
    let p2 = mock_page(
        &mut server,
        2,
        serde_json::json!([activity_json(1, TEST_USER, "2026-03-01T08:00:00Z", ROUTE)]),
    )
    .await;

    let tc = test_context(&server.url(), |c| c.page_size = 2).await;
    let index = tc.ctx.index();

    let stored = index.import_entries(&test_session(&server)).await.unwrap();
    assert_eq!(stored, Some(2));

    let found = index.query(&SummaryFilter::for_user(TEST_USER)).await.unwrap();
    assert_eq!(found.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 1]);
    assert!(index.import_status(TEST_USER).await.unwrap().is_none());

    p1.assert_async().await;
    p2.assert_async().await;
}

#[tokio::test]
async fn test_reimport_replaces_previous_entries() {
    let mut server = Server::new_async().await;
    let tc = test_context(&server.url(), |c| c.page_size = 2).await;
    let index = tc.ctx.index();

    {
        let _p1 = mock_page(
            &mut server,
            1,
            serde_json::json!([
                activity_json(5, TEST_USER, "2026-03-05T08:00:00Z", ROUTE),
                activity_json(4, TEST_USER, "2026-03-04T08:00:00Z", ROUTE),
            ]),
        )
        .await;
        let _p2 = mock_page(&mut server, 2, serde_json::json!([])).await;
        assert_eq!(
            index.import_entries(&test_session(&server)).await.unwrap(),
            Some(2)
        );
    }

    // Activity 4 was deleted upstream in the meantime.
    let _p1 = mock_page(
        &mut server,
        1,
        serde_json::json!([activity_json(5, TEST_USER, "2026-03-05T08:00:00Z", ROUTE)]),
    )
    .await;
    assert_eq!(
        index.import_entries(&test_session(&server)).await.unwrap(),
        Some(1)
    );

    assert!(tc.store.get_summary(4).await.unwrap().is_none());
    assert!(tc.store.get_summary(5).await.unwrap().is_some());
}

#[tokio::test]
async fn test_rate_limit_sets_error_flag_and_keeps_entries() {
    let mut server = Server::new_async().await;
    let tc = test_context(&server.url(), |c| c.page_size = 2).await;
    let index = tc.ctx.index();

    let first_page = mock_page(
        &mut server,
        1,
        serde_json::json!([activity_json(9, TEST_USER, "2026-03-09T08:00:00Z", ROUTE)]),
    )
    .await;
    index.import_entries(&test_session(&server)).await.unwrap();
    drop(first_page);

    let _limited = server
        .mock("GET", "/api/v3/athlete/activities")
        .match_query(Matcher::Any)
        .with_status(429)
        .create_async()
        .await;

    let err = index
        .import_entries(&test_session(&server))
        .await
        .unwrap_err();
    assert!(err.is_rate_limit());

    let flag = index.import_status(TEST_USER).await.unwrap().unwrap();
    assert!(flag.error);
    assert!(flag.msg.contains("rate limit"));
    assert!(tc.store.get_summary(9).await.unwrap().is_some());
}

#[tokio::test]
async fn test_revoked_token_sets_error_flag() {
    let mut server = Server::new_async().await;
    let _revoked = server
        .mock("GET", "/api/v3/athlete/activities")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message":"Authorization Error"}"#)
        .create_async()
        .await;

    let tc = test_context(&server.url(), |_| {}).await;
    let err = tc
        .ctx
        .index()
        .import_entries(&test_session(&server))
        .await
        .unwrap_err();
    assert!(err.is_token_error());

    let flag = tc.ctx.index().import_status(TEST_USER).await.unwrap().unwrap();
    assert!(flag.error);
}

#[tokio::test]
async fn test_running_import_holds_lease() {
    let mut server = Server::new_async().await;
    let untouched = server
        .mock("GET", "/api/v3/athlete/activities")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let tc = test_context(&server.url(), |_| {}).await;
    tc.hot
        .set(
            &keys::import_flag(TEST_USER),
            &serde_json::to_vec(&ImportProgress::running(200)).unwrap(),
            Duration::from_secs(20),
        )
        .await
        .unwrap();

    let result = tc
        .ctx
        .index()
        .import_entries(&test_session(&server))
        .await
        .unwrap();
    assert_eq!(result, None);
    untouched.assert_async().await;
}

#[tokio::test]
async fn test_failed_flag_does_not_block_retry() {
    let mut server = Server::new_async().await;
    let _p1 = mock_page(&mut server, 1, serde_json::json!([])).await;

    let tc = test_context(&server.url(), |c| c.page_size = 2).await;
    tc.hot
        .set(
            &keys::import_flag(TEST_USER),
            &serde_json::to_vec(&ImportProgress::failed("earlier failure")).unwrap(),
            Duration::from_secs(10),
        )
        .await
        .unwrap();

    let result = tc
        .ctx
        .index()
        .import_entries(&test_session(&server))
        .await
        .unwrap();
    assert_eq!(result, Some(0));
}

#[tokio::test]
async fn test_store_failure_drops_batch() {
    let mut server = Server::new_async().await;
    let _p1 = mock_page(
        &mut server,
        1,
        serde_json::json!([activity_json(1, TEST_USER, "2026-03-01T08:00:00Z", ROUTE)]),
    )
    .await;

    let tc = test_context(&server.url(), |c| c.page_size = 2).await;
    tc.store.set_fail_writes(true);

    let err = tc
        .ctx
        .index()
        .import_entries(&test_session(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    tc.store.set_fail_writes(false);
    assert!(tc.store.get_summary(1).await.unwrap().is_none());
    let flag = tc.ctx.index().import_status(TEST_USER).await.unwrap().unwrap();
    assert_eq!(flag.msg, "Could not save activity index");
}

#[tokio::test]
async fn test_import_one() {
    let mut server = Server::new_async().await;
    let _found = server
        .mock("GET", "/api/v3/activities/11")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(activity_json(11, TEST_USER, "2026-04-01T08:00:00Z", ROUTE).to_string())
        .create_async()
        .await;
    let _gone = server
        .mock("GET", "/api/v3/activities/12")
        .with_status(404)
        .with_body(r#"{"message":"Record Not Found"}"#)
        .create_async()
        .await;
    let _foreign = server
        .mock("GET", "/api/v3/activities/13")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(activity_json(13, TEST_USER + 1, "2026-04-01T08:00:00Z", ROUTE).to_string())
        .create_async()
        .await;

    let tc = test_context(&server.url(), |_| {}).await;
    let index = tc.ctx.index();
    let session = test_session(&server);

    assert!(index.import_one(&session, 11).await.unwrap());
    assert!(!index.import_one(&session, 12).await.unwrap());
    assert!(matches!(
        index.import_one(&session, 13).await,
        Err(AppError::BadRequest(_))
    ));

    let held: HashSet<u64> = HashSet::new();
    let diff = index
        .reconcile(&SummaryFilter::for_user(TEST_USER), &held)
        .await
        .unwrap();
    assert_eq!(diff.fetch.iter().map(|s| s.id).collect::<Vec<_>>(), vec![11]);
}

#[tokio::test]
async fn test_concurrent_imports_share_one_lease() {
    let mut server = Server::new_async().await;
    let p1 = mock_page(
        &mut server,
        1,
        serde_json::json!([activity_json(1, TEST_USER, "2026-03-01T08:00:00Z", ROUTE)]),
    )
    .await;

    let tc = test_context(&server.url(), |c| c.page_size = 2).await;
    let index = tc.ctx.index();
    let session = test_session(&server);

    let (a, b) = tokio::join!(index.import_entries(&session), index.import_entries(&session));
    let mut results = vec![a.unwrap(), b.unwrap()];
    results.sort();
    assert_eq!(results, vec![None, Some(1)]);
    p1.assert_async().await;
}
