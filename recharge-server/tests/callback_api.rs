//! 回调 HTTP 入口测试

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use recharge_server::ServerState;
use recharge_server::core::Config;
use recharge_server::db::DbService;
use recharge_server::db::repository::{
    PlatformApiRepository, ProductRepository, UserRepository,
};
use recharge_server::platform::PlatformRegistry;
use recharge_server::platform::mock::MockAdapter;
use recharge_server::queue::TaskQueue;
use shared::models::order::{OrderCreate, OrderOrigin, OrderStatus};
use shared::models::platform::{PlatformApi, PlatformApiParam};
use shared::models::product::{Product, ProductApiRelation};
use shared::models::user::User;
use std::sync::Arc;
use tower::ServiceExt;

async fn test_state() -> ServerState {
    let db = DbService::new_in_memory().await.unwrap();
    let queue = TaskQueue::open_in_memory().unwrap();
    let registry = Arc::new(PlatformRegistry::new());
    registry.register(Arc::new(MockAdapter::new("mock_a")));

    let now = shared::util::now_millis();
    UserRepository::new(db.pool.clone())
        .insert(&User {
            id: 1,
            username: "customer".into(),
            balance: 1000.0,
            credit: 0.0,
            disabled: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    let products = ProductRepository::new(db.pool.clone());
    products
        .insert(&Product {
            id: 100,
            name: "话费50".into(),
            denom: 50.0,
            disabled: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    let apis = PlatformApiRepository::new(db.pool.clone());
    apis.insert(&PlatformApi {
        id: 11,
        name: "mock_a 通道".into(),
        platform: "mock_a".into(),
        submit_url: String::new(),
        query_url: String::new(),
        app_id: "app".into(),
        app_secret: "secret".into(),
        disabled: 0,
        created_at: now,
        updated_at: now,
    })
    .await
    .unwrap();
    apis.insert_param(&PlatformApiParam {
        id: 21,
        api_id: 11,
        product_code: "HF50".into(),
        denom: 50.0,
        price: 48.5,
        disabled: 0,
    })
    .await
    .unwrap();
    products
        .insert_relation(&ProductApiRelation {
            id: 110,
            product_id: 100,
            api_id: 11,
            api_param_id: 21,
            sort: 1,
            disabled: 0,
        })
        .await
        .unwrap();

    ServerState::with_parts(
        Config::with_overrides("/tmp/recharge-api-test", 0),
        db.pool.clone(),
        queue,
        registry,
    )
}

#[tokio::test]
async fn health_reports_queue_depth() {
    let state = test_state().await;
    let app = recharge_server::api::router(state);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["queue_depth"], 0);
}

#[tokio::test]
async fn callback_endpoint_acks_and_completes_order() {
    let state = test_state().await;

    let order = state
        .orders
        .create(OrderCreate {
            customer_id: 1,
            product_id: 100,
            mobile: "13900000000".into(),
            denom: 50.0,
            price: 49.5,
            origin: OrderOrigin::External,
            platform_account_id: 0,
            notify_url: None,
        })
        .await
        .unwrap();
    state.queue.reserve().unwrap();
    state.recharge.process(order.id).await.unwrap();

    let app = recharge_server::api::router(state.clone());
    let payload = format!(
        r#"{{"order_no":"{}","platform_order_no":"P-9","status":"success"}}"#,
        order.order_number
    );
    let response = app
        .oneshot(
            Request::post("/callback/mock_a")
                .header("Content-Type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"success");

    let stored = state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Success);
}

#[tokio::test]
async fn callback_rejects_unknown_platform_and_bad_payload() {
    let state = test_state().await;
    let app = recharge_server::api::router(state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::post("/callback/nope")
                .body(Body::from(r#"{"order_no":"R1","status":"success"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::post("/callback/mock_a")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
