//! 充值主流程集成测试
//!
//! 用内存数据库、内存队列和脚本化适配器覆盖：提单受理、失败
//! 切换、候选耗尽退款、人工重试、回调去重与终态回写、卡单恢复。

use recharge_server::callback::CallbackOutcome;
use recharge_server::core::Config;
use recharge_server::db::DbService;
use recharge_server::db::repository::{
    BalanceLogRepository, OrderRepository, PlatformApiRepository, ProductRepository,
    RetryRepository, UserRepository,
};
use recharge_server::platform::mock::{MockAdapter, SubmitScript};
use recharge_server::platform::{OrderProbe, PlatformRegistry};
use recharge_server::queue::TaskQueue;
use recharge_server::ServerState;
use shared::models::order::{OrderCreate, OrderOrigin, OrderStatus};
use shared::models::platform::{PlatformApi, PlatformApiParam};
use shared::models::product::{Product, ProductApiRelation};
use shared::models::retry::RetryStatus;
use shared::models::user::User;
use std::sync::Arc;

struct Harness {
    state: ServerState,
    db: DbService,
    mock_a: Arc<MockAdapter>,
    mock_b: Arc<MockAdapter>,
}

async fn harness() -> Harness {
    let db = DbService::new_in_memory().await.unwrap();
    let queue = TaskQueue::open_in_memory().unwrap();

    let registry = Arc::new(PlatformRegistry::new());
    let mock_a = Arc::new(MockAdapter::new("mock_a"));
    let mock_b = Arc::new(MockAdapter::new("mock_b"));
    registry.register(mock_a.clone());
    registry.register(mock_b.clone());

    let mut config = Config::with_overrides("/tmp/recharge-test", 0);
    config.retry_backoff_ms = 0;
    config.max_platform_switches = 3;
    let state = ServerState::with_parts(config, db.pool.clone(), queue, registry);

    seed(&db).await;
    Harness {
        state,
        db,
        mock_a,
        mock_b,
    }
}

async fn seed(db: &DbService) {
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
            name: "话费100".into(),
            denom: 100.0,
            disabled: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let apis = PlatformApiRepository::new(db.pool.clone());
    for (api_id, param_id, platform, price, sort) in
        [(11, 21, "mock_a", 97.0, 1), (12, 22, "mock_b", 96.0, 2)]
    {
        apis.insert(&PlatformApi {
            id: api_id,
            name: format!("{platform} 通道"),
            platform: platform.into(),
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
            id: param_id,
            api_id,
            product_code: "HF100".into(),
            denom: 100.0,
            price,
            disabled: 0,
        })
        .await
        .unwrap();
        products
            .insert_relation(&ProductApiRelation {
                id: api_id * 10,
                product_id: 100,
                api_id,
                api_param_id: param_id,
                sort,
                disabled: 0,
            })
            .await
            .unwrap();
    }
}

fn order_req() -> OrderCreate {
    OrderCreate {
        customer_id: 1,
        product_id: 100,
        mobile: "13800000000".into(),
        denom: 100.0,
        price: 99.0,
        origin: OrderOrigin::External,
        platform_account_id: 0,
        notify_url: None,
    }
}

fn success_callback(order_number: &str) -> Vec<u8> {
    format!(
        r#"{{"order_no":"{order_number}","platform_order_no":"P-1","status":"success","message":"ok"}}"#
    )
    .into_bytes()
}

fn failed_callback(order_number: &str) -> Vec<u8> {
    format!(
        r#"{{"order_no":"{order_number}","platform_order_no":"P-1","status":"failed","message":"line busy"}}"#
    )
    .into_bytes()
}

#[tokio::test]
async fn submit_accept_freezes_cost_price() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();

    let claimed = h.state.queue.reserve().unwrap().unwrap();
    assert_eq!(claimed, order.id);
    h.state.recharge.process(order.id).await.unwrap();

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Recharging);
    assert_eq!(stored.api_cur_id, 11);
    assert_eq!(stored.const_price, 97.0);
    assert!(stored.used_api_set().contains(11));
    assert_eq!(h.mock_a.submit_calls(), 1);
}

#[tokio::test]
async fn claim_is_exclusive() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();

    let orders = OrderRepository::new(h.db.pool.clone());
    assert!(orders.claim_for_processing(order.id, 11, 21).await.unwrap());
    assert!(!orders.claim_for_processing(order.id, 11, 21).await.unwrap());
}

#[tokio::test]
async fn success_callback_completes_once() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();
    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    let (outcome, ack) = h
        .state
        .callbacks
        .handle("mock_a", &success_callback(&order.order_number))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Completed);
    assert_eq!(ack, "success");

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Success);
    assert!(stored.finish_time.is_some());

    // 同结论重发：去重丢弃
    let (outcome, _) = h
        .state
        .callbacks
        .handle("mock_a", &success_callback(&order.order_number))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Duplicate);

    // 迟到的失败回调：留存但不撼动终态，也不退款
    let (outcome, _) = h
        .state
        .callbacks
        .handle("mock_a", &failed_callback(&order.order_number))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadyTerminal);
    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Success);
}

#[tokio::test]
async fn rejection_fails_over_to_next_platform() {
    let h = harness().await;
    h.mock_a
        .script_submit(SubmitScript::Reject("余额不足".into()));

    let order = h.state.orders.create(order_req()).await.unwrap();
    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    // 拒单后回到待充值，切换计划立即到期
    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::PendingRecharge);
    assert!(stored.used_api_set().contains(11));

    let executed = h.state.retry.run_due().await;
    assert_eq!(executed, 1);

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.api_cur_id, 12);

    // 切换后重新入队，第二个平台受理
    let claimed = h.state.queue.reserve().unwrap().unwrap();
    assert_eq!(claimed, order.id);
    h.state.recharge.process(order.id).await.unwrap();

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Recharging);
    assert_eq!(stored.const_price, 96.0);
    assert_eq!(h.mock_b.submit_calls(), 1);

    let retries = RetryRepository::new(h.db.pool.clone())
        .find_by_order(order.id)
        .await
        .unwrap();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].status, RetryStatus::Succeeded);
    assert_eq!(retries[0].to_api_id, 12);
}

#[tokio::test]
async fn exhausted_candidates_fail_and_refund_once() {
    let h = harness().await;
    h.mock_a.script_submit(SubmitScript::Reject("拒单".into()));
    h.mock_b.script_submit(SubmitScript::Reject("拒单".into()));

    // 平台订单：支付扣款后入队
    let mut req = order_req();
    req.origin = OrderOrigin::Platform;
    let order = h.state.orders.create(req).await.unwrap();
    h.state.orders.confirm_payment(order.id).await.unwrap();

    // 扣款发生在第一次提单前
    let users = UserRepository::new(h.db.pool.clone());
    assert_eq!(users.get(1).await.unwrap().balance, 1000.0);

    // 第一次提单被拒，切换到第二平台，再被拒，候选耗尽
    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();
    assert_eq!(users.get(1).await.unwrap().balance, 901.0);
    assert_eq!(h.state.retry.run_due().await, 1);
    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();
    assert_eq!(h.state.retry.run_due().await, 1);

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(stored.remark, "所有平台均已尝试");

    // 两个候选两条失败记录
    let retries = RetryRepository::new(h.db.pool.clone())
        .find_by_order(order.id)
        .await
        .unwrap();
    assert_eq!(retries.len(), 2);
    assert!(retries.iter().all(|r| r.status == RetryStatus::Failed));

    // 退款恰好一次
    assert_eq!(users.get(1).await.unwrap().balance, 1000.0);
    let logs = BalanceLogRepository::new(h.db.pool.clone())
        .find_by_order(order.id)
        .await
        .unwrap();
    assert_eq!(logs.len(), 2);

    // 失败后再来失败回调：只留存，不二次退款
    let (outcome, _) = h
        .state
        .callbacks
        .handle("mock_b", &failed_callback(&order.order_number))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadyTerminal);
    assert_eq!(users.get(1).await.unwrap().balance, 1000.0);
}

#[tokio::test]
async fn failed_callback_fails_order_and_refunds() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();
    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    let (outcome, _) = h
        .state
        .callbacks
        .handle("mock_a", &failed_callback(&order.order_number))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Failed);

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert!(stored.remark.contains("line busy"));

    // 外部预扣款订单失败回退到绑定账户
    let users = UserRepository::new(h.db.pool.clone());
    assert_eq!(users.get(1).await.unwrap().balance, 1099.0);

    // 重发同一失败回调：去重，不二次退款
    let (outcome, _) = h
        .state
        .callbacks
        .handle("mock_a", &failed_callback(&order.order_number))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Duplicate);
    assert_eq!(users.get(1).await.unwrap().balance, 1099.0);
}

#[tokio::test]
async fn late_acceptance_cannot_resurrect_terminal_order() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();

    // worker 已抢占，提单还在途
    let orders = OrderRepository::new(h.db.pool.clone());
    assert!(orders.claim_for_processing(order.id, 11, 21).await.unwrap());

    // 提单在途期间失败回调先落地：订单终结并退款
    let (outcome, _) = h
        .state
        .callbacks
        .handle("mock_a", &failed_callback(&order.order_number))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Failed);
    let users = UserRepository::new(h.db.pool.clone());
    assert_eq!(users.get(1).await.unwrap().balance, 1099.0);

    // 迟到的受理回写不生效，终态吸收，退款不被吞掉
    assert!(
        !orders
            .mark_recharging(order.id, 11, 21, 97.0, "[11]")
            .await
            .unwrap()
    );
    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(users.get(1).await.unwrap().balance, 1099.0);
}

#[tokio::test]
async fn debit_error_fails_order_instead_of_stranding_it() {
    let h = harness().await;

    let mut req = order_req();
    req.origin = OrderOrigin::Platform;
    let order = h.state.orders.create(req).await.unwrap();
    h.state.orders.confirm_payment(order.id).await.unwrap();

    // 扣款时账户行已不存在（极端数据故障）
    sqlx::query("DELETE FROM users WHERE id = 1")
        .execute(&h.db.pool)
        .await
        .unwrap();

    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    // 订单不能停留在处理中，走失败终态（未扣款，无退款流水）
    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert!(stored.remark.contains("订单扣款失败"));
    assert!(
        BalanceLogRepository::new(h.db.pool.clone())
            .find_by_order(order.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn missing_route_param_fails_order_after_claim() {
    let h = harness().await;

    // 路由指向不存在的套餐参数
    let now = shared::util::now_millis();
    let products = ProductRepository::new(h.db.pool.clone());
    products
        .insert(&Product {
            id: 300,
            name: "话费30".into(),
            denom: 30.0,
            disabled: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    products
        .insert_relation(&ProductApiRelation {
            id: 3000,
            product_id: 300,
            api_id: 11,
            api_param_id: 999,
            sort: 1,
            disabled: 0,
        })
        .await
        .unwrap();

    let mut req = order_req();
    req.product_id = 300;
    let order = h.state.orders.create(req).await.unwrap();
    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert!(stored.remark.contains("路由数据缺失"));
    // 外部预扣款订单照常退款
    let users = UserRepository::new(h.db.pool.clone());
    assert_eq!(users.get(1).await.unwrap().balance, 1099.0);
}

#[tokio::test]
async fn queue_sweep_keeps_recently_touched_pending_orders() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();
    assert_eq!(h.state.queue.ready_len().unwrap(), 1);

    // 做旧创建时间，模拟支付确认刚更新过状态的单
    let created = shared::util::now_millis() - 10_000;
    sqlx::query("UPDATE orders SET created_at = ? WHERE id = ?")
        .bind(created)
        .bind(order.id)
        .execute(&h.db.pool)
        .await
        .unwrap();

    // 本轮跳过但留在队列里，下一轮仍可投放
    let evicted = h.state.recharge.sweep_queue().await;
    assert_eq!(evicted, 0);
    assert_eq!(h.state.queue.ready_len().unwrap(), 1);
}

#[tokio::test]
async fn manual_retry_reopens_failed_platform() {
    let h = harness().await;

    // 只绑一个平台的产品
    let now = shared::util::now_millis();
    let products = ProductRepository::new(h.db.pool.clone());
    products
        .insert(&Product {
            id: 200,
            name: "话费50".into(),
            denom: 50.0,
            disabled: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    products
        .insert_relation(&ProductApiRelation {
            id: 2000,
            product_id: 200,
            api_id: 11,
            api_param_id: 21,
            sort: 1,
            disabled: 0,
        })
        .await
        .unwrap();

    h.mock_a.script_submit(SubmitScript::Reject("通道抖动".into()));

    let mut req = order_req();
    req.product_id = 200;
    req.origin = OrderOrigin::Platform;
    let order = h.state.orders.create(req).await.unwrap();
    h.state.orders.confirm_payment(order.id).await.unwrap();

    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    let users = UserRepository::new(h.db.pool.clone());
    assert_eq!(users.get(1).await.unwrap().balance, 901.0);
    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::PendingRecharge);

    // 人工强制重试放行原平台
    let retries = RetryRepository::new(h.db.pool.clone());
    let record = &retries.find_by_order(order.id).await.unwrap()[0];
    assert!(h.state.retry.manual_retry(record.id).await.unwrap());

    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Recharging);
    assert_eq!(stored.const_price, 97.0);
    // 扣款恰好一次
    assert_eq!(users.get(1).await.unwrap().balance, 901.0);
    assert_eq!(
        retries.find_by_order(order.id).await.unwrap()[0].status,
        RetryStatus::Succeeded
    );
    assert_eq!(h.mock_a.submit_calls(), 2);
}

#[tokio::test]
async fn stuck_order_recovered_by_status_query() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();
    h.state.queue.reserve().unwrap();
    h.state.recharge.process(order.id).await.unwrap();

    // 把订单做旧成十分钟没动静的充值中
    let stale = shared::util::now_millis() - 10 * 60 * 1000;
    sqlx::query("UPDATE orders SET updated_at = ? WHERE id = ?")
        .bind(stale)
        .bind(order.id)
        .execute(&h.db.pool)
        .await
        .unwrap();

    h.mock_a.set_probe(OrderProbe::Success);
    let handled = h.state.recharge.sweep_stuck().await;
    assert_eq!(handled, 1);

    let stored = h.state.orders.repository().get(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Success);
}

#[tokio::test]
async fn queue_sweep_evicts_terminal_orders() {
    let h = harness().await;
    let order = h.state.orders.create(order_req()).await.unwrap();
    assert_eq!(h.state.queue.ready_len().unwrap(), 1);

    // 订单在队列里时被别的路径终结
    h.state
        .orders
        .complete_success(order.id, "人工处理")
        .await
        .unwrap();

    let evicted = h.state.recharge.sweep_queue().await;
    assert_eq!(evicted, 1);
    assert_eq!(h.state.queue.ready_len().unwrap(), 0);
}
