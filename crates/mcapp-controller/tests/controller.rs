mod common;

use common::{mcapp, seeded_stores, Fixture, Interleaved};
use mcapp_controller::{Controller, ControllerConfig, Stores};
use mcapp_store::ObjectStore;
use mcapp_types::{AppState, GLOBAL_NAMESPACE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Poll `check` until it holds or a few seconds pass
async fn eventually<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_controller_rolls_out_and_stops() {
    let fixture = Fixture::new().await;
    let fx = &fixture;
    let controller = Arc::new(Controller::new(
        ControllerConfig::default(),
        fx.stores.stores(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(Arc::clone(&controller).run(shutdown_rx));

    fx.create(mcapp("web", &["c-1:p-1", "c-2:p-3"], None)).await;
    eventually("apps created", move || async move { fx.stores.apps.len() == 2 }).await;

    fx.mark_all_ready().await;
    eventually("revision recorded", move || async move {
        fx.mcapp("web").await.status.revision_name.is_some()
    })
    .await;
    eventually("status reduced", move || async move {
        let web = fx.mcapp("web").await;
        web.status.state == Some(AppState::Active)
            && web
                .spec
                .targets
                .iter()
                .all(|t| t.state == Some(AppState::Active))
    })
    .await;

    fx.stores.mcapps.delete(GLOBAL_NAMESPACE, "web").await.unwrap();
    eventually("apps deleted", move || async move { fx.stores.apps.is_empty() }).await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("controller stops")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_in_flight_sync_before_stopping_timers() {
    let stores = seeded_stores().await;
    let versions = Arc::new(
        Interleaved::new(stores.template_versions.clone()).slow_gets(Duration::from_millis(300)),
    );
    let view = Stores {
        template_versions: versions,
        ..stores.stores()
    };
    let controller = Arc::new(Controller::new(ControllerConfig::default(), view));
    stores
        .mcapps
        .create(mcapp("web", &["c-1:p-1", "c-2:p-3"], Some((1, 60))))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(Arc::clone(&controller).run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("controller stops")
        .unwrap();

    // The in-flight sync finished its first batch before timers were stopped
    assert_eq!(stores.apps.len(), 1);
    assert!(controller.reconciler().rollouts().is_empty().await);
}
