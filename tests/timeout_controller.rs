use pdf2img::timeout::TimeoutController;
use std::time::Duration;

#[tokio::test]
async fn disarmed_controller_never_fires() {
    let mut timer = TimeoutController::new(Duration::from_millis(20));
    assert!(!timer.is_armed());
    let fired = tokio::time::timeout(Duration::from_millis(100), timer.expired()).await;
    assert!(fired.is_err());

    timer.arm();
    timer.disarm();
    let fired = tokio::time::timeout(Duration::from_millis(100), timer.expired()).await;
    assert!(fired.is_err());
}

#[tokio::test]
async fn fires_once_after_the_limit() {
    let mut timer = TimeoutController::new(Duration::from_millis(30));
    timer.arm();
    timer.expired().await;
    assert!(timer.elapsed() >= Duration::from_millis(30));
    assert!(!timer.is_armed());
    let again = tokio::time::timeout(Duration::from_millis(100), timer.expired()).await;
    assert!(again.is_err());
}

#[tokio::test]
async fn guard_prefers_the_deadline() {
    let mut timer = TimeoutController::new(Duration::from_millis(30));
    timer.arm();
    let out = timer
        .guard(tokio::time::sleep(Duration::from_secs(5)))
        .await;
    assert!(out.is_none());

    let mut timer = TimeoutController::new(Duration::from_secs(5));
    timer.arm();
    assert_eq!(timer.guard(async { 7 }).await, Some(7));
    assert!(timer.is_armed());
}
