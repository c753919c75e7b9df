mod common;

use cashier::config::{PopupSettings, TimingSettings};
use cashier::flow::FlowError;
use cashier::{Monitor, MonitorConfig, MonitorError, Selector};
use common::{
    Command, ElementSpec, FakeConnector, FakeDevice, RecordingDelivery, UnreachableConnector,
};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

const STAMP: &str = "20240309_070501";

const WECHAT: &str = r#"{
  "appName": "WeChat",
  "appPackage": "com.tencent.mm",
  "steps": [
    {"action": "click", "locatorType": "ID", "locatorValue": "wx_me", "description": "me tab", "timeout": 0},
    {"action": "click", "locatorType": "ID", "locatorValue": "wx_services", "description": "services", "timeout": 0},
    {"action": "click", "locatorType": "ID", "locatorValue": "wx_wallet", "description": "wallet", "timeout": 0}
  ]
}"#;

const ALIPAY: &str = r#"{
  "appName": "Alipay",
  "appPackage": "com.eg.android.AlipayGphone",
  "steps": [
    {"action": "click", "locatorType": "ID", "locatorValue": "ali_home", "description": "home", "timeout": 0},
    {"action": "click", "locatorType": "ID", "locatorValue": "ali_paycode", "description": "pay code", "timeout": 0}
  ]
}"#;

const MEITUAN: &str = r#"
appName: Meituan
appPackage: com.sankuai.meituan
steps:
  - action: wait
    locatorType: ACCESSIBILITY_ID
    locatorValue: mt_cashier
    description: cashier page
    timeout: 0
"#;

fn config(root: &Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.flows.directory = root.join("flows");
    config.screenshots.directory = root.join("screenshots");
    config.timing = TimingSettings::immediate();
    config.popups = PopupSettings::immediate();
    config
}

fn write_flows(root: &Path) {
    let flows = root.join("flows");
    fs::create_dir_all(&flows).unwrap();
    fs::write(flows.join("1_wechat.json"), WECHAT).unwrap();
    fs::write(flows.join("2_alipay.json"), ALIPAY).unwrap();
    fs::write(flows.join("3_meituan.yaml"), MEITUAN).unwrap();
}

fn device() -> FakeDevice {
    ["wx_me", "wx_services", "wx_wallet", "ali_home"]
        .into_iter()
        .fold(FakeDevice::new(), |fake, id| {
            fake.with_element(Selector::Id(id.to_string()), ElementSpec::new(id))
        })
        .with_element(
            Selector::AccessibilityId("mt_cashier".to_string()),
            ElementSpec::new("mt_cashier"),
        )
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_full_run_collects_evidence_and_delivers_once() {
    let root = tempfile::tempdir().unwrap();
    write_flows(root.path());
    let fake = device();
    let connector = Arc::new(FakeConnector::new(fake.clone()));
    let delivery = Arc::new(RecordingDelivery::default());
    let monitor = Monitor::new(config(root.path()), connector.clone(), delivery.clone());

    let summary = monitor.run_with_stamp(STAMP.to_string()).await.unwrap();

    let results: Vec<(&str, bool)> = summary
        .outcomes
        .iter()
        .map(|o| (o.app_name.as_str(), o.success))
        .collect();
    assert_eq!(
        results,
        vec![("WeChat", true), ("Alipay", false), ("Meituan", true)]
    );

    let shots: Vec<String> = summary
        .outcomes
        .iter()
        .map(|o| file_name(o.screenshot.as_ref().unwrap()))
        .collect();
    assert_eq!(
        shots,
        vec![
            format!("WeChat_cashier_success_{STAMP}.png"),
            format!("Alipay_cashier_failed_{STAMP}.png"),
            format!("Meituan_cashier_success_{STAMP}.png"),
        ]
    );
    assert_eq!(summary.run_dir, root.path().join("screenshots").join(STAMP));

    let archive = summary.archive.clone().unwrap();
    assert_eq!(file_name(&archive), format!("cashier_screenshots_{STAMP}.zip"));
    let zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    let mut entries: Vec<String> = zip.file_names().map(str::to_string).collect();
    entries.sort();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.ends_with(".png") && !e.contains('/')));

    assert_eq!(delivery.calls(), vec![archive]);
    assert!(summary.delivered);
    assert_eq!(connector.connects(), 1);
    assert_eq!(fake.count(&Command::Quit), 1);
    assert_eq!(fake.count(&Command::Screenshot), 3);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
}

#[tokio::test]
async fn test_session_failure_aborts_before_any_app() {
    let root = tempfile::tempdir().unwrap();
    write_flows(root.path());
    let delivery = Arc::new(RecordingDelivery::default());
    let monitor = Monitor::new(
        config(root.path()),
        Arc::new(UnreachableConnector),
        delivery.clone(),
    );

    let result = monitor.run_with_stamp(STAMP.to_string()).await;

    assert!(matches!(result, Err(MonitorError::Session(_))));
    assert!(delivery.calls().is_empty());
}

#[tokio::test]
async fn test_missing_flow_dir_aborts_before_session() {
    let root = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::new(FakeDevice::new()));
    let monitor = Monitor::new(
        config(root.path()),
        connector.clone(),
        Arc::new(RecordingDelivery::default()),
    );

    let result = monitor.run_with_stamp(STAMP.to_string()).await;

    assert!(matches!(
        result,
        Err(MonitorError::Flows(FlowError::MissingDirectory(_)))
    ));
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_malformed_flow_becomes_failed_outcome() {
    let root = tempfile::tempdir().unwrap();
    write_flows(root.path());
    fs::write(root.path().join("flows").join("0_broken.json"), "{\"appName\": ").unwrap();
    let fake = device();
    let monitor = Monitor::new(
        config(root.path()),
        Arc::new(FakeConnector::new(fake.clone())),
        Arc::new(RecordingDelivery::default()),
    );

    let summary = monitor.run_with_stamp(STAMP.to_string()).await.unwrap();

    assert_eq!(summary.outcomes.len(), 4);
    let broken = &summary.outcomes[0];
    assert_eq!(broken.app_name, "0_broken");
    assert!(!broken.success);
    assert!(broken.error.is_some());
    assert_eq!(
        file_name(broken.screenshot.as_ref().unwrap()),
        format!("0_broken_cashier_failed_{STAMP}.png")
    );
    assert_eq!(fake.count(&Command::Quit), 1);
}
