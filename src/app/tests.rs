use super::*;
use crate::config::{CameraEntry, ParkwatchConfig};
use crate::camera::AuthMode;
use crate::error::{ParkwatchError, RegistryError};
use crate::zones::{Point, Zone};
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> ParkwatchConfig {
    let mut config = ParkwatchConfig::default();
    config.zones.path = dir.path().join("zones.json").to_string_lossy().to_string();
    config.cameras = vec![
        CameraEntry {
            id: "north".to_string(),
            url: "http://127.0.0.1:9/snapshot.jpg".to_string(),
            requires_auth: false,
            auth_mode: AuthMode::None,
            user: None,
            password: None,
        },
        CameraEntry {
            id: "south".to_string(),
            url: "http://127.0.0.1:9/picture/2".to_string(),
            requires_auth: true,
            auth_mode: AuthMode::Digest,
            user: Some("admin".to_string()),
            password: Some("secret".to_string()),
        },
    ];
    config
}

fn zone(id: &str, space_number: u32) -> Zone {
    Zone::new(
        id,
        space_number,
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ],
    )
}

#[tokio::test]
async fn test_app_creation_registers_cameras() {
    let dir = TempDir::new().unwrap();
    let app = ParkwatchApp::new(create_test_config(&dir)).await.unwrap();

    let ids: Vec<String> = app.registry().list().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["north".to_string(), "south".to_string()]);
    assert!(!app.feeds().has_detector());

    // No components started yet
    assert!(app.get_all_component_states().await.is_empty());
}

#[tokio::test]
async fn test_app_rejects_bad_camera_id() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.cameras[0].id = " ".to_string();

    let result = ParkwatchApp::new(config).await;
    assert!(matches!(
        result.err(),
        Some(ParkwatchError::Registry(RegistryError::InvalidId(_)))
    ));
}

#[tokio::test]
async fn test_lifecycle_states() {
    let dir = TempDir::new().unwrap();
    let mut app = ParkwatchApp::new(create_test_config(&dir)).await.unwrap();

    app.initialize().await.unwrap();
    assert_eq!(
        app.get_component_state("zones").await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        app.get_component_state("cameras").await,
        Some(ComponentState::Stopped)
    );

    app.start().await.unwrap();
    assert_eq!(
        app.get_component_state("cameras").await,
        Some(ComponentState::Running)
    );
    assert!(app.registry().is_live("north"));
    assert!(app.registry().is_live("south"));

    let exit_code = app.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert!(!app.registry().is_live("north"));
    assert!(app.cancellation_token().is_cancelled());
    assert_eq!(
        app.get_component_state("cameras").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_zones_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let mut app = ParkwatchApp::new(create_test_config(&dir)).await.unwrap();
        app.initialize().await.unwrap();
        app.zones()
            .sync("north", vec![zone("a", 1), zone("b", 2)])
            .await
            .unwrap();
    }

    let mut app = ParkwatchApp::new(create_test_config(&dir)).await.unwrap();
    app.initialize().await.unwrap();

    let status = app.feeds().status("north");
    assert_eq!(status.total_spaces, 2);
    assert_eq!(status.occupied_spaces, 0);
    assert!(status.last_update.is_none());
}

#[tokio::test]
async fn test_corrupt_zone_file_fails_initialization() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("zones.json"), "[not a map").unwrap();

    let mut app = ParkwatchApp::new(create_test_config(&dir)).await.unwrap();
    assert!(app.initialize().await.is_err());
    assert_eq!(
        app.get_component_state("zones").await,
        Some(ComponentState::Failed)
    );
}

#[tokio::test]
async fn test_run_stops_on_requested_shutdown() {
    let dir = TempDir::new().unwrap();
    let mut app = ParkwatchApp::new(create_test_config(&dir)).await.unwrap();
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    let token = app.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();
    });

    let exit_code = tokio::time::timeout(std::time::Duration::from_secs(5), app.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
    assert!(!app.registry().is_live("north"));

    // The shutdown channel is consumed by the first run.
    assert!(app.run().await.is_err());
}
