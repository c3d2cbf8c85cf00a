use fabricflow_client::{PartitionSpec, PollTimings, ServiceSpec, StatelessSpec, StaticTokenSource};
use fabricflow_provider::{
    ActionType, ApplicationConfig, AuthType, DeleteOutcome, FabricProvider, ProviderConfig,
    ProviderError, Resource, ServiceConfig,
};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn provider(server: &MockServer, recreate_on_upgrade: bool) -> FabricProvider {
    let mut config = ProviderConfig::new(server.base_url());
    config.auth_type = AuthType::Entra;
    config.cluster_application_id = Some("api://cluster".into());
    config.features.application_recreate_on_upgrade = recreate_on_upgrade;
    config.timings = PollTimings {
        operation_poll_delay: Duration::from_millis(10),
        upgrade_poll_interval: Duration::from_millis(10),
        materialize_backoff: Duration::from_millis(10),
        max_materialize_attempts: Some(3),
    };
    FabricProvider::new(&config, Some(Arc::new(StaticTokenSource::new("token")))).unwrap()
}

fn shop(version: &str) -> ApplicationConfig {
    ApplicationConfig {
        name: "fabric:/Shop".into(),
        type_name: "ShopType".into(),
        type_version: version.into(),
        ..Default::default()
    }
}

fn web(move_cost: Option<&str>) -> ServiceConfig {
    ServiceConfig {
        spec: ServiceSpec {
            name: "fabric:/Shop/Web".into(),
            service_type_name: "WebType".into(),
            service_kind: "Stateless".into(),
            partition: Some(PartitionSpec {
                scheme: "Singleton".into(),
                ..Default::default()
            }),
            default_move_cost: move_cost.map(str::to_string),
            stateless: Some(StatelessSpec {
                instance_count: Some(-1),
                ..Default::default()
            }),
            ..Default::default()
        },
        force_remove: false,
    }
}

fn already_exists() -> serde_json::Value {
    json!({
        "Error": {
            "Code": "FABRIC_E_APPLICATION_ALREADY_EXISTS",
            "Message": "Application already exists"
        }
    })
}

#[tokio::test]
async fn existing_application_is_upgraded_when_enabled() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/Applications/$/Create")
            .header("Authorization", "Bearer token");
        then.status(409).json_body(already_exists());
    });
    let upgrade = server.mock(|when, then| {
        when.method(POST)
            .path("/Applications/Shop/$/Upgrade")
            .json_body(json!({
                "Name": "fabric:/Shop",
                "TargetApplicationTypeVersion": "2.0.0",
                "UpgradeKind": "Rolling",
                "RollingUpgradeMode": "UnmonitoredAuto",
                "ForceRestart": true
            }));
        then.status(200);
    });
    let progress = server.mock(|when, then| {
        when.method(GET).path("/Applications/Shop/$/GetUpgradeProgress");
        then.status(200)
            .json_body(json!({"UpgradeState": "RollingForwardCompleted"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/Applications/Shop");
        then.status(200).json_body(json!({
            "Id": "Shop",
            "Name": "fabric:/Shop",
            "TypeName": "ShopType",
            "TypeVersion": "2.0.0",
            "Status": "Ready",
            "HealthState": "Ok"
        }));
    });

    let state = provider(&server, true)
        .applications()
        .create(&CancellationToken::new(), &shop("2.0.0"))
        .await
        .unwrap();

    create.assert();
    upgrade.assert();
    assert_eq!(progress.calls(), 1);
    assert_eq!(state.type_version, "2.0.0");
    assert_eq!(state.id, "ShopType|fabric:/Shop");
}

#[tokio::test]
async fn existing_application_fails_create_when_disabled() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/Applications/$/Create");
        then.status(409).json_body(already_exists());
    });
    let upgrade = server.mock(|when, then| {
        when.method(POST).path("/Applications/Shop/$/Upgrade");
        then.status(200);
    });

    let err = provider(&server, false)
        .applications()
        .create(&CancellationToken::new(), &shop("2.0.0"))
        .await
        .unwrap_err();

    match err {
        ProviderError::Fabric(e) => assert!(e.is_application_already_exists()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(upgrade.calls(), 0);
}

#[tokio::test]
async fn application_version_bump_upgrades_without_force_restart() {
    let server = MockServer::start();
    let upgrade = server.mock(|when, then| {
        when.method(POST)
            .path("/Applications/Shop/$/Upgrade")
            .json_body(json!({
                "Name": "fabric:/Shop",
                "TargetApplicationTypeVersion": "2.0.0",
                "UpgradeKind": "Rolling",
                "RollingUpgradeMode": "UnmonitoredAuto"
            }));
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(GET).path("/Applications/Shop/$/GetUpgradeProgress");
        then.status(200).json_body(json!({"UpgradeState": ""}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/Applications/Shop");
        then.status(200).json_body(json!({
            "Name": "fabric:/Shop",
            "TypeName": "ShopType",
            "TypeVersion": "2.0.0"
        }));
    });

    let applications = provider(&server, false).applications();
    let action = applications.plan(&shop("1.0.0"), &shop("2.0.0")).unwrap();
    assert_eq!(action.action_type, ActionType::Update);

    let state = applications
        .update(&CancellationToken::new(), &shop("1.0.0"), &shop("2.0.0"))
        .await
        .unwrap();
    upgrade.assert();
    assert_eq!(state.type_version, "2.0.0");
}

#[tokio::test]
async fn service_move_cost_change_sends_one_flag() {
    let server = MockServer::start();
    let update = server.mock(|when, then| {
        when.method(POST)
            .path("/Services/Shop~Web/$/Update")
            .json_body(json!({
                "ServiceKind": "Stateless",
                "Flags": "32",
                "DefaultMoveCost": "High"
            }));
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(GET).path("/Applications/Shop/$/GetServices/Shop~Web");
        then.status(200).json_body(json!({
            "Id": "Shop~Web",
            "ServiceKind": "Stateless",
            "Name": "fabric:/Shop/Web",
            "TypeName": "WebType",
            "HealthState": "Ok",
            "ServiceStatus": "Active"
        }));
    });

    let services = provider(&server, false).services();
    let prior = web(Some("Low"));
    let desired = web(Some("High"));

    let action = services.plan(&prior, &desired).unwrap();
    assert_eq!(action.action_type, ActionType::Update);
    assert_eq!(action.changes, vec!["default_move_cost".to_string()]);

    let state = services
        .update(&CancellationToken::new(), &prior, &desired)
        .await
        .unwrap();
    update.assert();
    assert_eq!(state.application_name, "fabric:/Shop");
    assert_eq!(state.service_status.as_deref(), Some("Active"));
}

#[tokio::test]
async fn unchanged_service_update_only_reads() {
    let server = MockServer::start();
    let update = server.mock(|when, then| {
        when.method(POST).path("/Services/Shop~Web/$/Update");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(GET).path("/Applications/Shop/$/GetServices/Shop~Web");
        then.status(204);
    });

    let config = web(None);
    let state = provider(&server, false)
        .services()
        .update(&CancellationToken::new(), &config, &config)
        .await
        .unwrap();
    assert_eq!(update.calls(), 0);
    assert_eq!(state.name, "fabric:/Shop/Web");
}

#[tokio::test]
async fn application_type_in_use_is_left_in_place() {
    let server = MockServer::start();
    let unprovision = server.mock(|when, then| {
        when.method(POST)
            .path("/ApplicationTypes/ShopType/$/Unprovision")
            .json_body(json!({"Async": true, "ApplicationTypeVersion": "1.0.0"}));
        then.status(409).json_body(json!({
            "Error": {
                "Code": "FABRIC_E_APPLICATION_TYPE_IN_USE",
                "Message": "Application type and version is still in use"
            }
        }));
    });

    let types = provider(&server, false).application_types();
    let mut state = types.import("ShopType/1.0.0").unwrap();
    state.retain_versions = Some(false);

    let outcome = types.delete(&CancellationToken::new(), &state).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::InUse);
    unprovision.assert();
}

#[tokio::test]
async fn application_type_create_provisions_then_reads() {
    let server = MockServer::start();
    let provision = server.mock(|when, then| {
        when.method(POST).path("/ApplicationTypes/$/Provision");
        then.status(202).header("Location", "/Operations/p-1");
    });
    server.mock(|when, then| {
        when.method(GET).path("/Operations/p-1");
        then.status(200).json_body(json!({"Status": "Succeeded"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/ApplicationTypes");
        then.status(200).json_body(json!({
            "Items": [{"Name": "ShopType", "Version": "1.0.0", "Status": "Available"}]
        }));
    });

    let state = provider(&server, false)
        .application_types()
        .create(
            &CancellationToken::new(),
            &fabricflow_provider::ApplicationTypeConfig {
                name: "ShopType".into(),
                version: "1.0.0".into(),
                package_uri: "https://store/shop.sfpkg".into(),
                retain_versions: None,
            },
        )
        .await
        .unwrap();

    provision.assert();
    assert_eq!(state.id, "ShopType/1.0.0");
    assert_eq!(state.status, "Available");
}

#[tokio::test]
async fn created_application_type_is_unprovisioned_on_delete() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/ApplicationTypes/$/Provision");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(GET).path("/ApplicationTypes");
        then.status(200).json_body(json!({
            "Items": [{"Name": "ShopType", "Version": "1.0.0", "Status": "Available"}]
        }));
    });
    let unprovision = server.mock(|when, then| {
        when.method(POST)
            .path("/ApplicationTypes/ShopType/$/Unprovision")
            .json_body(json!({"Async": true, "ApplicationTypeVersion": "1.0.0"}));
        then.status(200);
    });

    let types = provider(&server, false).application_types();
    let cancel = CancellationToken::new();
    let state = types
        .create(
            &cancel,
            &fabricflow_provider::ApplicationTypeConfig {
                name: "ShopType".into(),
                version: "1.0.0".into(),
                package_uri: "https://store/shop.sfpkg".into(),
                retain_versions: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(state.retain_versions, Some(false));

    let outcome = types.delete(&cancel, &state).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(unprovision.calls(), 1);
}

#[tokio::test]
async fn data_sources_report_empty_results() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/ApplicationTypes/ShopType/$/GetServiceTypes");
        then.status(204);
    });
    server.mock(|when, then| {
        when.method(GET).path("/ApplicationTypes");
        then.status(200).json_body(json!({
            "Items": [{"Name": "ShopType", "Version": "1.0.0"}]
        }));
    });

    let data = provider(&server, false).data();
    let cancel = CancellationToken::new();

    let err = data
        .service_types(&cancel, "ShopType", "1.0.0", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));

    let found = data
        .application_types(&cancel, Some("shoptype"), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let err = data
        .application_types(&cancel, Some("ShopType"), Some("9.9.9"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}
