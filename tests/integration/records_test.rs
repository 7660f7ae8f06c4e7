//! Accelerator, deployable and attribute record tests against PostgreSQL.
//! `DATABASE_URL=postgres://... cargo test --test records_test -- --ignored`

use uuid::Uuid;

use accelhub_core::config::DatabaseConfig;
use accelhub_core::traits::UsageSource;
use accelhub_core::types::AcceleratorId;
use accelhub_database::DatabasePool;
use accelhub_database::repositories::{
    AcceleratorRepository, AttributeRepository, DeployableRepository,
};
use accelhub_entity::accelerator::{Accelerator, CreateAccelerator, UpdateAccelerator};
use accelhub_entity::attribute::CreateAttribute;
use accelhub_entity::deployable::{CreateDeployable, Deployable, UpdateDeployable};

async fn database() -> DatabasePool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let config: DatabaseConfig =
        serde_json::from_value(serde_json::json!({ "url": url })).expect("database config");
    let database = DatabasePool::connect(&config)
        .await
        .expect("Failed to connect to test database");
    database.health_check().await.expect("database answers");

    accelhub_database::migration::run_migrations(database.pool())
        .await
        .expect("Failed to run migrations");
    database
}

/// A name no other test run has used
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", AcceleratorId::new())
}

async fn create_accelerator(repo: &AcceleratorRepository, project: &str) -> Accelerator {
    repo.create(&CreateAccelerator {
        name: "fpga0".into(),
        description: Some("test board".into()),
        project_id: project.into(),
        user_id: None,
        device_type: "fpga".into(),
        acc_type: Some("crypto".into()),
        acc_capability: None,
        vendor_id: Some("0x8086".into()),
        product_id: Some("0x0b30".into()),
        remotable: 0,
    })
    .await
    .expect("create accelerator")
}

async fn create_deployable(
    repo: &DeployableRepository,
    accelerator: &Accelerator,
    host: &str,
    pcie_address: &str,
) -> Deployable {
    repo.create(&CreateDeployable {
        name: format!("{}-{pcie_address}", accelerator.name),
        parent_id: None,
        root_id: None,
        pcie_address: pcie_address.into(),
        host: host.into(),
        board: "a10".into(),
        vendor: "intel".into(),
        version: "1.0".into(),
        deployable_type: "pf".into(),
        assignable: true,
        availability: "free".into(),
        accelerator_id: Some(accelerator.id),
    })
    .await
    .expect("create deployable")
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deployables_found_by_host_and_accelerator() {
    let database = database().await;
    let pool = database.pool().clone();
    let accelerators = AcceleratorRepository::new(pool.clone());
    let deployables = DeployableRepository::new(pool);
    let project = unique("project");
    let host = unique("host");

    let first = create_accelerator(&accelerators, &project).await;
    let second = create_accelerator(&accelerators, &project).await;
    let a = create_deployable(&deployables, &first, &host, "0000:81:00.1").await;
    let b = create_deployable(&deployables, &first, &host, "0000:81:00.0").await;
    let c = create_deployable(&deployables, &second, &unique("host"), "0000:82:00.0").await;

    let on_host = deployables.find_by_host(&host).await.unwrap();
    let addresses: Vec<&str> = on_host.iter().map(|d| d.pcie_address.as_str()).collect();
    assert_eq!(addresses, vec!["0000:81:00.0", "0000:81:00.1"]);

    let of_first = deployables.find_by_accelerator(first.id).await.unwrap();
    let mut ids: Vec<_> = of_first.iter().map(|d| d.id).collect();
    ids.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(ids, expected);

    let of_second = deployables.find_by_accelerator(second.id).await.unwrap();
    assert_eq!(of_second.len(), 1);
    assert_eq!(of_second[0].id, c.id);

    assert!(deployables.find_by_host(&unique("host")).await.unwrap().is_empty());
    assert!(deployables.find_all().await.unwrap().iter().any(|d| d.id == c.id));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_binding_deployable_counts_toward_usage() {
    let database = database().await;
    let pool = database.pool().clone();
    let accelerators = AcceleratorRepository::new(pool.clone());
    let deployables = DeployableRepository::new(pool);
    let project = unique("project");

    let accelerator = create_accelerator(&accelerators, &project).await;
    let deployable = create_deployable(&deployables, &accelerator, &unique("host"), "0000:81:00.0").await;
    assert!(!deployable.is_allocated());
    assert_eq!(accelerators.count_in_use(&project, "deployables").await.unwrap(), 0);
    assert_eq!(accelerators.count_in_use(&project, "accelerators").await.unwrap(), 1);
    assert_eq!(accelerators.count_in_use(&project, "fpga").await.unwrap(), 1);

    let instance = Uuid::now_v7();
    let bound = deployables
        .update(
            deployable.id,
            &UpdateDeployable {
                instance_id: Some(Some(instance)),
                availability: Some("claimed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("deployable exists");
    assert_eq!(bound.instance_id, Some(instance));
    assert_eq!(bound.availability, "claimed");
    assert_eq!(bound.version, "1.0");
    assert_eq!(accelerators.count_in_use(&project, "deployables").await.unwrap(), 1);

    let renamed = deployables
        .update(
            deployable.id,
            &UpdateDeployable {
                version: Some("2.0".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("deployable exists");
    assert_eq!(renamed.instance_id, Some(instance));
    assert_eq!(renamed.version, "2.0");

    let released = deployables
        .update(
            deployable.id,
            &UpdateDeployable {
                instance_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("deployable exists");
    assert!(!released.is_allocated());
    assert_eq!(accelerators.count_in_use(&project, "deployables").await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_attribute_lookup_update_and_delete() {
    let database = database().await;
    let pool = database.pool().clone();
    let accelerators = AcceleratorRepository::new(pool.clone());
    let deployables = DeployableRepository::new(pool.clone());
    let attributes = AttributeRepository::new(pool);

    let accelerator = create_accelerator(&accelerators, &unique("project")).await;
    let deployable = create_deployable(&deployables, &accelerator, &unique("host"), "0000:81:00.0").await;

    let region = attributes
        .create(&CreateAttribute {
            deployable_id: deployable.id,
            key: "region".into(),
            value: "0".into(),
        })
        .await
        .unwrap();
    attributes
        .create(&CreateAttribute {
            deployable_id: deployable.id,
            key: "function".into(),
            value: "crypto".into(),
        })
        .await
        .unwrap();

    let found = attributes.find_by_key(deployable.id, "region").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, region.id);
    assert!(attributes.find_by_key(deployable.id, "missing").await.unwrap().is_empty());

    let keys: Vec<String> = attributes
        .find_by_deployable(deployable.id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.key)
        .collect();
    assert_eq!(keys, vec!["function", "region"]);

    let updated = attributes
        .update(region.id, "region", "1")
        .await
        .unwrap()
        .expect("attribute exists");
    assert_eq!(updated.value, "1");
    assert_eq!(
        attributes.find_by_id(region.id).await.unwrap().unwrap().value,
        "1"
    );

    assert!(attributes.delete(region.id).await.unwrap());
    assert!(!attributes.delete(region.id).await.unwrap());
    assert!(attributes.find_by_id(region.id).await.unwrap().is_none());
    assert!(attributes.update(region.id, "region", "2").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deleting_accelerator_cascades_to_records() {
    let database = database().await;
    let pool = database.pool().clone();
    let accelerators = AcceleratorRepository::new(pool.clone());
    let deployables = DeployableRepository::new(pool.clone());
    let attributes = AttributeRepository::new(pool);
    let project = unique("project");

    let accelerator = create_accelerator(&accelerators, &project).await;
    let deployable = create_deployable(&deployables, &accelerator, &unique("host"), "0000:81:00.0").await;
    let attribute = attributes
        .create(&CreateAttribute {
            deployable_id: deployable.id,
            key: "region".into(),
            value: "0".into(),
        })
        .await
        .unwrap();

    let updated = accelerators
        .update(
            accelerator.id,
            &UpdateAccelerator {
                description: Some("reflashed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("accelerator exists");
    assert_eq!(updated.description.as_deref(), Some("reflashed"));
    assert_eq!(updated.name, "fpga0");

    assert!(accelerators.delete(accelerator.id).await.unwrap());
    assert!(accelerators.find_by_id(accelerator.id).await.unwrap().is_none());
    assert!(deployables.find_by_id(deployable.id).await.unwrap().is_none());
    assert!(attributes.find_by_id(attribute.id).await.unwrap().is_none());
    assert!(accelerators.find_all(Some(&project)).await.unwrap().is_empty());

    assert!(!accelerators.delete(accelerator.id).await.unwrap());
    assert!(
        accelerators
            .update(accelerator.id, &UpdateAccelerator::default())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deleting_deployable_cascades_to_attributes() {
    let database = database().await;
    let pool = database.pool().clone();
    let accelerators = AcceleratorRepository::new(pool.clone());
    let deployables = DeployableRepository::new(pool.clone());
    let attributes = AttributeRepository::new(pool);

    let accelerator = create_accelerator(&accelerators, &unique("project")).await;
    let deployable = create_deployable(&deployables, &accelerator, &unique("host"), "0000:81:00.0").await;
    let attribute = attributes
        .create(&CreateAttribute {
            deployable_id: deployable.id,
            key: "region".into(),
            value: "0".into(),
        })
        .await
        .unwrap();

    assert!(deployables.delete(deployable.id).await.unwrap());
    assert!(!deployables.delete(deployable.id).await.unwrap());
    assert!(attributes.find_by_id(attribute.id).await.unwrap().is_none());
    assert!(accelerators.find_by_id(accelerator.id).await.unwrap().is_some());
    assert!(deployables.find_by_accelerator(accelerator.id).await.unwrap().is_empty());
}
