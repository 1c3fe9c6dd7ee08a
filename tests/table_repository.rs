//! Table repository against an in-process fake of the table REST API.
//!
//! The fake keeps entities in memory, checks that requests carry a
//! SharedKeyLite header, understands `<Property> eq '<value>'` filters and
//! pages query results two at a time so continuation handling is exercised.
//! Deletes of chosen keys can be made to fail with a 500.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use truck_service::config::TableStorageConfig;
use truck_service::models::{Truck, TruckPatch, TruckStatus};
use truck_service::repositories::{TableTruckRepository, TruckRepository};
use truck_service::utils::errors::StoreError;

const ACCOUNT: &str = "devstoreaccount1";
const PAGE_SIZE: usize = 2;

type Tables = HashMap<String, BTreeMap<(String, String), Value>>;
type EntityRef = (String, String, String);

#[derive(Clone, Default)]
struct FakeTableService {
    tables: Arc<Mutex<Tables>>,
    failing_deletes: Arc<Mutex<Vec<EntityRef>>>,
}

impl FakeTableService {
    fn entities(&self, table: &str) -> Vec<Value> {
        self.tables.lock().unwrap()[table].values().cloned().collect()
    }

    fn fail_delete(&self, table: &str, partition_key: &str, row_key: &str) {
        self.failing_deletes.lock().unwrap().push((
            table.to_string(),
            partition_key.to_string(),
            row_key.to_string(),
        ));
    }
}

async fn handle(
    State(service): State<FakeTableService>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with(&format!("SharedKeyLite {}:", ACCOUNT)))
        .unwrap_or(false);
    if !authorized || headers.get("x-ms-date").is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let path = urlencoding::decode(uri.path()).unwrap().into_owned();
    let resource = path
        .strip_prefix(&format!("/{}/", ACCOUNT))
        .unwrap_or_default()
        .to_string();
    let mut tables = service.tables.lock().unwrap();

    if resource == "Tables" && method == Method::POST {
        let request: Value = serde_json::from_slice(&body).unwrap();
        let name = request["TableName"].as_str().unwrap().to_string();
        if tables.contains_key(&name) {
            return StatusCode::CONFLICT.into_response();
        }
        tables.insert(name, BTreeMap::new());
        return StatusCode::NO_CONTENT.into_response();
    }

    let (table, keys) = match resource.split_once('(') {
        Some((table, rest)) => (table.to_string(), Some(rest.trim_end_matches(')').to_string())),
        None => (resource.clone(), None),
    };
    let Some(rows) = tables.get_mut(&table) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match (method, keys.as_deref()) {
        (Method::POST, None) => {
            let entity: Value = serde_json::from_slice(&body).unwrap();
            let key = entity_key(&entity);
            if rows.contains_key(&key) {
                return StatusCode::CONFLICT.into_response();
            }
            rows.insert(key, entity);
            StatusCode::NO_CONTENT.into_response()
        }
        (Method::GET, Some("")) => query(rows, uri.query().unwrap_or_default()),
        (method, Some(keys)) => {
            let key = parse_keys(keys);
            let must_exist = headers.get("if-match") == Some(&HeaderValue::from_static("*"));
            match method {
                Method::GET => match rows.get(&key) {
                    Some(entity) => Json(entity.clone()).into_response(),
                    None => StatusCode::NOT_FOUND.into_response(),
                },
                Method::PUT => {
                    if must_exist && !rows.contains_key(&key) {
                        return StatusCode::NOT_FOUND.into_response();
                    }
                    let mut entity: Value = serde_json::from_slice(&body).unwrap();
                    entity["PartitionKey"] = json!(key.0);
                    entity["RowKey"] = json!(key.1);
                    rows.insert(key, entity);
                    StatusCode::NO_CONTENT.into_response()
                }
                Method::DELETE if service.failing_deletes.lock().unwrap().contains(&(
                    table.clone(),
                    key.0.clone(),
                    key.1.clone(),
                )) =>
                {
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
                Method::DELETE => match rows.remove(&key) {
                    Some(_) => StatusCode::NO_CONTENT.into_response(),
                    None => StatusCode::NOT_FOUND.into_response(),
                },
                _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
            }
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn entity_key(entity: &Value) -> (String, String) {
    (
        entity["PartitionKey"].as_str().unwrap().to_string(),
        entity["RowKey"].as_str().unwrap().to_string(),
    )
}

/// `PartitionKey='a',RowKey='b'` with OData quote escaping
fn parse_keys(keys: &str) -> (String, String) {
    let rest = keys.strip_prefix("PartitionKey='").unwrap();
    let (partition, rest) = rest.split_once("',RowKey='").unwrap();
    let row = rest.strip_suffix('\'').unwrap();
    (partition.replace("''", "'"), row.replace("''", "'"))
}

fn query(rows: &BTreeMap<(String, String), Value>, raw_query: &str) -> Response {
    let params: HashMap<String, String> = raw_query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.to_string(), urlencoding::decode(v).unwrap().into_owned()))
        .collect();

    let filter = params.get("$filter").map(|f| {
        let (property, value) = f.split_once(" eq ").unwrap();
        let value = value.trim_matches('\'').replace("''", "'");
        (property.to_string(), value)
    });
    let start = params.get("NextPartitionKey").map(|pk| {
        (pk.clone(), params.get("NextRowKey").cloned().unwrap_or_default())
    });

    let matching: Vec<(&(String, String), &Value)> = rows
        .iter()
        .filter(|(key, _)| start.as_ref().map_or(true, |start| *key >= start))
        .filter(|(_, entity)| {
            filter.as_ref().map_or(true, |(property, value)| {
                entity[property.as_str()].as_str() == Some(value.as_str())
            })
        })
        .collect();

    let page: Vec<Value> = matching.iter().take(PAGE_SIZE).map(|(_, v)| (*v).clone()).collect();
    let mut response = Json(json!({ "value": page })).into_response();
    if let Some((next_key, _)) = matching.get(PAGE_SIZE) {
        let headers = response.headers_mut();
        headers.insert(
            "x-ms-continuation-nextpartitionkey",
            HeaderValue::from_str(&next_key.0).unwrap(),
        );
        headers.insert(
            "x-ms-continuation-nextrowkey",
            HeaderValue::from_str(&next_key.1).unwrap(),
        );
    }
    response
}

async fn start_fake() -> (TableTruckRepository, FakeTableService) {
    let service = FakeTableService::default();
    let app = Router::new().fallback(handle).with_state(service.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let repository = TableTruckRepository::new(&TableStorageConfig {
        account_name: ACCOUNT.to_string(),
        account_key: "dGVzdC1rZXk=".to_string(),
        endpoint: format!("http://{}/{}", addr, ACCOUNT),
        truck_table: "trucks".to_string(),
        availability_table: "truckavailability".to_string(),
        index_table: "truckplates".to_string(),
    })
    .unwrap();
    repository.ensure_tables().await.unwrap();
    // idempotent
    repository.ensure_tables().await.unwrap();

    (repository, service)
}

fn king() -> Truck {
    Truck::new(
        "123-ABC",
        "King Karma",
        Some("Can carry 120 kg kebab meat".to_string()),
        Some("all good".to_string()),
    )
}

fn queen() -> Truck {
    Truck::new(
        "456-DEF",
        "Queen Karma",
        Some("Can carry 220 kg kebab meat".to_string()),
        Some("fix front right lights".to_string()),
    )
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, d).unwrap()
}

#[tokio::test]
async fn test_create_defaults_to_available_partition() {
    let (repo, fake) = start_fake().await;

    let created = repo.create(king()).await.unwrap();
    assert_eq!(created.status, Some(TruckStatus::Available));

    let stored = fake.entities("trucks");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["PartitionKey"], "available");
    assert_eq!(stored[0]["RowKey"], "123-ABC");

    assert_eq!(repo.get("123-ABC").await.unwrap(), created);
}

#[tokio::test]
async fn test_lookup_does_not_assume_available_partition() {
    let (repo, _fake) = start_fake().await;
    repo.create(queen().with_status(TruckStatus::Maintenance))
        .await
        .unwrap();

    let truck = repo.get("456-DEF").await.unwrap();
    assert_eq!(truck.status, Some(TruckStatus::Maintenance));
    assert_eq!(truck.name, "Queen Karma");
}

#[tokio::test]
async fn test_duplicate_plate_across_partitions() {
    let (repo, fake) = start_fake().await;
    repo.create(king().with_status(TruckStatus::OnDuty)).await.unwrap();

    let err = repo.create(king()).await.unwrap_err();
    assert_eq!(err, StoreError::DuplicateKey("123-ABC".to_string()));
    assert_eq!(fake.entities("trucks").len(), 1);
}

#[tokio::test]
async fn test_update_status_moves_partition_and_keeps_fields() {
    let (repo, fake) = start_fake().await;
    repo.create(king()).await.unwrap();

    let updated = repo
        .update(
            "123-ABC",
            TruckPatch {
                status: Some(TruckStatus::OnDuty),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, Some(TruckStatus::OnDuty));
    assert_eq!(updated.description, king().description);

    let stored = fake.entities("trucks");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["PartitionKey"], "on_duty");
    assert_eq!(fake.entities("truckplates")[0]["status"], "on_duty");
    assert_eq!(repo.get("123-ABC").await.unwrap(), updated);
}

#[tokio::test]
async fn test_partial_update_in_place() {
    let (repo, _fake) = start_fake().await;
    repo.create(king()).await.unwrap();

    let updated = repo
        .update(
            "123-ABC",
            TruckPatch {
                note: Some("needs new tyres".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "King Karma");
    assert_eq!(updated.note.as_deref(), Some("needs new tyres"));
    assert_eq!(updated.status, Some(TruckStatus::Available));
}

#[tokio::test]
async fn test_missing_truck_is_not_found() {
    let (repo, _fake) = start_fake().await;

    assert!(matches!(repo.get("999-ZZZ").await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        repo.update("999-ZZZ", TruckPatch::default()).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(repo.delete("999-ZZZ").await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        repo.mark_busy("999-ZZZ", day(1)).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_follows_continuation() {
    let (repo, _fake) = start_fake().await;
    for i in 0..5 {
        repo.create(Truck::new(format!("{}00-XYZ", i), "Fleet", None, None))
            .await
            .unwrap();
    }

    assert_eq!(repo.list_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_availability_and_delete_cascade() {
    let (repo, fake) = start_fake().await;
    repo.create(king()).await.unwrap();
    repo.create(queen()).await.unwrap();

    repo.mark_busy("123-ABC", day(10)).await.unwrap();
    repo.mark_busy("123-ABC", day(10)).await.unwrap();
    repo.mark_busy("456-DEF", day(11)).await.unwrap();
    assert_eq!(fake.entities("truckavailability").len(), 2);

    let available = repo.get_availability(day(10)).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].plate_number, "456-DEF");

    assert_eq!(repo.get_availability(day(12)).await.unwrap().len(), 2);

    repo.clear_busy("456-DEF", day(11)).await.unwrap();
    assert!(matches!(
        repo.clear_busy("456-DEF", day(11)).await,
        Err(StoreError::NotFound(_))
    ));

    repo.delete("123-ABC").await.unwrap();
    assert!(fake.entities("truckavailability").is_empty());
    assert_eq!(fake.entities("truckplates").len(), 1);
    let remaining = repo.list_all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].plate_number, "456-DEF");

    // the plate is free again once deleted
    repo.create(king().with_status(TruckStatus::Maintenance))
        .await
        .unwrap();
    assert_eq!(
        repo.get("123-ABC").await.unwrap().status,
        Some(TruckStatus::Maintenance)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_claim_plate_once() {
    let (repo, fake) = start_fake().await;
    let repo = Arc::new(repo);
    let rounds = 30;

    for round in 0..rounds {
        let plate = format!("{:03}-RCE", round);
        let handles: Vec<_> = [TruckStatus::Available, TruckStatus::Maintenance]
            .into_iter()
            .map(|status| {
                let repo = repo.clone();
                let truck = Truck::new(plate.clone(), "Racer", None, None).with_status(status);
                tokio::spawn(async move { repo.create(truck).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert_eq!(err, StoreError::DuplicateKey(plate.clone())),
            }
        }
        assert_eq!(created, 1, "plate {} created {} times", plate, created);
    }

    assert_eq!(fake.entities("trucks").len(), rounds);
    assert_eq!(fake.entities("truckplates").len(), rounds);
}

#[tokio::test]
async fn test_failed_partition_move_is_undone() {
    let (repo, fake) = start_fake().await;
    repo.create(king()).await.unwrap();
    fake.fail_delete("trucks", "available", "123-ABC");

    let err = repo
        .update(
            "123-ABC",
            TruckPatch {
                status: Some(TruckStatus::OnDuty),
                name: Some("King Karma II".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));

    let stored = fake.entities("trucks");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["PartitionKey"], "available");
    assert_eq!(stored[0]["name"], "King Karma");

    let index = fake.entities("truckplates");
    assert_eq!(index.len(), 1);
    assert_eq!(index[0]["status"], "available");

    assert_eq!(
        repo.get("123-ABC").await.unwrap(),
        king().with_status(TruckStatus::Available)
    );
}
