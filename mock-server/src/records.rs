//! Owned records: items and projects share one shape and one set of rules.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{authenticate, failure, message, Db, Failure, Paging, Store, User};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub description: Option<String>,
    pub id: Uuid,
    pub owner_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Records {
    pub data: Vec<Record>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct CreateRecord {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateRecord {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Items,
    Projects,
}

impl Collection {
    fn records(self, store: &Store) -> &Vec<Record> {
        match self {
            Collection::Items => &store.items,
            Collection::Projects => &store.projects,
        }
    }

    fn records_mut(self, store: &mut Store) -> &mut Vec<Record> {
        match self {
            Collection::Items => &mut store.items,
            Collection::Projects => &mut store.projects,
        }
    }

    fn not_found(self) -> &'static str {
        match self {
            Collection::Items => "Item not found",
            Collection::Projects => "Project not found",
        }
    }

    fn deleted(self) -> &'static str {
        match self {
            Collection::Items => "Item deleted successfully",
            Collection::Projects => "Project deleted successfully",
        }
    }
}

/// Register the list/create and read/update/delete routes of `collection`
/// under `prefix`.
pub(crate) fn routes(router: Router<Db>, prefix: &str, collection: Collection) -> Router<Db> {
    router
        .route(
            &format!("{prefix}/"),
            get(
                move |State(db): State<Db>, headers: HeaderMap, Query(paging): Query<Paging>| {
                    list(db, headers, paging, collection)
                },
            )
            .post(
                move |State(db): State<Db>, headers: HeaderMap, Json(input): Json<CreateRecord>| {
                    create(db, headers, input, collection)
                },
            ),
        )
        .route(
            &format!("{prefix}/{{id}}"),
            get(move |State(db): State<Db>, headers: HeaderMap, Path(id): Path<Uuid>| {
                read(db, headers, id, collection)
            })
            .put(
                move |State(db): State<Db>,
                      headers: HeaderMap,
                      Path(id): Path<Uuid>,
                      Json(input): Json<UpdateRecord>| { update(db, headers, id, input, collection) },
            )
            .delete(move |State(db): State<Db>, headers: HeaderMap, Path(id): Path<Uuid>| {
                delete(db, headers, id, collection)
            }),
        )
}

fn owned<'a>(
    records: &'a mut [Record],
    user: &User,
    id: Uuid,
    collection: Collection,
) -> Result<&'a mut Record, Failure> {
    let record = records
        .iter_mut()
        .find(|record| record.id == id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, collection.not_found()))?;
    if !user.is_superuser && record.owner_id != user.id {
        return Err(failure(StatusCode::BAD_REQUEST, "Not enough permissions"));
    }
    Ok(record)
}

async fn list(db: Db, headers: HeaderMap, paging: Paging, collection: Collection) -> Result<Json<Records>, Failure> {
    let store = db.read().await;
    let user = authenticate(&store, &headers)?;
    let visible: Vec<&Record> = collection
        .records(&store)
        .iter()
        .filter(|record| user.is_superuser || record.owner_id == user.id)
        .collect();
    let data = visible
        .iter()
        .skip(paging.skip)
        .take(paging.limit)
        .map(|record| (*record).clone())
        .collect();
    Ok(Json(Records {
        data,
        count: visible.len(),
    }))
}

async fn create(db: Db, headers: HeaderMap, input: CreateRecord, collection: Collection) -> Result<Json<Record>, Failure> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let record = Record {
        title: input.title,
        description: input.description,
        id: Uuid::new_v4(),
        owner_id: user.id,
    };
    collection.records_mut(&mut store).push(record.clone());
    Ok(Json(record))
}

async fn read(db: Db, headers: HeaderMap, id: Uuid, collection: Collection) -> Result<Json<Record>, Failure> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    owned(collection.records_mut(&mut store), &user, id, collection).map(|record| Json(record.clone()))
}

async fn update(
    db: Db,
    headers: HeaderMap,
    id: Uuid,
    input: UpdateRecord,
    collection: Collection,
) -> Result<Json<Record>, Failure> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let record = owned(collection.records_mut(&mut store), &user, id, collection)?;
    if let Some(title) = input.title {
        record.title = title;
    }
    if let Some(description) = input.description {
        record.description = Some(description);
    }
    Ok(Json(record.clone()))
}

async fn delete(db: Db, headers: HeaderMap, id: Uuid, collection: Collection) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let records = collection.records_mut(&mut store);
    owned(records, &user, id, collection)?;
    records.retain(|record| record.id != id);
    Ok(message(collection.deleted()))
}
