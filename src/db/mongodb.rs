use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Cursor, Database};
use serde::de::DeserializeOwned;

use super::models::Counter;
use crate::booking::credentials::{password_digest, password_matches};
use crate::booking::store::{with_timeout, CredentialVerifier, IntervalStore, ReservationStore};
use crate::booking::{
    current_timestamp, format_date, BookingError, BookingResult, GuestDetails, NewReservation,
    NewRestriction, Reservation, ReservationId, RestrictionId, Room, RoomId, RoomRestriction,
    StayRange, User, UserId,
};
use crate::config::AppConfig;

/// Convierte errores del driver en `StorageUnavailable` con la operación
fn storage(operation: &'static str) -> impl Fn(mongodb::error::Error) -> BookingError {
    move |e| BookingError::storage(operation, e)
}

async fn collect<T>(mut cursor: Cursor<T>, operation: &'static str) -> BookingResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut results = Vec::new();
    while cursor.advance().await.map_err(storage(operation))? {
        results.push(cursor.deserialize_current().map_err(storage(operation))?);
    }
    Ok(results)
}

fn bson_to_id(value: &Bson) -> Option<i64> {
    value.as_i64().or_else(|| value.as_i32().map(i64::from))
}

#[derive(Debug, Clone)]
pub struct MongoRepo {
    pub client: Client,
    pub database: Database,
    timeout: Duration,
}

impl MongoRepo {
    pub async fn init(config: &AppConfig) -> BookingResult<MongoRepo> {
        let client = Client::with_uri_str(&config.mongodb_uri)
            .await
            .map_err(storage("connect"))?;

        let database = client.database(&config.mongodb_database);

        // Test connection
        with_timeout(config.storage_timeout, "ping", async {
            database
                .run_command(doc! {"ping": 1})
                .await
                .map_err(storage("ping"))
        })
        .await?;

        tracing::info!(database = %config.mongodb_database, "Conexión a MongoDB establecida exitosamente");

        Ok(MongoRepo {
            client,
            database,
            timeout: config.storage_timeout,
        })
    }

    pub fn rooms(&self) -> Collection<Room> {
        self.database.collection("rooms")
    }

    pub fn reservations(&self) -> Collection<Reservation> {
        self.database.collection("reservations")
    }

    pub fn restrictions(&self) -> Collection<RoomRestriction> {
        self.database.collection("room_restrictions")
    }

    pub fn users(&self) -> Collection<User> {
        self.database.collection("users")
    }

    fn counters(&self) -> Collection<Counter> {
        self.database.collection("counters")
    }

    /// Siguiente id entero de la secuencia `name`
    async fn next_id(&self, name: &str) -> BookingResult<i64> {
        let counter = self
            .counters()
            .find_one_and_update(doc! { "_id": name }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(storage("next_id"))?;

        counter
            .map(|c| c.seq)
            .ok_or_else(|| BookingError::storage("next_id", format!("secuencia '{}' sin valor", name)))
    }

    pub async fn create_indexes(&self) -> BookingResult<()> {
        use mongodb::{options::IndexOptions, IndexModel};

        self.rooms()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "room_name": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(storage("create_indexes_rooms"))?;

        let restriction_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "room_id": 1, "start_date": 1, "end_date": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "reservation_id": 1 })
                .build(),
        ];
        self.restrictions()
            .create_indexes(restriction_indexes)
            .await
            .map_err(storage("create_indexes_restrictions"))?;

        let reservation_indexes = vec![
            IndexModel::builder().keys(doc! { "start_date": 1 }).build(),
            IndexModel::builder().keys(doc! { "processed": 1 }).build(),
        ];
        self.reservations()
            .create_indexes(reservation_indexes)
            .await
            .map_err(storage("create_indexes_reservations"))?;

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(storage("create_indexes_users"))?;

        tracing::info!("Índices MongoDB creados exitosamente");
        Ok(())
    }

    /// Crea las habitaciones iniciales si la colección está vacía
    pub async fn seed_rooms(&self, names: &[&str]) -> BookingResult<()> {
        let existing = self
            .rooms()
            .count_documents(doc! {})
            .await
            .map_err(storage("seed_rooms"))?;
        if existing > 0 {
            return Ok(());
        }

        for name in names {
            let now = current_timestamp();
            let room = Room {
                id: self.next_id("rooms").await?,
                room_name: name.to_string(),
                created_at: now,
                updated_at: now,
            };
            self.rooms().insert_one(room).await.map_err(storage("seed_rooms"))?;
        }
        tracing::info!(rooms = names.len(), "Habitaciones iniciales creadas");
        Ok(())
    }

    /// Da de alta al usuario administrador si no existe
    pub async fn ensure_admin(&self, email: &str, password: &str) -> BookingResult<()> {
        let existing = self
            .users()
            .find_one(doc! { "email": email })
            .await
            .map_err(storage("ensure_admin"))?;
        if existing.is_some() {
            return Ok(());
        }

        let user = User {
            id: self.next_id("users").await?,
            first_name: "Admin".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            password_hash: password_digest(password),
            access_level: 3,
        };
        self.users().insert_one(user).await.map_err(storage("ensure_admin"))?;
        tracing::info!(email = %email, "Usuario administrador creado");
        Ok(())
    }

    /// Filtro de solapamiento semiabierto sobre fechas `YYYY-MM-DD`
    fn overlap_filter(range: &StayRange) -> Document {
        doc! {
            "end_date": { "$gt": format_date(range.start()) },
            "start_date": { "$lt": format_date(range.end()) },
        }
    }

    async fn with_room(&self, mut reservation: Reservation) -> BookingResult<Reservation> {
        reservation.room = self
            .rooms()
            .find_one(doc! { "_id": reservation.room_id })
            .await
            .map_err(storage("reservation_room"))?;
        Ok(reservation)
    }

    async fn find_reservations(&self, filter: Document, operation: &'static str) -> BookingResult<Vec<Reservation>> {
        let cursor = self
            .reservations()
            .find(filter)
            .sort(doc! { "start_date": 1 })
            .await
            .map_err(storage(operation))?;
        let found = collect(cursor, operation).await?;

        let mut results = Vec::with_capacity(found.len());
        for reservation in found {
            results.push(self.with_room(reservation).await?);
        }
        Ok(results)
    }
}

#[async_trait]
impl IntervalStore for MongoRepo {
    async fn find_overlapping(&self, room_id: RoomId, range: &StayRange) -> BookingResult<u64> {
        with_timeout(self.timeout, "find_overlapping", async {
            let mut filter = Self::overlap_filter(range);
            filter.insert("room_id", room_id);
            self.restrictions()
                .count_documents(filter)
                .await
                .map_err(storage("find_overlapping"))
        })
        .await
    }

    async fn rooms_available(&self, range: &StayRange) -> BookingResult<BTreeSet<RoomId>> {
        with_timeout(self.timeout, "rooms_available", async {
            let busy = self
                .restrictions()
                .distinct("room_id", Self::overlap_filter(range))
                .await
                .map_err(storage("rooms_available"))?;
            let busy: Vec<i64> = busy.iter().filter_map(bson_to_id).collect();

            let cursor = self
                .rooms()
                .find(doc! { "_id": { "$nin": busy } })
                .await
                .map_err(storage("rooms_available"))?;
            let rooms = collect(cursor, "rooms_available").await?;
            Ok(rooms.into_iter().map(|r| r.id).collect())
        })
        .await
    }

    async fn restrictions_in_range(
        &self,
        room_id: RoomId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> BookingResult<Vec<RoomRestriction>> {
        with_timeout(self.timeout, "restrictions_in_range", async {
            let cursor = self
                .restrictions()
                .find(doc! {
                    "room_id": room_id,
                    "end_date": { "$gt": format_date(first) },
                    "start_date": { "$lte": format_date(last) },
                })
                .await
                .map_err(storage("restrictions_in_range"))?;
            collect(cursor, "restrictions_in_range").await
        })
        .await
    }

    async fn insert(&self, restriction: NewRestriction) -> BookingResult<RestrictionId> {
        with_timeout(self.timeout, "insert_restriction", async {
            let id = self.next_id("room_restrictions").await?;
            let record = restriction.into_restriction(id, current_timestamp());
            self.restrictions()
                .insert_one(record)
                .await
                .map_err(storage("insert_restriction"))?;
            Ok(id)
        })
        .await
    }

    async fn delete_by_id(&self, id: RestrictionId) -> BookingResult<bool> {
        with_timeout(self.timeout, "delete_restriction", async {
            let result = self
                .restrictions()
                .delete_one(doc! { "_id": id })
                .await
                .map_err(storage("delete_restriction"))?;
            Ok(result.deleted_count > 0)
        })
        .await
    }

    async fn all_rooms(&self) -> BookingResult<Vec<Room>> {
        with_timeout(self.timeout, "all_rooms", async {
            let cursor = self
                .rooms()
                .find(doc! {})
                .sort(doc! { "room_name": 1 })
                .await
                .map_err(storage("all_rooms"))?;
            collect(cursor, "all_rooms").await
        })
        .await
    }

    async fn room_by_id(&self, id: RoomId) -> BookingResult<Room> {
        with_timeout(self.timeout, "room_by_id", async {
            self.rooms()
                .find_one(doc! { "_id": id })
                .await
                .map_err(storage("room_by_id"))?
                .ok_or(BookingError::RoomNotFound(id))
        })
        .await
    }
}

#[async_trait]
impl ReservationStore for MongoRepo {
    async fn insert_reservation(&self, reservation: NewReservation) -> BookingResult<ReservationId> {
        with_timeout(self.timeout, "insert_reservation", async {
            let id = self.next_id("reservations").await?;
            let record = reservation.into_reservation(id, current_timestamp());
            self.reservations()
                .insert_one(record)
                .await
                .map_err(storage("insert_reservation"))?;
            Ok(id)
        })
        .await
    }

    async fn reservation_by_id(&self, id: ReservationId) -> BookingResult<Reservation> {
        with_timeout(self.timeout, "reservation_by_id", async {
            let reservation = self
                .reservations()
                .find_one(doc! { "_id": id })
                .await
                .map_err(storage("reservation_by_id"))?
                .ok_or(BookingError::ReservationNotFound(id))?;
            self.with_room(reservation).await
        })
        .await
    }

    async fn all_reservations(&self) -> BookingResult<Vec<Reservation>> {
        with_timeout(
            self.timeout,
            "all_reservations",
            self.find_reservations(doc! {}, "all_reservations"),
        )
        .await
    }

    async fn new_reservations(&self) -> BookingResult<Vec<Reservation>> {
        with_timeout(
            self.timeout,
            "new_reservations",
            self.find_reservations(doc! { "processed": false }, "new_reservations"),
        )
        .await
    }

    async fn update_guest(&self, id: ReservationId, guest: &GuestDetails) -> BookingResult<()> {
        with_timeout(self.timeout, "update_guest", async {
            let result = self
                .reservations()
                .update_one(
                    doc! { "_id": id },
                    doc! {
                        "$set": {
                            "first_name": guest.first_name.as_str(),
                            "last_name": guest.last_name.as_str(),
                            "email": guest.email.as_str(),
                            "phone": guest.phone.as_str(),
                            "updated_at": current_timestamp(),
                        }
                    },
                )
                .await
                .map_err(storage("update_guest"))?;

            if result.matched_count == 0 {
                return Err(BookingError::ReservationNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn set_processed(&self, id: ReservationId, processed: bool) -> BookingResult<()> {
        with_timeout(self.timeout, "set_processed", async {
            let result = self
                .reservations()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$set": { "processed": processed, "updated_at": current_timestamp() } },
                )
                .await
                .map_err(storage("set_processed"))?;

            if result.matched_count == 0 {
                return Err(BookingError::ReservationNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_reservation(&self, id: ReservationId) -> BookingResult<()> {
        with_timeout(self.timeout, "delete_reservation", async {
            let result = self
                .reservations()
                .delete_one(doc! { "_id": id })
                .await
                .map_err(storage("delete_reservation"))?;
            if result.deleted_count == 0 {
                return Err(BookingError::ReservationNotFound(id));
            }

            self.restrictions()
                .delete_many(doc! { "reservation_id": id })
                .await
                .map_err(storage("delete_reservation_restrictions"))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CredentialVerifier for MongoRepo {
    async fn authenticate(&self, email: &str, password: &str) -> BookingResult<UserId> {
        let user = with_timeout(self.timeout, "authenticate", async {
            self.users()
                .find_one(doc! { "email": email })
                .await
                .map_err(storage("authenticate"))
        })
        .await?;

        match user {
            Some(user) if password_matches(&user, password) => Ok(user.id),
            _ => Err(BookingError::InvalidCredentials),
        }
    }
}
