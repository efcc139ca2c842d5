//! Schema bootstrap.
//!
//! Derives table definitions from the entities and applies them with
//! `IF NOT EXISTS`. Used at startup when `auto_migrate` is on
//! (development, SQLite) and by the test harness; production Postgres
//! schemas are managed by the ops migration pipeline.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};
use tracing::info;

use crate::entities::{booking, offering};

pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut offerings = schema.create_table_from_entity(offering::Entity);
    offerings.if_not_exists();
    db.execute(backend.build(&offerings)).await?;

    let mut bookings = schema.create_table_from_entity(booking::Entity);
    bookings.if_not_exists();
    db.execute(backend.build(&bookings)).await?;

    info!("schema migrations applied");
    Ok(())
}
