use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("jobwire_db")]
pub struct JobwireDb(sqlx::PgPool);
