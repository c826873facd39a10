use std::sync::OnceLock;

use mongodb::{Client, Database};

static DB: OnceLock<Database> = OnceLock::new();

pub async fn connect(uri: String) {
    let client = Client::with_uri_str(uri)
        .await
        .expect("Failed to connect to database");
    DB.set(client.database("safework")).ok();
}

pub fn get_db() -> Database {
    DB.get().expect("Database is not available yet!").clone()
}
