use mongodb::{
    bson::doc,
    options::IndexOptions,
    Client, Database, IndexModel,
};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::models::{
    book::BOOKS_COLLECTION, library::LIBRARIES_COLLECTION,
    notification::NOTIFICATIONS_COLLECTION, password_reset::PASSWORD_RESETS_COLLECTION,
    payment::PAYMENTS_COLLECTION, user::USERS_COLLECTION,
};

pub async fn get_db_client(config: &AppConfig) -> Result<Database> {
    let client = Client::with_uri_str(&config.database_url).await?;
    let db = client.database(&config.database_name);

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("✅ Connected to database: {}", config.database_name);
            tracing::debug!("📂 Collections found: {:?}", collections);
        }
        Err(e) => {
            tracing::error!(
                "❌ Database '{}' may not exist or is inaccessible: {}",
                config.database_name,
                e
            );
        }
    }

    Ok(db)
}

fn unique(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn plain(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

/// Creates the indexes the handlers rely on. Safe to run on every start.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let users = db.collection::<mongodb::bson::Document>(USERS_COLLECTION);
    users.create_index(unique(doc! { "email": 1 })).await?;
    users
        .create_index(
            IndexModel::builder()
                .keys(doc! { "phone": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "phone": { "$type": "string" } })
                        .build(),
                )
                .build(),
        )
        .await?;
    users.create_index(plain(doc! { "library_id": 1, "role": 1 })).await?;

    let resets = db.collection::<mongodb::bson::Document>(PASSWORD_RESETS_COLLECTION);
    resets.create_index(unique(doc! { "email": 1 })).await?;
    resets.create_index(unique(doc! { "token": 1 })).await?;

    db.collection::<mongodb::bson::Document>(LIBRARIES_COLLECTION)
        .create_index(plain(doc! { "owner_id": 1 }))
        .await?;
    db.collection::<mongodb::bson::Document>(BOOKS_COLLECTION)
        .create_index(plain(doc! { "library_id": 1, "created_at": -1 }))
        .await?;
    db.collection::<mongodb::bson::Document>(PAYMENTS_COLLECTION)
        .create_index(plain(doc! { "library_id": 1, "student_id": 1, "created_at": -1 }))
        .await?;
    db.collection::<mongodb::bson::Document>(NOTIFICATIONS_COLLECTION)
        .create_index(plain(doc! { "library_id": 1, "created_at": -1 }))
        .await?;

    tracing::info!("📇 Database indexes ensured");
    Ok(())
}
