//! MongoDB client and collection wrapper
//!
//! Typed collections with automatic index creation, soft-delete aware
//! queries and page/limit pagination. Unique indexes declared through
//! `IntoIndexes` are the authoritative uniqueness guard; service-level
//! checks are a fast path only.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::ClaustroError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// One page of a collection listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub data: Vec<T>,
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, ClaustroError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| ClaustroError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ClaustroError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, ClaustroError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, ClaustroError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), ClaustroError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| ClaustroError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, ClaustroError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| ClaustroError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ClaustroError::Database("Failed to get inserted ID".into()))
    }

    /// Find one non-deleted document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, ClaustroError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .find_one(full_filter)
            .await
            .map_err(|e| ClaustroError::Database(format!("Find failed: {}", e)))
    }

    /// Find one document regardless of its soft-delete state. Needed for
    /// restore and for uniqueness probes that must also see active rows.
    pub async fn find_one_any(&self, filter: Document) -> Result<Option<T>, ClaustroError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| ClaustroError::Database(format!("Find failed: {}", e)))
    }

    /// Find many non-deleted documents by filter
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, ClaustroError> {
        use futures_util::StreamExt;

        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let cursor = self
            .inner
            .find(full_filter)
            .await
            .map_err(|e| ClaustroError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Count non-deleted documents matching the filter
    pub async fn count(&self, filter: Document) -> Result<u64, ClaustroError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .count_documents(full_filter)
            .await
            .map_err(|e| ClaustroError::Database(format!("Count failed: {}", e)))
    }

    /// One page of non-deleted documents, newest first.
    pub async fn find_page(
        &self,
        filter: Document,
        page: u64,
        limit: u64,
    ) -> Result<Page<T>, ClaustroError> {
        use futures_util::StreamExt;

        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let total = self
            .inner
            .count_documents(full_filter.clone())
            .await
            .map_err(|e| ClaustroError::Database(format!("Count failed: {}", e)))?;

        let cursor = self
            .inner
            .find(full_filter)
            .sort(doc! { "metadata.created_at": -1 })
            .skip((page - 1) * limit)
            .limit(limit as i64)
            .await
            .map_err(|e| ClaustroError::Database(format!("Find failed: {}", e)))?;

        let data: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(Page {
            total,
            page,
            limit,
            data,
        })
    }

    /// Replace a document by id, bumping updated_at
    pub async fn replace_one(&self, id: ObjectId, mut item: T) -> Result<(), ClaustroError> {
        item.mut_metadata().updated_at = Some(DateTime::now());

        self.inner
            .replace_one(doc! { "_id": id }, item)
            .await
            .map_err(|e| ClaustroError::Database(format!("Replace failed: {}", e)))?;

        Ok(())
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, ClaustroError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| ClaustroError::Database(format!("Update failed: {}", e)))
    }

    /// Soft delete a document
    pub async fn soft_delete(&self, filter: Document) -> Result<UpdateResult, ClaustroError> {
        let update = doc! {
            "$set": {
                "metadata.is_deleted": true,
                "metadata.deleted_at": DateTime::now(),
                "metadata.updated_at": DateTime::now(),
            }
        };

        self.update_one(filter, update).await
    }

    /// Undo a soft delete, leaving all other fields as they were
    pub async fn restore(&self, filter: Document) -> Result<UpdateResult, ClaustroError> {
        let update = doc! {
            "$set": {
                "metadata.is_deleted": false,
                "metadata.updated_at": DateTime::now(),
            },
            "$unset": { "metadata.deleted_at": "" }
        };

        self.update_one(filter, update).await
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running MongoDB instance.
    // The lifecycle invariants that drive this wrapper are pinned in the
    // service-level unit tests against the pure decision functions.
}
