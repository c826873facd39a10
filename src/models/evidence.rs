use crate::database::get_db;
use crate::error::Error;
use futures::stream::StreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};
use serde::{Deserialize, Serialize};

/// Completion evidence attached to an assignment. Append-only: rows are
/// created by the assignee on completion or resubmission and never
/// mutated afterwards.
#[derive(Debug, Deserialize, Serialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub assignment_id: ObjectId,
    pub file_name: String,
    pub file_url: String,
    pub kind: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct EvidenceRef {
    pub file_name: String,
    pub file_url: String,
    pub kind: String,
}

impl Evidence {
    pub async fn save_many(
        assignment_id: &ObjectId,
        refs: &[EvidenceRef],
    ) -> Result<Vec<Evidence>, Error> {
        let db: Database = get_db();
        let collection: Collection<Evidence> = db.collection::<Evidence>("evidences");

        let evidence: Vec<Evidence> = refs
            .iter()
            .map(|entry| Evidence {
                _id: Some(ObjectId::new()),
                assignment_id: *assignment_id,
                file_name: entry.file_name.clone(),
                file_url: entry.file_url.clone(),
                kind: entry.kind.clone(),
            })
            .collect();

        if !evidence.is_empty() {
            collection
                .insert_many(&evidence, None)
                .await
                .map_err(|_| Error::PersistenceFailure("INSERTING_FAILED"))?;
        }

        Ok(evidence)
    }
    pub async fn find_by_assignment_id(assignment_id: &ObjectId) -> Result<Vec<Evidence>, Error> {
        let db: Database = get_db();
        let collection: Collection<Evidence> = db.collection::<Evidence>("evidences");

        let mut evidence: Vec<Evidence> = Vec::new();

        if let Ok(mut cursor) = collection
            .find(doc! { "assignment_id": assignment_id }, None)
            .await
        {
            while let Some(Ok(entry)) = cursor.next().await {
                evidence.push(entry);
            }
            Ok(evidence)
        } else {
            Err(Error::NotFound("EVIDENCE_NOT_FOUND"))
        }
    }
}
