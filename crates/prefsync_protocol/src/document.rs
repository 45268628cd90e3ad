//! Wire documents.
//!
//! JSON bodies exchanged with the store and the client-facing shapes built
//! from them. Conversions are lossless except for revision timestamps,
//! which the wire carries in whole seconds and clients consume in
//! milliseconds.

use crate::error::{ProtocolError, ProtocolResult};
use crate::refs::ResourceRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latest state advertised by the store for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Server session the data set belongs to.
    pub session: String,
    /// Latest ref per resource name.
    pub latest: BTreeMap<String, ResourceRef>,
    /// Version of the manifest itself, carried by the `ETag` header.
    pub reference: ResourceRef,
}

/// Body of a manifest response. The manifest's own ref travels in the
/// `ETag` header, not in the body.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestDocument {
    session: String,
    #[serde(default)]
    latest: BTreeMap<String, ResourceRef>,
}

impl Manifest {
    /// Parses a manifest body, attaching the ref carried out of band.
    pub fn parse(body: &[u8], reference: ResourceRef) -> ProtocolResult<Self> {
        let document: ManifestDocument = serde_json::from_slice(body)
            .map_err(|source| ProtocolError::document("manifest", source))?;
        Ok(Manifest {
            session: document.session,
            latest: document.latest,
            reference,
        })
    }

    /// Serializes the manifest body.
    pub fn to_body(&self) -> ProtocolResult<Vec<u8>> {
        let document = ManifestDocument {
            session: self.session.clone(),
            latest: self.latest.clone(),
        };
        serde_json::to_vec(&document).map_err(|source| ProtocolError::document("manifest", source))
    }
}

/// A resource read result: content and the ref it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    /// Version token the content was read at.
    pub reference: ResourceRef,
    /// Content text, `None` when the server holds no content.
    pub content: Option<String>,
}

impl UserData {
    /// Creates a read result.
    pub fn new(reference: ResourceRef, content: Option<String>) -> Self {
        UserData { reference, content }
    }
}

/// One revision in a history listing, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    /// Version token of this revision.
    #[serde(rename = "ref")]
    pub reference: ResourceRef,
    /// Creation time in whole seconds since the Unix epoch.
    pub created: u64,
}

impl RevisionEntry {
    /// Parses a revision listing body.
    pub fn parse_list(body: &[u8]) -> ProtocolResult<Vec<RevisionEntry>> {
        serde_json::from_slice(body)
            .map_err(|source| ProtocolError::document("revision listing", source))
    }

    /// Serializes a revision listing body.
    pub fn list_body(entries: &[RevisionEntry]) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(entries)
            .map_err(|source| ProtocolError::document("revision listing", source))
    }
}

/// One revision of a resource as consumed by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRevision {
    /// Version token of this revision.
    pub reference: ResourceRef,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_ms: u64,
}

impl From<RevisionEntry> for ResourceRevision {
    fn from(entry: RevisionEntry) -> Self {
        ResourceRevision {
            reference: entry.reference,
            created_ms: entry.created.saturating_mul(1000),
        }
    }
}

/// One collection in a collection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Server-assigned collection id.
    pub id: String,
}

impl CollectionInfo {
    /// Parses a collection listing body.
    pub fn parse_list(body: &[u8]) -> ProtocolResult<Vec<CollectionInfo>> {
        serde_json::from_slice(body)
            .map_err(|source| ProtocolError::document("collection listing", source))
    }

    /// Serializes a collection listing body.
    pub fn list_body(entries: &[CollectionInfo]) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(entries)
            .map_err(|source| ProtocolError::document("collection listing", source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_session_and_latest() {
        let body = br#"{"session":"s-1","latest":{"settings":"3","keybindings":"1"}}"#;
        let manifest = Manifest::parse(body, ResourceRef::new("9")).unwrap();
        assert_eq!(manifest.session, "s-1");
        assert_eq!(manifest.reference, ResourceRef::new("9"));
        assert_eq!(manifest.latest.len(), 2);
        assert_eq!(manifest.latest["settings"], ResourceRef::new("3"));
    }

    #[test]
    fn manifest_latest_defaults_to_empty() {
        let manifest = Manifest::parse(br#"{"session":"s-1"}"#, ResourceRef::new("0")).unwrap();
        assert!(manifest.latest.is_empty());
    }

    #[test]
    fn manifest_without_session_is_rejected() {
        let err = Manifest::parse(br#"{"latest":{}}"#, ResourceRef::new("0")).unwrap_err();
        assert!(err.to_string().contains("manifest"));
    }

    #[test]
    fn manifest_body_round_trips() {
        let mut latest = BTreeMap::new();
        latest.insert("settings".to_owned(), ResourceRef::new("4"));
        let manifest = Manifest {
            session: "s-2".to_owned(),
            latest,
            reference: ResourceRef::new("11"),
        };
        let body = manifest.to_body().unwrap();
        let back = Manifest::parse(&body, ResourceRef::new("11")).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn revision_timestamps_convert_to_milliseconds() {
        let body = br#"[{"ref":"2","created":1700000000},{"ref":"1","created":1699999999}]"#;
        let entries = RevisionEntry::parse_list(body).unwrap();
        let revisions: Vec<ResourceRevision> =
            entries.into_iter().map(ResourceRevision::from).collect();
        assert_eq!(revisions[0].created_ms, 1_700_000_000_000);
        assert_eq!(revisions[1].reference, ResourceRef::new("1"));
    }

    #[test]
    fn collection_listing_round_trips() {
        let collections = vec![
            CollectionInfo { id: "1".to_owned() },
            CollectionInfo { id: "2".to_owned() },
        ];
        let body = CollectionInfo::list_body(&collections).unwrap();
        assert_eq!(CollectionInfo::parse_list(&body).unwrap(), collections);
    }
}
