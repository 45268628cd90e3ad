//! In-memory account state.

use prefsync_protocol::{CollectionInfo, Manifest, RevisionEntry};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// One stored version of a resource.
#[derive(Debug, Clone)]
pub(crate) struct StoredRevision {
    /// Server-assigned version token.
    pub reference: String,
    /// Content text as written.
    pub content: String,
    /// Creation time in whole seconds since the Unix epoch.
    pub created: u64,
}

type ResourceMap = BTreeMap<String, Vec<StoredRevision>>;

/// All data the server holds for the account.
///
/// Revisions are kept oldest first; the last entry of a resource's vector
/// is its latest version. Refs and collection ids come from counters that
/// survive wipes, so a token handed out before a wipe never matches data
/// written after it. The session id is minted on the first write after the
/// account was empty and dropped again when everything is deleted.
pub(crate) struct StoreState {
    session: Option<String>,
    next_ref: u64,
    next_collection: u64,
    version: u64,
    root: ResourceMap,
    collections: BTreeMap<String, ResourceMap>,
}

impl StoreState {
    pub(crate) fn new() -> Self {
        StoreState {
            session: None,
            next_ref: 1,
            next_collection: 1,
            version: 1,
            root: ResourceMap::new(),
            collections: BTreeMap::new(),
        }
    }

    pub(crate) fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Builds the manifest, `None` while the account holds no data set.
    pub(crate) fn manifest(&self) -> Option<Manifest> {
        let session = self.session.clone()?;
        let latest = self
            .root
            .iter()
            .filter_map(|(name, revisions)| {
                let revision = revisions.last()?;
                Some((name.clone(), revision.reference.as_str().into()))
            })
            .collect();
        Some(Manifest {
            session,
            latest,
            reference: self.version.to_string().into(),
        })
    }

    fn resources(&self, collection: Option<&str>) -> Option<&ResourceMap> {
        match collection {
            Some(id) => self.collections.get(id),
            None => Some(&self.root),
        }
    }

    fn resources_mut(&mut self, collection: Option<&str>) -> Option<&mut ResourceMap> {
        match collection {
            Some(id) => self.collections.get_mut(id),
            None => Some(&mut self.root),
        }
    }

    /// Whether the collection scope exists. The root scope always does.
    pub(crate) fn scope_exists(&self, collection: Option<&str>) -> bool {
        self.resources(collection).is_some()
    }

    pub(crate) fn latest(&self, collection: Option<&str>, resource: &str) -> Option<&StoredRevision> {
        self.resources(collection)?.get(resource)?.last()
    }

    /// Ref of the latest revision, `"0"` while the resource is absent.
    pub(crate) fn latest_ref(&self, collection: Option<&str>, resource: &str) -> String {
        self.latest(collection, resource)
            .map(|revision| revision.reference.clone())
            .unwrap_or_else(|| "0".to_owned())
    }

    /// Appends a revision, returning its ref. `None` for an unknown
    /// collection.
    pub(crate) fn write(
        &mut self,
        collection: Option<&str>,
        resource: &str,
        content: &str,
    ) -> Option<String> {
        if !self.scope_exists(collection) {
            return None;
        }
        if self.session.is_none() {
            self.session = Some(Uuid::new_v4().to_string());
        }
        let reference = self.next_ref.to_string();
        let revision = StoredRevision {
            reference: reference.clone(),
            content: content.to_owned(),
            created: unix_secs(),
        };
        let resources = self.resources_mut(collection)?;
        resources.entry(resource.to_owned()).or_default().push(revision);
        self.next_ref += 1;
        self.version += 1;
        Some(reference)
    }

    /// Lists revisions newest first. `None` for an unknown collection.
    pub(crate) fn revisions(
        &self,
        collection: Option<&str>,
        resource: &str,
    ) -> Option<Vec<RevisionEntry>> {
        let resources = self.resources(collection)?;
        let entries = resources
            .get(resource)
            .map(|revisions| {
                revisions
                    .iter()
                    .rev()
                    .map(|revision| RevisionEntry {
                        reference: revision.reference.as_str().into(),
                        created: revision.created,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(entries)
    }

    pub(crate) fn find_revision(
        &self,
        collection: Option<&str>,
        resource: &str,
        reference: &str,
    ) -> Option<&StoredRevision> {
        self.resources(collection)?
            .get(resource)?
            .iter()
            .find(|revision| revision.reference == reference)
    }

    /// Removes one revision. `None` for an unknown collection,
    /// `Some(false)` when the revision does not exist.
    pub(crate) fn remove_revision(
        &mut self,
        collection: Option<&str>,
        resource: &str,
        reference: &str,
    ) -> Option<bool> {
        let resources = self.resources_mut(collection)?;
        let Some(revisions) = resources.get_mut(resource) else {
            return Some(false);
        };
        let before = revisions.len();
        revisions.retain(|revision| revision.reference != reference);
        let removed = revisions.len() < before;
        if revisions.is_empty() {
            resources.remove(resource);
        }
        if removed {
            self.version += 1;
        }
        Some(removed)
    }

    /// Removes every revision of a resource. `None` for an unknown
    /// collection.
    pub(crate) fn remove_resource(&mut self, collection: Option<&str>, resource: &str) -> Option<()> {
        let resources = self.resources_mut(collection)?;
        if resources.remove(resource).is_some() {
            self.version += 1;
        }
        Some(())
    }

    /// Removes every resource in every scope and drops the session.
    pub(crate) fn remove_all_resources(&mut self) {
        self.root.clear();
        for resources in self.collections.values_mut() {
            resources.clear();
        }
        self.session = None;
        self.version += 1;
    }

    pub(crate) fn collection_infos(&self) -> Vec<CollectionInfo> {
        self.collections
            .keys()
            .map(|id| CollectionInfo { id: id.clone() })
            .collect()
    }

    pub(crate) fn create_collection(&mut self) -> String {
        let id = self.next_collection.to_string();
        self.next_collection += 1;
        self.version += 1;
        self.collections.insert(id.clone(), ResourceMap::new());
        id
    }

    pub(crate) fn remove_collection(&mut self, id: &str) {
        if self.collections.remove(id).is_some() {
            self.version += 1;
        }
    }

    pub(crate) fn remove_all_collections(&mut self) {
        if !self.collections.is_empty() {
            self.version += 1;
        }
        self.collections.clear();
    }

    /// Wipes all data while keeping the ref and collection counters.
    pub(crate) fn wipe(&mut self) {
        self.session = None;
        self.root.clear();
        self.collections.clear();
        self.version += 1;
    }

    /// Snapshot of the account served by the activity download.
    pub(crate) fn export(&self) -> serde_json::Value {
        let resources: BTreeMap<&String, usize> = self
            .root
            .iter()
            .map(|(name, revisions)| (name, revisions.len()))
            .collect();
        let collections: BTreeMap<&String, usize> = self
            .collections
            .iter()
            .map(|(id, resources)| (id, resources.len()))
            .collect();
        json!({
            "session": self.session,
            "resources": resources,
            "collections": collections,
        })
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_account_has_no_manifest() {
        let state = StoreState::new();
        assert!(state.manifest().is_none());
        assert!(state.session().is_none());
        assert_eq!(state.latest_ref(None, "settings"), "0");
    }

    #[test]
    fn first_write_mints_a_session() {
        let mut state = StoreState::new();
        let reference = state.write(None, "settings", "{}").unwrap();
        assert_eq!(reference, "1");
        assert!(state.session().is_some());

        let manifest = state.manifest().unwrap();
        assert_eq!(manifest.latest["settings"].as_str(), "1");
    }

    #[test]
    fn refs_grow_across_resources() {
        let mut state = StoreState::new();
        assert_eq!(state.write(None, "settings", "a").unwrap(), "1");
        assert_eq!(state.write(None, "keybindings", "b").unwrap(), "2");
        assert_eq!(state.write(None, "settings", "c").unwrap(), "3");
        assert_eq!(state.latest_ref(None, "settings"), "3");

        let revisions = state.revisions(None, "settings").unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].reference.as_str(), "3", "newest first");
    }

    #[test]
    fn wiping_drops_the_session_but_not_the_counters() {
        let mut state = StoreState::new();
        state.write(None, "settings", "a").unwrap();
        let first_session = state.session().unwrap().to_owned();

        state.remove_all_resources();
        assert!(state.manifest().is_none());

        state.write(None, "settings", "b").unwrap();
        assert_ne!(state.session().unwrap(), first_session);
        assert_eq!(state.latest_ref(None, "settings"), "2", "refs never restart");
    }

    #[test]
    fn collections_are_isolated_scopes() {
        let mut state = StoreState::new();
        let id = state.create_collection();
        state.write(None, "settings", "root").unwrap();
        state.write(Some(id.as_str()), "settings", "scoped").unwrap();

        assert_eq!(state.latest(None, "settings").unwrap().content, "root");
        assert_eq!(
            state.latest(Some(id.as_str()), "settings").unwrap().content,
            "scoped"
        );
        assert!(state.write(Some("999"), "settings", "x").is_none());

        // Scoped data never shows up in the manifest's latest table.
        let manifest = state.manifest().unwrap();
        assert_eq!(manifest.latest.len(), 1);

        state.remove_collection(&id);
        assert!(!state.scope_exists(Some(id.as_str())));
    }

    #[test]
    fn removing_a_revision_keeps_the_rest() {
        let mut state = StoreState::new();
        state.write(None, "settings", "a").unwrap();
        state.write(None, "settings", "b").unwrap();

        assert_eq!(state.remove_revision(None, "settings", "1"), Some(true));
        assert_eq!(state.remove_revision(None, "settings", "1"), Some(false));
        assert_eq!(state.latest_ref(None, "settings"), "2");

        assert_eq!(state.remove_revision(None, "settings", "2"), Some(true));
        assert_eq!(state.latest_ref(None, "settings"), "0");
    }
}
