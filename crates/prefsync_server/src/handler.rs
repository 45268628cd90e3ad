//! Request routing and handling.

use crate::state::StoreState;
use prefsync_protocol::{
    body_text, headers, media, CollectionInfo, Method, RevisionEntry, WireRequest, WireResponse,
};

/// A parsed request path, relative to the `/v1/` root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Manifest,
    AllResources,
    Resource {
        collection: Option<&'a str>,
        resource: &'a str,
    },
    Latest {
        collection: Option<&'a str>,
        resource: &'a str,
    },
    Revision {
        collection: Option<&'a str>,
        resource: &'a str,
        reference: &'a str,
    },
    Collections,
    Collection {
        id: &'a str,
    },
    Download,
}

impl<'a> Route<'a> {
    /// Parses a path. The `latest` segment must win over a ref segment,
    /// so the arm order below matters.
    fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            ["manifest"] => Route::Manifest,
            ["resource"] => Route::AllResources,
            ["resource", resource] => Route::Resource {
                collection: None,
                resource,
            },
            ["resource", resource, "latest"] => Route::Latest {
                collection: None,
                resource,
            },
            ["resource", resource, reference] => Route::Revision {
                collection: None,
                resource,
                reference,
            },
            ["collection"] => Route::Collections,
            ["collection", id] => Route::Collection { id },
            ["collection", collection, "resource", resource] => Route::Resource {
                collection: Some(collection),
                resource,
            },
            ["collection", collection, "resource", resource, "latest"] => Route::Latest {
                collection: Some(collection),
                resource,
            },
            ["collection", collection, "resource", resource, reference] => Route::Revision {
                collection: Some(collection),
                resource,
                reference,
            },
            ["download"] => Route::Download,
            _ => return None,
        };
        Some(route)
    }
}

/// Handles one routed request against the account state.
pub(crate) fn respond(state: &mut StoreState, request: &WireRequest, path: &str) -> WireResponse {
    let Some(route) = Route::parse(path) else {
        return not_found(format!("no route for /v1/{path}"));
    };
    match (request.method, route) {
        (Method::Get, Route::Manifest) => manifest(state, request),
        (Method::Get, Route::Latest { collection, resource }) => {
            latest(state, request, collection, resource)
        }
        (Method::Get, Route::Resource { collection, resource }) => {
            revisions(state, collection, resource)
        }
        (Method::Post, Route::Resource { collection, resource }) => {
            write(state, request, collection, resource)
        }
        (Method::Delete, Route::Resource { collection, resource }) => {
            delete_resource(state, collection, resource)
        }
        (Method::Get, Route::Revision { collection, resource, reference }) => {
            resolve(state, collection, resource, reference)
        }
        (Method::Delete, Route::Revision { collection, resource, reference }) => {
            delete_revision(state, collection, resource, reference)
        }
        (Method::Delete, Route::AllResources) => {
            state.remove_all_resources();
            WireResponse::new(204)
        }
        (Method::Get, Route::Collections) => list_collections(state),
        (Method::Post, Route::Collections) => {
            let id = state.create_collection();
            WireResponse::new(200)
                .with_header(headers::CONTENT_TYPE, media::TEXT)
                .with_body(id)
        }
        (Method::Delete, Route::Collections) => {
            state.remove_all_collections();
            WireResponse::new(204)
        }
        (Method::Delete, Route::Collection { id }) => {
            state.remove_collection(id);
            WireResponse::new(204)
        }
        (Method::Get, Route::Download) => download(state),
        (method, _) => WireResponse::new(405)
            .with_header(headers::CONTENT_TYPE, media::TEXT)
            .with_body(format!("{method} is not allowed on /v1/{path}")),
    }
}

fn manifest(state: &StoreState, request: &WireRequest) -> WireResponse {
    let Some(manifest) = state.manifest() else {
        return WireResponse::new(204);
    };
    if request.headers.get(headers::IF_NONE_MATCH) == Some(manifest.reference.as_str()) {
        return WireResponse::new(304);
    }
    match manifest.to_body() {
        Ok(body) => WireResponse::new(200)
            .with_header(headers::ETAG, manifest.reference.as_str())
            .with_header(headers::CONTENT_TYPE, media::JSON)
            .with_body(body),
        Err(_) => internal_error(),
    }
}

fn latest(
    state: &StoreState,
    request: &WireRequest,
    collection: Option<&str>,
    resource: &str,
) -> WireResponse {
    if !state.scope_exists(collection) {
        return unknown_collection(collection);
    }
    let Some(revision) = state.latest(collection, resource) else {
        return WireResponse::new(204).with_header(headers::ETAG, "0");
    };
    if request.headers.get(headers::IF_NONE_MATCH) == Some(revision.reference.as_str()) {
        return WireResponse::new(304);
    }
    WireResponse::new(200)
        .with_header(headers::ETAG, revision.reference.as_str())
        .with_header(headers::CONTENT_TYPE, media::TEXT)
        .with_body(revision.content.clone())
}

fn write(
    state: &mut StoreState,
    request: &WireRequest,
    collection: Option<&str>,
    resource: &str,
) -> WireResponse {
    if !state.scope_exists(collection) {
        return unknown_collection(collection);
    }
    if let Some(expected) = request.headers.get(headers::IF_MATCH) {
        let current = state.latest_ref(collection, resource);
        if expected != current {
            return WireResponse::new(412)
                .with_header(headers::CONTENT_TYPE, media::TEXT)
                .with_body(format!("ref {expected} is not the latest"));
        }
    }
    let content = match body_text(&request.body, "resource content") {
        Ok(text) => text.unwrap_or(""),
        Err(_) => {
            return WireResponse::new(400)
                .with_header(headers::CONTENT_TYPE, media::TEXT)
                .with_body("resource content is not text");
        }
    };
    match state.write(collection, resource, content) {
        Some(reference) => WireResponse::new(200).with_header(headers::ETAG, reference),
        None => unknown_collection(collection),
    }
}

fn revisions(state: &StoreState, collection: Option<&str>, resource: &str) -> WireResponse {
    let Some(entries) = state.revisions(collection, resource) else {
        return unknown_collection(collection);
    };
    match RevisionEntry::list_body(&entries) {
        Ok(body) => WireResponse::new(200)
            .with_header(headers::CONTENT_TYPE, media::JSON)
            .with_body(body),
        Err(_) => internal_error(),
    }
}

fn resolve(
    state: &StoreState,
    collection: Option<&str>,
    resource: &str,
    reference: &str,
) -> WireResponse {
    if !state.scope_exists(collection) {
        return unknown_collection(collection);
    }
    let Some(revision) = state.find_revision(collection, resource, reference) else {
        return not_found(format!("no revision {reference} of {resource}"));
    };
    WireResponse::new(200)
        .with_header(headers::ETAG, revision.reference.as_str())
        .with_header(headers::CONTENT_TYPE, media::TEXT)
        .with_body(revision.content.clone())
}

fn delete_revision(
    state: &mut StoreState,
    collection: Option<&str>,
    resource: &str,
    reference: &str,
) -> WireResponse {
    match state.remove_revision(collection, resource, reference) {
        None => unknown_collection(collection),
        Some(false) => not_found(format!("no revision {reference} of {resource}")),
        Some(true) => WireResponse::new(204),
    }
}

fn delete_resource(state: &mut StoreState, collection: Option<&str>, resource: &str) -> WireResponse {
    match state.remove_resource(collection, resource) {
        None => unknown_collection(collection),
        Some(()) => WireResponse::new(204),
    }
}

fn list_collections(state: &StoreState) -> WireResponse {
    match CollectionInfo::list_body(&state.collection_infos()) {
        Ok(body) => WireResponse::new(200)
            .with_header(headers::CONTENT_TYPE, media::JSON)
            .with_body(body),
        Err(_) => internal_error(),
    }
}

fn download(state: &StoreState) -> WireResponse {
    match serde_json::to_vec(&state.export()) {
        Ok(body) => WireResponse::new(200)
            .with_header(headers::CONTENT_TYPE, media::JSON)
            .with_body(body),
        Err(_) => internal_error(),
    }
}

fn unknown_collection(collection: Option<&str>) -> WireResponse {
    let id = collection.unwrap_or("?");
    not_found(format!("unknown collection {id}"))
}

fn not_found(message: String) -> WireResponse {
    WireResponse::new(404)
        .with_header(headers::CONTENT_TYPE, media::TEXT)
        .with_body(message)
}

fn internal_error() -> WireResponse {
    WireResponse::new(500)
}
