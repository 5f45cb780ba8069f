use crate::enrich::error::Result;
use async_trait::async_trait;
use songbook_cache::{LibraryEntry, Metadata, Status};
use std::sync::Arc;

/// The best-known fields of an entry, handed to an [`EnrichmentClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub variant: Option<String>,
    pub display_name: String,
    /// How far the fields above can be trusted.
    pub status: Status,
}
impl From<&LibraryEntry> for Query {
    fn from(entry: &LibraryEntry) -> Self {
        Self {
            artist: entry.metadata.artist.clone(),
            title: entry.metadata.title.clone(),
            variant: entry.metadata.variant.clone(),
            display_name: entry.display_name.clone(),
            status: entry.status,
        }
    }
}

/// Metadata found by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    /// Only the fields that are set overwrite what's stored.
    pub metadata: Metadata,
    /// The service vouches for the match (`api-verified` rather than
    /// `api-enriched`).
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Enrichment),
    NotFound,
}

/// An external metadata service.
///
/// Implementations make one call per lookup and do no rate limiting of their
/// own; the [`Scheduler`](crate::enrich::Scheduler) paces them.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, query: &Query) -> Result<Lookup>;
}

#[async_trait]
impl<T: EnrichmentClient + ?Sized> EnrichmentClient for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn lookup(&self, query: &Query) -> Result<Lookup> {
        (**self).lookup(query).await
    }
}

/// Consults `second` whenever `first` finds nothing or fails, e.g. a fast
/// fuzzy index in front of a slow precise one.
pub struct Chain<A, B> {
    first: A,
    second: B,
    name: String,
}
impl<A: EnrichmentClient, B: EnrichmentClient> Chain<A, B> {
    pub fn new(first: A, second: B) -> Self {
        let name = format!("{}+{}", first.name(), second.name());
        Self { first, second, name }
    }
}

#[async_trait]
impl<A: EnrichmentClient, B: EnrichmentClient> EnrichmentClient for Chain<A, B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, query: &Query) -> Result<Lookup> {
        match self.first.lookup(query).await {
            Ok(Lookup::Found(found)) => return Ok(Lookup::Found(found)),
            Ok(Lookup::NotFound) => tracing::debug!(client = self.first.name(), "no match, trying next client"),
            Err(err) => tracing::debug!(client = self.first.name(), error = ?err, "lookup failed, trying next client"),
        }
        self.second.lookup(query).await
    }
}

/// A client that never finds anything. Entries it's pointed at burn through
/// their attempts and end up `failed`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClient;

#[async_trait]
impl EnrichmentClient for NullClient {
    fn name(&self) -> &str {
        "null"
    }

    async fn lookup(&self, _query: &Query) -> Result<Lookup> {
        Ok(Lookup::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        answer: fn() -> Result<Lookup>,
        calls: AtomicUsize,
    }
    impl Fixed {
        fn new(name: &'static str, answer: fn() -> Result<Lookup>) -> Self {
            Self { name, answer, calls: AtomicUsize::new(0) }
        }
    }
    #[async_trait]
    impl EnrichmentClient for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn lookup(&self, _query: &Query) -> Result<Lookup> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)()
        }
    }

    fn found() -> Result<Lookup> {
        let metadata = Metadata { title: Some("Waterloo".into()), ..Default::default() };
        Ok(Lookup::Found(Enrichment { metadata, verified: true }))
    }

    fn query() -> Query {
        Query {
            artist: Some("ABBA".into()),
            title: Some("Waterloo".into()),
            variant: None,
            display_name: "ABBA - Waterloo.zip".into(),
            status: Status::ParsedStrong,
        }
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_match() {
        let chain = Chain::new(Fixed::new("fuzzy", found), Fixed::new("precise", found));
        assert!(matches!(chain.lookup(&query()).await.unwrap(), Lookup::Found(_)));
        assert_eq!(chain.second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(chain.name(), "fuzzy+precise");
    }

    #[tokio::test]
    async fn test_chain_falls_through_on_miss_and_failure() {
        let chain = Chain::new(Fixed::new("fuzzy", || Ok(Lookup::NotFound)), Fixed::new("precise", found));
        assert!(matches!(chain.lookup(&query()).await.unwrap(), Lookup::Found(_)));

        let chain = Chain::new(Fixed::new("fuzzy", || Err(exn::Exn::new(ErrorKind::Unavailable))), NullClient);
        assert_eq!(chain.lookup(&query()).await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_chain_reports_last_failure() {
        let failing = || -> Result<Lookup> { Err(exn::Exn::new(ErrorKind::Unavailable)) };
        let chain = Chain::new(Fixed::new("a", failing), Fixed::new("b", failing));
        let err = chain.lookup(&query()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable));
        assert_eq!(chain.first.calls.load(Ordering::SeqCst), 1);
    }
}
